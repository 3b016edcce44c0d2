// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel object identity and owned capability handles
//! OWNERS: @kernel-cap-team
//! PUBLIC API: Koid, KernelObject, Handle
//! DEPENDS_ON: nexus-abi::{ObjectType, Rights, Status}, wait::Waitable
//! INVARIANTS: Koids are unique and never 0; duplication never escalates rights;
//!             dropping the last handle to a dispatcher destroys it

use core::any::Any;
use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nexus_abi::{ObjectType, Rights, Status};

use crate::wait::Waitable;

/// Kernel object identifier.
pub type Koid = u64;

// Low koids are reserved for well-known kernel objects.
static NEXT_KOID: AtomicU64 = AtomicU64::new(1024);

/// Allocates a fresh, process-wide unique koid.
pub fn alloc_koid() -> Koid {
    NEXT_KOID.fetch_add(1, Ordering::Relaxed)
}

/// Object reachable through a [`Handle`].
pub trait KernelObject: Send + Sync + 'static {
    /// Identifier of this object.
    fn koid(&self) -> Koid;

    /// Kind of object.
    fn object_type(&self) -> ObjectType;

    /// Type-erased view used for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Type-erased shared reference used for owned downcasts.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Signal-tracking view, for objects that can be waited on.
    fn as_waitable(&self) -> Option<&dyn Waitable> {
        None
    }
}

/// Owned capability: a reference to a kernel object plus the rights it grants.
///
/// Handles are moved, never cloned; [`Handle::duplicate`] is the only way to obtain a second one.
pub struct Handle {
    object: Arc<dyn KernelObject>,
    rights: Rights,
}

impl Handle {
    /// Wraps `object` with `rights`.
    pub fn new(object: Arc<dyn KernelObject>, rights: Rights) -> Self {
        Self { object, rights }
    }

    /// Rights granted by this handle.
    pub fn rights(&self) -> Rights {
        self.rights
    }

    /// Identifier of the referenced object.
    pub fn koid(&self) -> Koid {
        self.object.koid()
    }

    /// Kind of the referenced object.
    pub fn object_type(&self) -> ObjectType {
        self.object.object_type()
    }

    /// Shared reference to the underlying object.
    pub fn object(&self) -> &Arc<dyn KernelObject> {
        &self.object
    }

    /// Returns the concrete object when it is a `T`.
    pub fn downcast<T: KernelObject>(&self) -> Option<&T> {
        self.object.as_any().downcast_ref::<T>()
    }

    /// Returns a shared reference to the concrete object when it is a `T`.
    pub fn downcast_arc<T: KernelObject>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.object).into_any().downcast::<T>().ok()
    }

    /// Fails with [`Status::AccessDenied`] unless every bit of `rights` is held.
    pub fn require(&self, rights: Rights) -> Result<(), Status> {
        if self.rights.contains(rights) {
            Ok(())
        } else {
            Err(Status::AccessDenied)
        }
    }

    /// Creates a second handle to the same object with a subset of this handle's rights.
    pub fn duplicate(&self, rights: Rights) -> Result<Handle, Status> {
        self.require(Rights::DUPLICATE)?;
        if !self.rights.contains(rights) {
            return Err(Status::AccessDenied);
        }
        Ok(Handle { object: Arc::clone(&self.object), rights })
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("koid", &self.koid())
            .field("type", &self.object_type())
            .field("rights", &self.rights.bits())
            .finish()
    }
}
