//! # Rendering Error Types
//!
//! Configuration errors are fatal at registration. Missing attributes are
//! reported from the cycle that met them. Consistency violations are
//! `debug_assert!`s and never surface here.

use strata_core::{AttributeKey, CoreError, PageId};
use thiserror::Error;

use crate::system::GroupHandle;

/// Errors that can occur while registering or updating render groups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Registration supplied the null material handle.
    #[error("material handle is null")]
    NullMaterial,

    /// Registration asked for zero initial slots.
    #[error("initial capacity must be greater than zero")]
    ZeroInitialCapacity,

    /// Registration asked for a zero growth step.
    #[error("capacity step must be greater than zero")]
    ZeroCapacityStep,

    /// An attribute was declared with a zero-byte element.
    #[error("attribute {0:?} has a zero stride")]
    ZeroStride(AttributeKey),

    /// The same attribute was bound twice.
    #[error("attribute {0:?} bound twice")]
    DuplicateAttribute(AttributeKey),

    /// Two attributes share a shader binding slot.
    #[error("shader binding {0} used twice")]
    DuplicateBinding(u32),

    /// The GPU backend cannot copy elements of this size.
    #[error("stride {0} is not a multiple of 4 bytes")]
    UnalignedStride(usize),

    /// A group needs more slots than a u32 pointer can address.
    #[error("{0} slots exceed the addressable range")]
    SlotOverflow(u64),

    /// A page lacks a declared attribute and zero-fill is disabled.
    #[error("page {page:?} lacks attribute {key:?}")]
    MissingAttribute {
        /// Page that was being copied.
        page: PageId,
        /// Attribute it lacks.
        key: AttributeKey,
    },

    /// The store's element size disagrees with the registered stride.
    #[error("attribute {key:?}: store stride {store} != registered stride {registered}")]
    StrideMismatch {
        /// Attribute being copied.
        key: AttributeKey,
        /// Element size reported by the store.
        store: usize,
        /// Element size given at registration.
        registered: usize,
    },

    /// The handle does not name a registered group.
    #[error("unknown render group: {0:?}")]
    UnknownGroup(GroupHandle),

    /// Configuration failed to parse or validate.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure in the core primitives (job panic, pool start-up).
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;
