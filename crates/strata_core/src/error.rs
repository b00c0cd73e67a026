//! # Core Error Types
//!
//! All errors that can occur in the paged store and the worker pool.

use thiserror::Error;

use crate::store::{AttributeKey, GroupKey, RecordId};

/// Errors that can occur in the core crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The group was never defined in the store.
    #[error("unknown group: {0:?}")]
    UnknownGroup(GroupKey),

    /// The group is already defined.
    #[error("group already defined: {0:?}")]
    GroupExists(GroupKey),

    /// A group was defined with pages that cannot hold a record.
    #[error("page capacity must be greater than zero for group {0:?}")]
    ZeroPageCapacity(GroupKey),

    /// No page sits at this iteration position of the group.
    #[error("group {group:?} has no page at position {order}")]
    PageOutOfRange {
        /// The group that was accessed.
        group: GroupKey,
        /// Requested iteration position.
        order: usize,
    },

    /// The record does not exist (never spawned, or already despawned).
    #[error("unknown record: {0:?}")]
    UnknownRecord(RecordId),

    /// The record's group does not carry this attribute.
    #[error("attribute {key:?} not present in group {group:?}")]
    UnknownAttribute {
        /// The group that was accessed.
        group: GroupKey,
        /// The attribute that was requested.
        key: AttributeKey,
    },

    /// A write supplied the wrong number of bytes for one element.
    #[error("attribute {key:?} expects {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The attribute that was written.
        key: AttributeKey,
        /// Stride declared by the layout.
        expected: usize,
        /// Bytes supplied by the caller.
        actual: usize,
    },

    /// The same attribute appeared twice in a group schema.
    #[error("attribute {0:?} declared twice")]
    DuplicateAttribute(AttributeKey),

    /// A job, or one of the jobs it depended on, panicked.
    #[error("job panicked")]
    JobPanicked,

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
