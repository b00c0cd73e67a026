//! Begin/end bracket for destination writes.

use std::sync::atomic::{AtomicBool, Ordering};

/// Guards a resource that must see at most one outstanding write session.
#[derive(Debug, Default)]
pub struct WriteGate {
    open: AtomicBool,
}

impl WriteGate {
    /// Creates a closed gate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
        }
    }

    /// Opens a write session.
    ///
    /// # Panics
    ///
    /// Panics if a session is already open.
    #[inline]
    pub fn begin(&self) {
        let was_open = self.open.swap(true, Ordering::AcqRel);
        assert!(!was_open, "begin_write called while a write is outstanding");
    }

    /// Closes the write session. Closing a closed gate is a no-op.
    #[inline]
    pub fn end(&self) {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        debug_assert!(was_open, "end_write without begin_write");
    }

    /// Returns whether a session is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
