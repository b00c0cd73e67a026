//! # Page Offset Map
//!
//! Where each page's records live in the destination buffers.
//!
//! ```text
//! page slot:      0         1         2
//! entry:      [start 0 ] [  --   ] [start 8 ]     generation + capacity guard
//! records:    [0 1 2 3 ]           [8 9 .. ]      start + row, per record
//! retired:    [(4, 4)]                            ranges of destroyed pages
//! ```
//!
//! Entries are keyed by page slot and only match a page whose generation and
//! capacity equal the recorded ones. A page recreated in a reused slot, or a
//! page whose capacity changed, reads as unassigned and is handled as new.
//!
//! Ranges of pages that disappeared stay reserved as *retired* until the next
//! full remap, so `used` always equals the sum of all reserved ranges.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use strata_core::{PageId, PageInfo};

/// Map shared between the orchestrator and its jobs.
pub type SharedOffsets = Arc<RwLock<PageOffsetMap>>;

/// Assigned range of one page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageOffsetEntry {
    /// First slot of the page's range.
    pub start: u32,
    /// Range length; equals the page capacity.
    pub capacity: u32,
    /// Generation of the page slot the range was assigned to.
    pub generation: u32,
    /// Whether the range was assigned.
    pub initialized: bool,
}

impl PageOffsetEntry {
    const UNASSIGNED: Self = Self {
        start: 0,
        capacity: 0,
        generation: 0,
        initialized: false,
    };

    /// One past the last slot of the range.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.start + self.capacity
    }
}

struct SlotEntry {
    entry: PageOffsetEntry,
    /// Destination slot per row, `capacity` long.
    records: Box<[AtomicU32]>,
}

/// Offsets of every assigned page, indexed by page slot.
#[derive(Default)]
pub struct PageOffsetMap {
    slots: Vec<Option<SlotEntry>>,
    retired: Vec<(u32, u32)>,
}

impl PageOffsetMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map behind a shared lock.
    #[must_use]
    pub fn shared() -> SharedOffsets {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Forgets every range, retired ones included.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.retired.clear();
    }

    /// Entry for `page`, uninitialized unless slot, generation and capacity
    /// all match an assigned range.
    #[must_use]
    pub fn entry(&self, page: &PageInfo) -> PageOffsetEntry {
        let Some(Some(slot)) = self.slots.get(page.id.slot as usize) else {
            return PageOffsetEntry::UNASSIGNED;
        };
        let entry = slot.entry;
        if entry.generation != page.id.generation {
            return PageOffsetEntry::UNASSIGNED;
        }
        if entry.capacity != page.capacity {
            tracing::warn!(
                slot = page.id.slot,
                assigned = entry.capacity,
                current = page.capacity,
                "page capacity changed, treating page as new"
            );
            return PageOffsetEntry::UNASSIGNED;
        }
        entry
    }

    /// Assigns `[start, start + capacity)` to `page`.
    ///
    /// A range previously held by another page in the same slot is retired.
    pub fn assign(&mut self, page: &PageInfo, start: u32) {
        let index = page.id.slot as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        if let Some(previous) = self.slots[index].take() {
            self.retired.push((previous.entry.start, previous.entry.capacity));
        }
        self.slots[index] = Some(SlotEntry {
            entry: PageOffsetEntry {
                start,
                capacity: page.capacity,
                generation: page.id.generation,
                initialized: true,
            },
            records: (0..page.capacity).map(|_| AtomicU32::new(u32::MAX)).collect(),
        });
    }

    /// Recomputes the destination slot of every occupied row of `page`.
    ///
    /// Takes `&self`: distinct pages may be recomputed concurrently.
    /// Returns `false` if the page has no assigned range.
    pub fn recompute_records(&self, page: &PageInfo) -> bool {
        if !self.entry(page).initialized {
            return false;
        }
        let Some(Some(slot)) = self.slots.get(page.id.slot as usize) else {
            return false;
        };
        for (row, record) in slot.records.iter().take(page.len as usize).enumerate() {
            record.store(slot.entry.start + row as u32, Ordering::Relaxed);
        }
        true
    }

    /// Destination slots of the first `len` rows of `page`.
    #[must_use]
    pub fn record_slots(&self, page: PageId, len: usize) -> Option<Vec<u32>> {
        let slot = self.slots.get(page.slot as usize)?.as_ref()?;
        if slot.entry.generation != page.generation || len > slot.records.len() {
            return None;
        }
        Some(
            slot.records[..len]
                .iter()
                .map(|r| r.load(Ordering::Relaxed))
                .collect(),
        )
    }

    /// Every reserved range: assigned pages first, then retired ones.
    #[must_use]
    pub fn reserved_ranges(&self) -> Vec<(u32, u32)> {
        self.slots
            .iter()
            .flatten()
            .map(|s| (s.entry.start, s.entry.capacity))
            .chain(self.retired.iter().copied())
            .collect()
    }

    /// Sum of all reserved range lengths.
    #[must_use]
    pub fn reserved_capacity(&self) -> u64 {
        self.reserved_ranges().iter().map(|&(_, c)| u64::from(c)).sum()
    }

    /// Number of pages with an assigned range.
    #[must_use]
    pub fn assigned_pages(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}
