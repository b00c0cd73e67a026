//! Record and page identities: a pool slot plus the generation of that slot.

use crate::memory::SlotHandle;

/// A record in the store. Stale once the record is despawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordId(SlotHandle);

impl RecordId {
    /// Creates a record ID from its pool slot and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(SlotHandle { index, generation })
    }

    /// Slot in the record pool.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0.index
    }

    /// Generation of the slot.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.0.generation
    }
}

impl From<RecordId> for SlotHandle {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// Identity of a page: its stable slot plus the generation of that slot.
///
/// Two pages that occupied the same slot at different times never compare
/// equal, which is what lets consumers notice a page was destroyed and
/// recreated between two observations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageId {
    /// Stable slot index in the store's page pool.
    pub slot: u32,
    /// Generation of the slot when this page was created.
    pub generation: u32,
}

impl PageId {
    /// Creates a page ID.
    #[inline]
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }
}

impl From<SlotHandle> for PageId {
    fn from(handle: SlotHandle) -> Self {
        Self::new(handle.index, handle.generation)
    }
}

impl From<PageId> for SlotHandle {
    fn from(id: PageId) -> Self {
        Self {
            index: id.slot,
            generation: id.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_a_slot_handle() {
        let id = RecordId::new(12, 3);
        assert_eq!((id.index(), id.generation()), (12, 3));
        assert_eq!(SlotHandle::from(id), SlotHandle { index: 12, generation: 3 });
        assert_ne!(id, RecordId::new(12, 4));
    }

    #[test]
    fn test_page_id_distinguishes_generations() {
        let old = PageId::new(3, 0);
        let recreated = PageId::new(3, 1);
        assert_ne!(old, recreated);
        assert_eq!(SlotHandle::from(recreated).generation, 1);
    }
}
