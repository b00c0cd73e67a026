//! # Paged World
//!
//! The reference store: partitions of records kept in fixed-capacity pages.
//!
//! ```text
//! GroupKey(0) ──> [page 3] [page 0] [page 5]     iteration order
//!                    │
//!                    └─ slot 3, generation 2, 61/64 records
//! ```
//!
//! Every mutating call bumps the global version once and stamps the columns
//! and pages it touched with that value, so "changed since version V" is a
//! plain comparison.

use std::collections::HashMap;

use super::attribute::{Attribute, AttributeKey, AttributeLayout};
use super::id::{PageId, RecordId};
use super::page::Page;
use super::source::{AttributeData, GroupKey, PageInfo, PageStore};
use crate::error::{CoreError, CoreResult};
use crate::memory::SlotPool;

/// Schema and iteration order of one partition.
struct GroupState {
    page_capacity: usize,
    layouts: Vec<AttributeLayout>,
    /// Pages holding this group's records, in iteration order.
    order: Vec<PageId>,
    records: usize,
}

/// Where a record lives.
#[derive(Clone, Copy, Debug)]
struct RecordLocation {
    page: PageId,
    row: u32,
}

/// Paged record store.
///
/// # Example
///
/// ```rust,ignore
/// let mut world = PagedWorld::new();
/// world.define_group(GroupKey(1), 128, &[Position::layout(), Color::layout()])?;
///
/// let r = world.spawn(GroupKey(1))?;
/// world.set(r, Color::new(1.0, 0.0, 0.0, 1.0))?;
/// world.despawn(r)?;
/// ```
pub struct PagedWorld {
    groups: HashMap<GroupKey, GroupState>,
    pages: SlotPool<Page>,
    records: SlotPool<RecordLocation>,
    version: u64,
}

impl PagedWorld {
    /// Creates an empty store at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
            pages: SlotPool::with_capacity(64),
            records: SlotPool::with_capacity(1024),
            version: 0,
        }
    }

    /// Defines a partition and the attribute columns its pages carry.
    ///
    /// # Errors
    ///
    /// Fails if the group exists, the capacity is zero or an attribute repeats.
    pub fn define_group(
        &mut self,
        group: GroupKey,
        page_capacity: usize,
        layouts: &[AttributeLayout],
    ) -> CoreResult<()> {
        if self.groups.contains_key(&group) {
            return Err(CoreError::GroupExists(group));
        }
        if page_capacity == 0 {
            return Err(CoreError::ZeroPageCapacity(group));
        }
        for (i, layout) in layouts.iter().enumerate() {
            if layouts[..i].iter().any(|l| l.key == layout.key) {
                return Err(CoreError::DuplicateAttribute(layout.key));
            }
        }

        self.groups.insert(
            group,
            GroupState {
                page_capacity,
                layouts: layouts.to_vec(),
                order: Vec::new(),
                records: 0,
            },
        );
        Ok(())
    }

    /// Current global change version.
    #[inline]
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Number of live records in a group.
    #[must_use]
    pub fn record_count(&self, group: GroupKey) -> usize {
        self.groups.get(&group).map_or(0, |g| g.records)
    }

    /// Number of live pages across all groups.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    /// Pages of a group in iteration order.
    ///
    /// # Errors
    ///
    /// Fails if the group is unknown.
    pub fn page_order(&self, group: GroupKey) -> CoreResult<&[PageId]> {
        self.groups
            .get(&group)
            .map(|g| g.order.as_slice())
            .ok_or(CoreError::UnknownGroup(group))
    }

    /// Looks up a live page.
    #[must_use]
    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.get(id.into())
    }

    /// Page and row of a live record.
    #[must_use]
    pub fn location(&self, record: RecordId) -> Option<(PageId, usize)> {
        self.records
            .get(record.into())
            .map(|loc| (loc.page, loc.row as usize))
    }

    /// Adds a record with zeroed attributes to the first page with room,
    /// creating a page at the end of the iteration order if all are full.
    ///
    /// # Errors
    ///
    /// Fails if the group is unknown.
    pub fn spawn(&mut self, group: GroupKey) -> CoreResult<RecordId> {
        let version = self.next_version();
        let state = self
            .groups
            .get_mut(&group)
            .ok_or(CoreError::UnknownGroup(group))?;

        let pages = &self.pages;
        let open = state
            .order
            .iter()
            .copied()
            .find(|id| pages.get((*id).into()).is_some_and(|p| !p.is_full()));

        let page_id = match open {
            Some(id) => id,
            None => {
                let id = PageId::from(self.pages.peek_next());
                let handle = self.pages.insert(Page::new(
                    id,
                    group,
                    state.page_capacity,
                    &state.layouts,
                    version,
                ));
                debug_assert_eq!(PageId::from(handle), id);
                state.order.push(id);
                tracing::trace!(?group, slot = id.slot, generation = id.generation, "page created");
                id
            }
        };

        let next = self.records.peek_next();
        let record = RecordId::new(next.index, next.generation);
        let page = self
            .pages
            .get_mut(page_id.into())
            .ok_or(CoreError::UnknownGroup(group))?;
        let row = page.push(record, version);
        self.records.insert(RecordLocation {
            page: page_id,
            row: row as u32,
        });
        state.records += 1;

        Ok(record)
    }

    /// Spawns `count` records and initializes one attribute per record.
    ///
    /// # Errors
    ///
    /// Fails if the group is unknown or lacks the attribute.
    pub fn spawn_batch<A, F>(&mut self, group: GroupKey, count: usize, mut init: F) -> CoreResult<Vec<RecordId>>
    where
        A: Attribute,
        F: FnMut(usize) -> A,
    {
        let mut spawned = Vec::with_capacity(count);
        for i in 0..count {
            let record = self.spawn(group)?;
            self.set(record, init(i))?;
            spawned.push(record);
        }
        Ok(spawned)
    }

    /// Removes a record. The last record of its page moves into the hole;
    /// a page left empty is destroyed and its slot freed for reuse.
    ///
    /// # Errors
    ///
    /// Fails if the record is unknown.
    pub fn despawn(&mut self, record: RecordId) -> CoreResult<()> {
        let location = self
            .records
            .remove(record.into())
            .ok_or(CoreError::UnknownRecord(record))?;
        let version = self.next_version();

        let page = self
            .pages
            .get_mut(location.page.into())
            .ok_or(CoreError::UnknownRecord(record))?;
        let group = page.group();
        if let Some(moved) = page.swap_remove(location.row as usize, version) {
            if let Some(loc) = self.records.get_mut(moved.into()) {
                loc.row = location.row;
            }
        }
        let emptied = page.is_empty();

        if let Some(state) = self.groups.get_mut(&group) {
            state.records -= 1;
            if emptied {
                state.order.retain(|id| *id != location.page);
            }
        }
        if emptied {
            self.pages.remove(location.page.into());
            tracing::trace!(?group, slot = location.page.slot, "page destroyed");
        }
        Ok(())
    }

    /// Writes a typed attribute.
    ///
    /// # Errors
    ///
    /// Fails if the record is unknown or its group lacks the attribute.
    pub fn set<A: Attribute>(&mut self, record: RecordId, value: A) -> CoreResult<()> {
        self.set_bytes(record, A::KEY, bytemuck::bytes_of(&value))
    }

    /// Writes one raw attribute element.
    ///
    /// # Errors
    ///
    /// Fails if the record is unknown, the attribute is absent or the size is wrong.
    pub fn set_bytes(&mut self, record: RecordId, key: AttributeKey, bytes: &[u8]) -> CoreResult<()> {
        let location = *self
            .records
            .get(record.into())
            .ok_or(CoreError::UnknownRecord(record))?;
        let version = self.next_version();
        let page = self
            .pages
            .get_mut(location.page.into())
            .ok_or(CoreError::UnknownRecord(record))?;
        page.write(location.row as usize, key, bytes, version)
    }

    /// Reads a typed attribute.
    ///
    /// # Errors
    ///
    /// Fails if the record is unknown or its group lacks the attribute.
    pub fn get<A: Attribute>(&self, record: RecordId) -> CoreResult<A> {
        let location = self
            .records
            .get(record.into())
            .ok_or(CoreError::UnknownRecord(record))?;
        let page = self
            .pages
            .get(location.page.into())
            .ok_or(CoreError::UnknownRecord(record))?;
        page.read(location.row as usize, A::KEY)
            .map(bytemuck::pod_read_unaligned)
            .ok_or(CoreError::UnknownAttribute {
                group: page.group(),
                key: A::KEY,
            })
    }

    /// Swaps the iteration positions of two pages of a group.
    ///
    /// Both pages are stamped as reordered.
    ///
    /// # Errors
    ///
    /// Fails if the group is unknown or a position is out of range.
    pub fn swap_pages(&mut self, group: GroupKey, a: usize, b: usize) -> CoreResult<()> {
        let version = self.next_version();
        let state = self
            .groups
            .get_mut(&group)
            .ok_or(CoreError::UnknownGroup(group))?;
        for order in [a, b] {
            if order >= state.order.len() {
                return Err(CoreError::PageOutOfRange { group, order });
            }
        }
        state.order.swap(a, b);
        for order in [a, b] {
            if let Some(page) = self.pages.get_mut(state.order[order].into()) {
                page.touch_order(version);
            }
        }
        Ok(())
    }
}

impl Default for PagedWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for PagedWorld {
    fn version(&self) -> u64 {
        self.version
    }

    fn page_count(&self, group: GroupKey) -> usize {
        self.groups.get(&group).map_or(0, |g| g.order.len())
    }

    fn page_at(&self, group: GroupKey, order: usize) -> Option<PageInfo> {
        let id = *self.groups.get(&group)?.order.get(order)?;
        self.pages.get(id.into()).map(Page::info)
    }

    fn attribute_data(&self, page: PageId, key: AttributeKey) -> Option<AttributeData<'_>> {
        self.pages.get(page.into())?.column(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Color, Position, Scale};

    const G: GroupKey = GroupKey(7);

    fn world(page_capacity: usize) -> PagedWorld {
        let mut world = PagedWorld::new();
        world
            .define_group(G, page_capacity, &[Position::layout(), Scale::layout()])
            .unwrap();
        world
    }

    #[test]
    fn test_spawn_fills_pages_in_order() {
        let mut world = world(2);
        for _ in 0..5 {
            world.spawn(G).unwrap();
        }
        assert_eq!(world.record_count(G), 5);
        assert_eq!(world.page_count(G), 3);

        let lens: Vec<u32> = (0..3).map(|i| world.page_at(G, i).unwrap().len).collect();
        assert_eq!(lens, vec![2, 2, 1]);
    }

    #[test]
    fn test_set_get_roundtrip_and_versions() {
        let mut world = world(4);
        let r = world.spawn(G).unwrap();
        let before = world.version();

        world.set(r, Position::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(world.get::<Position>(r).unwrap(), Position::new(1.0, 2.0, 3.0));
        assert!(world.version() > before);

        let (page, _) = world.location(r).unwrap();
        let data = world.attribute_data(page, Position::KEY).unwrap();
        assert_eq!(data.version, world.version());
        assert_eq!(data.bytes.len(), 16);
    }

    #[test]
    fn test_missing_attribute_is_none() {
        let mut world = world(4);
        let r = world.spawn(G).unwrap();
        let (page, _) = world.location(r).unwrap();
        assert!(world.attribute_data(page, Color::KEY).is_none());
        assert!(matches!(
            world.get::<Color>(r),
            Err(CoreError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_despawn_moves_last_record() {
        let mut world = world(4);
        let a = world.spawn(G).unwrap();
        let b = world.spawn(G).unwrap();
        let c = world.spawn(G).unwrap();
        world.set(c, Scale(3.0)).unwrap();

        world.despawn(a).unwrap();
        assert_eq!(world.location(c).unwrap().1, 0);
        assert_eq!(world.location(b).unwrap().1, 1);
        assert_eq!(world.get::<Scale>(c).unwrap(), Scale(3.0));
        assert!(world.despawn(a).is_err());
    }

    #[test]
    fn test_emptied_page_slot_is_recycled_with_new_generation() {
        let mut world = world(4);
        let records: Vec<_> = (0..4).map(|_| world.spawn(G).unwrap()).collect();
        let old = world.page_order(G).unwrap()[0];

        for r in records {
            world.despawn(r).unwrap();
        }
        assert_eq!(world.page_count(G), 0);

        world.spawn(G).unwrap();
        let new = world.page_order(G).unwrap()[0];
        assert_eq!(old.slot, new.slot);
        assert_ne!(old.generation, new.generation);
    }

    #[test]
    fn test_swap_pages_stamps_both() {
        let mut world = world(1);
        world.spawn(G).unwrap();
        world.spawn(G).unwrap();
        let first = world.page_at(G, 0).unwrap();
        let second = world.page_at(G, 1).unwrap();

        world.swap_pages(G, 0, 1).unwrap();
        let v = world.version();
        assert_eq!(world.page_at(G, 0).unwrap().id, second.id);
        assert_eq!(world.page_at(G, 1).unwrap().id, first.id);
        assert_eq!(world.page_at(G, 0).unwrap().order_version, v);
        assert_eq!(world.page_at(G, 1).unwrap().order_version, v);
        assert!(world.swap_pages(G, 0, 9).is_err());
    }

    #[test]
    fn test_define_group_validation() {
        let mut world = world(4);
        assert_eq!(
            world.define_group(G, 4, &[]),
            Err(CoreError::GroupExists(G))
        );
        assert_eq!(
            world.define_group(GroupKey(1), 0, &[]),
            Err(CoreError::ZeroPageCapacity(GroupKey(1)))
        );
        assert_eq!(
            world.define_group(GroupKey(2), 4, &[Scale::layout(), Scale::layout()]),
            Err(CoreError::DuplicateAttribute(Scale::KEY))
        );
    }
}
