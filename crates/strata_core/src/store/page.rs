//! # Pages
//!
//! A page is a fixed-capacity batch of records sharing one attribute schema.
//!
//! ```text
//! Page (capacity 4, Position + Color):
//!   records:  [R7, R2, R9, --]
//!   position: [P7, P2, P9, 00]   version 41
//!   color:    [C7, C2, C9, 00]   version 38
//!   order_version: 40
//! ```
//!
//! Columns are stored as raw bytes so copy-out never needs the Rust type.
//! Capacity is fixed at creation; consumers rely on that to reserve whole
//! page ranges.

use super::attribute::{AttributeKey, AttributeLayout};
use super::id::{PageId, RecordId};
use super::source::{AttributeData, GroupKey, PageInfo};
use crate::error::{CoreError, CoreResult};

/// One raw attribute column.
struct Column {
    layout: AttributeLayout,
    /// `capacity * stride` bytes, rows past `len` are zero.
    bytes: Vec<u8>,
    /// Version of the last write.
    version: u64,
}

/// A fixed-capacity page of records.
pub struct Page {
    id: PageId,
    group: GroupKey,
    capacity: usize,
    records: Vec<RecordId>,
    columns: Vec<Column>,
    order_version: u64,
}

impl Page {
    /// Creates an empty page. Columns are zero-initialized.
    #[must_use]
    pub fn new(
        id: PageId,
        group: GroupKey,
        capacity: usize,
        layouts: &[AttributeLayout],
        version: u64,
    ) -> Self {
        let columns = layouts
            .iter()
            .map(|layout| Column {
                layout: *layout,
                bytes: vec![0u8; capacity * layout.stride],
                version,
            })
            .collect();

        Self {
            id,
            group,
            capacity,
            records: Vec::with_capacity(capacity),
            columns,
            order_version: version,
        }
    }

    /// Returns the page identity.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PageId {
        self.id
    }

    /// Returns the partition this page belongs to.
    #[inline]
    #[must_use]
    pub const fn group(&self) -> GroupKey {
        self.group
    }

    /// Returns the fixed capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of records stored.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Checks if empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Checks if no more records fit.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Version of the last membership or order change.
    #[inline]
    #[must_use]
    pub const fn order_version(&self) -> u64 {
        self.order_version
    }

    /// Record IDs in row order.
    #[must_use]
    pub fn records(&self) -> &[RecordId] {
        &self.records
    }

    /// Summary used by consumers.
    #[must_use]
    pub fn info(&self) -> PageInfo {
        PageInfo {
            id: self.id,
            capacity: self.capacity as u32,
            len: self.records.len() as u32,
            order_version: self.order_version,
        }
    }

    /// Marks the page as moved or reshuffled.
    #[inline]
    pub fn touch_order(&mut self, version: u64) {
        self.order_version = version;
    }

    /// Appends a record with zeroed attributes. Returns its row.
    ///
    /// The caller must check `is_full` first.
    pub fn push(&mut self, record: RecordId, version: u64) -> usize {
        debug_assert!(!self.is_full(), "push into a full page");
        let row = self.records.len();
        self.records.push(record);

        for column in &mut self.columns {
            let stride = column.layout.stride;
            column.bytes[row * stride..(row + 1) * stride].fill(0);
            column.version = version;
        }
        self.order_version = version;
        row
    }

    /// Removes the record at `row` by moving the last record into its place.
    ///
    /// Returns the record that now lives at `row`, if any moved.
    pub fn swap_remove(&mut self, row: usize, version: u64) -> Option<RecordId> {
        let last = self.records.len() - 1;
        self.records.swap_remove(row);

        if row != last {
            for column in &mut self.columns {
                let stride = column.layout.stride;
                column.bytes.copy_within(last * stride..(last + 1) * stride, row * stride);
            }
        }
        for column in &mut self.columns {
            let stride = column.layout.stride;
            column.bytes[last * stride..(last + 1) * stride].fill(0);
            column.version = version;
        }
        self.order_version = version;

        (row != last).then(|| self.records[row])
    }

    /// Overwrites one element of a column.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is absent or `bytes` has the wrong size.
    pub fn write(&mut self, row: usize, key: AttributeKey, bytes: &[u8], version: u64) -> CoreResult<()> {
        debug_assert!(row < self.records.len(), "write past page length");
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.layout.key == key)
            .ok_or(CoreError::UnknownAttribute {
                group: self.group,
                key,
            })?;

        let stride = column.layout.stride;
        if bytes.len() != stride {
            return Err(CoreError::SizeMismatch {
                key,
                expected: stride,
                actual: bytes.len(),
            });
        }
        column.bytes[row * stride..(row + 1) * stride].copy_from_slice(bytes);
        column.version = version;
        Ok(())
    }

    /// Reads one element of a column.
    #[must_use]
    pub fn read(&self, row: usize, key: AttributeKey) -> Option<&[u8]> {
        if row >= self.records.len() {
            return None;
        }
        let column = self.columns.iter().find(|c| c.layout.key == key)?;
        let stride = column.layout.stride;
        Some(&column.bytes[row * stride..(row + 1) * stride])
    }

    /// Occupied rows of a column.
    #[must_use]
    pub fn column(&self, key: AttributeKey) -> Option<AttributeData<'_>> {
        let column = self.columns.iter().find(|c| c.layout.key == key)?;
        let stride = column.layout.stride;
        Some(AttributeData {
            bytes: &column.bytes[..self.records.len() * stride],
            stride,
            version: column.version,
        })
    }
}
