//! Read-side view of a paged store, as consumed by the streaming engine.

use super::attribute::AttributeKey;
use super::id::PageId;

/// Partition of the store whose records are drawn together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(pub u32);

/// Per-page facts needed to classify and address a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageInfo {
    /// Page identity.
    pub id: PageId,
    /// Maximum records the page can hold. Immutable for the page's lifetime.
    pub capacity: u32,
    /// Records currently stored.
    pub len: u32,
    /// Version of the last membership or order change affecting this page.
    pub order_version: u64,
}

/// Raw bytes of one attribute column of one page.
#[derive(Clone, Copy, Debug)]
pub struct AttributeData<'a> {
    /// `len * stride` bytes, occupied rows only.
    pub bytes: &'a [u8],
    /// Size of one element.
    pub stride: usize,
    /// Version of the last write to this column.
    pub version: u64,
}

/// A store the engine can stream from.
///
/// Implementations must not be mutated while a cycle that reads them is in
/// flight; the engine holds an `Arc` to the store for the cycle's duration.
pub trait PageStore: Send + Sync + 'static {
    /// Current global change version. Every stamp in the store is `<=` this.
    fn version(&self) -> u64;

    /// Number of pages currently holding records of `group`.
    fn page_count(&self, group: GroupKey) -> usize;

    /// The page at iteration position `order` of `group`.
    fn page_at(&self, group: GroupKey, order: usize) -> Option<PageInfo>;

    /// Attribute column of a page, or `None` if the page lacks it.
    fn attribute_data(&self, page: PageId, key: AttributeKey) -> Option<AttributeData<'_>>;
}
