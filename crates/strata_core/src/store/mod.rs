//! # Paged Record Store
//!
//! A small paged store used as the data source for the streaming engine.
//!
//! ## Design Philosophy
//!
//! - Records of one partition (`GroupKey`) live in fixed-capacity pages
//! - Each page keeps one raw byte column per attribute
//! - Every mutation bumps a global change version and stamps what it touched
//! - Pages are generational slots: a destroyed page's slot may come back as a
//!   different page, and the `PageId` tells them apart

mod attribute;
mod id;
mod page;
mod source;
mod world;

pub use attribute::{Attribute, AttributeKey, AttributeLayout, Color, Position, Scale};
pub use id::{PageId, RecordId};
pub use page::Page;
pub use source::{AttributeData, GroupKey, PageInfo, PageStore};
pub use world::PagedWorld;
