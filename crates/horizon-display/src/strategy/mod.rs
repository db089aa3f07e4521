//! Items-strategy pipeline.
//!
//! The pipeline turns raw source elements into the ordered item list a
//! projection presents. It is a fixed stack of three decorating stages,
//! each the sole authority for item count and order after it:
//!
//! ```text
//!   source elements
//!        |
//!   DirectStrategy    wraps elements into items, optional identity de-dup
//!        |
//!   UserStrategy      applies the comparator chain
//!        |
//!   GroupStrategy     inserts synthetic group headers
//!        |
//!   projection order  (filter map and sort map applied on top)
//! ```
//!
//! Every stage satisfies the same [`ItemsStrategy`] contract, so count and
//! items are always read from the outermost stage and `splice` cascades to
//! the innermost before each stage invalidates its cached order.

mod direct;
mod group;
mod user;

pub use direct::DirectStrategy;
pub use group::GroupStrategy;
pub use user::UserStrategy;

use crate::item::ItemRef;

/// Payload accepted by [`ItemsStrategy::splice`].
///
/// Raw contents are wrapped into fresh items by the Direct stage; existing
/// items pass through unchanged, which is how a source `move` keeps item
/// identity across the splice-out/splice-in pair.
pub enum SplicePayload<T> {
    Contents(Vec<T>),
    Items(Vec<ItemRef<T>>),
}

impl<T> SplicePayload<T> {
    pub fn len(&self) -> usize {
        match self {
            SplicePayload::Contents(contents) => contents.len(),
            SplicePayload::Items(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The outcome of a splice: the removed items plus the display position the
/// splice landed at in the stage's own coordinates.
pub struct SpliceResult<T> {
    pub items: Vec<ItemRef<T>>,
    pub start_index: usize,
}

/// Contract shared by all pipeline stages.
///
/// Methods take `&mut self` because every stage keeps a lazily built order
/// cache. `collection index` always means the element's index in the raw
/// source; `display index` means the index in this stage's output order.
pub trait ItemsStrategy<T>: Send {
    /// Number of items in this stage's output.
    fn count(&mut self) -> usize;

    /// This stage's output items, in order.
    fn items(&mut self) -> Vec<ItemRef<T>>;

    /// The item at `index` of this stage's output.
    fn at(&mut self, index: usize) -> Option<ItemRef<T>>;

    /// Remove `delete_count` elements starting at collection index `start`
    /// and insert the payload there. Returns the removed items.
    fn splice(&mut self, start: usize, delete_count: usize, added: SplicePayload<T>) -> SpliceResult<T>;

    /// Discard all items and cached order; the next read rebuilds from the
    /// source collection.
    fn reset(&mut self);

    /// Drop the cached order but keep the underlying items.
    fn invalidate(&mut self);

    /// Translate a collection index into this stage's output index.
    ///
    /// Answers `count()` when the element is not part of the output (for
    /// example a de-duplicated occurrence).
    fn display_index(&mut self, collection_index: usize) -> usize;

    /// Translate an output index back into a collection index. `None` for
    /// synthetic items such as group headers.
    fn collection_index(&mut self, display_index: usize) -> Option<usize>;
}
