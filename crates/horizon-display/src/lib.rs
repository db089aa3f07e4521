//! Non-destructive projection views over mutable collections.
//!
//! A [`Collection`] wraps a source collection and presents a filtered,
//! sorted, grouped view of it without ever touching the source. The view
//! is derived through a pipeline of items strategies, then masked by a
//! filter map and permuted by a sort map:
//!
//! ```text
//!   source elements
//!        |
//!        v
//!   DirectStrategy    wrap in display items, de-duplicate by identity
//!        |
//!        v
//!   UserStrategy      stable sort by the comparator chain
//!        |
//!        v
//!   GroupStrategy     inject group headers over consecutive key runs
//!        |
//!        v
//!   filter map + sort map ──> visible display order
//! ```
//!
//! Observable sources emit change signals; the projection translates them
//! into minimal display-coordinate notifications, coalescing bursts
//! through update sessions. A navigation cursor with current-item
//! tracking rides on top of the visible order.
//!
//! ```
//! use horizon_display::{Collection, CollectionOptions, Comparator, Filter};
//!
//! let collection = Collection::with_options(
//!     vec!["cherry", "apple", "banana"],
//!     CollectionOptions::default()
//!         .filter(Filter::new(|s: &&str| s.len() > 5))
//!         .sort(Comparator::by_key(|s: &&str| s.to_string())),
//! );
//! let visible: Vec<&str> = collection
//!     .items()
//!     .iter()
//!     .filter_map(|item| item.contents())
//!     .collect();
//! assert_eq!(visible, vec!["banana", "cherry"]);
//! ```

pub mod collection;
pub mod enumerator;
pub mod error;
pub mod handlers;
pub mod item;
mod session;
pub mod source;
pub mod strategy;
pub mod tree_item;

pub use collection::{Collection, CollectionOptions, CollectionSignals, CurrentChange};
pub use enumerator::CollectionEnumerator;
pub use error::{DisplayError, Result};
pub use handlers::{Comparator, Filter, GroupFn, IdExtractor, SortKey};
pub use item::{DisplayItem, GroupKey, ItemKind, ItemRef};
pub use session::UpdateSession;
pub use source::{
    ChangeAction, ChangeEvent, CollectionSource, Enumerable, IntoSource, ItemChangeEvent,
    ObservableList, RaisingChange, SourceList, SourceSignals,
};
pub use tree_item::TreeItem;
