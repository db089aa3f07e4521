//! User-supplied handler types: filters, comparators, grouping and identity
//! extraction.
//!
//! All handlers are closures behind `Arc` so a projection, its pipeline
//! stages and the calling code can share them. Handler identity (for
//! `add_filter`/`remove_filter` and friends) is pointer identity of the
//! underlying allocation, compared with [`Arc::ptr_eq`].

use std::cmp::Ordering;
use std::sync::Arc;

use crate::item::{GroupKey, ItemRef};

/// Extracts the stable identity value of a raw element, if it has one.
pub type IdExtractor<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// Computes the group key of a raw element.
///
/// Arguments are `(contents, source_index, item)`. Returning `None` means
/// "no group": the element is presented outside any group header.
pub type GroupFn<T> = Arc<dyn Fn(&T, usize, &ItemRef<T>) -> Option<GroupKey> + Send + Sync>;

type FilterPredicate<T> = Arc<dyn Fn(&T, usize, &ItemRef<T>, usize) -> bool + Send + Sync>;
type GroupPredicate = Arc<dyn Fn(&str, bool) -> bool + Send + Sync>;

/// One element of a projection's filter chain.
///
/// The predicate receives `(contents, source_index, item, position)` where
/// `position` is the item's place in the display-order walk. A filter that
/// actually inspects the position must be built with
/// [`Filter::with_position`] so the projection knows that any structural
/// change invalidates every previously computed verdict, not just the
/// changed range.
#[derive(Clone)]
pub struct Filter<T> {
    predicate: FilterPredicate<T>,
    group_predicate: Option<GroupPredicate>,
    uses_position: bool,
}

impl<T> Filter<T> {
    /// Build a filter from a plain contents predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(move |contents, _, _, _| predicate(contents)),
            group_predicate: None,
            uses_position: false,
        }
    }

    /// Build a filter whose predicate sees the full evaluation context,
    /// including the display-walk position. Walk positions count every slot
    /// of the sorted walk; under grouping that includes the headers.
    ///
    /// Declaring the dependence forces a full re-evaluation of every
    /// verdict on each structural change.
    pub fn with_position<F>(predicate: F) -> Self
    where
        F: Fn(&T, usize, &ItemRef<T>, usize) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            group_predicate: None,
            uses_position: true,
        }
    }

    /// Attach a group-header predicate.
    ///
    /// Receives `(group_key, has_passing_members)` and overrides the default
    /// header rule (a header passes iff at least one member passes).
    pub fn group_filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str, bool) -> bool + Send + Sync + 'static,
    {
        self.group_predicate = Some(Arc::new(predicate));
        self
    }

    /// Evaluate the entry predicate.
    pub fn matches(&self, contents: &T, source_index: usize, item: &ItemRef<T>, position: usize) -> bool {
        (self.predicate)(contents, source_index, item, position)
    }

    /// Evaluate the group predicate, if one was attached.
    pub fn matches_group(&self, key: &str, has_members: bool) -> Option<bool> {
        self.group_predicate.as_ref().map(|p| p(key, has_members))
    }

    /// Whether the predicate inspects the display-walk position.
    pub fn uses_position(&self) -> bool {
        self.uses_position
    }

    /// Pointer identity with another filter.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.predicate, &other.predicate)
    }
}

/// The value a comparator sees for each item being ordered.
pub struct SortKey<T> {
    /// The projection item.
    pub item: ItemRef<T>,
    /// The element's index in the source collection.
    pub collection_index: usize,
    /// The item's position before this sort pass.
    pub position: usize,
}

impl<T: Clone> SortKey<T> {
    /// A clone of the wrapped raw element.
    pub fn contents(&self) -> Option<T> {
        self.item.contents()
    }
}

/// One element of a projection's comparator chain.
///
/// The first comparator decides the order; later comparators only break
/// ties. The underlying sort is stable, so untouched items keep their
/// natural pipeline order.
#[derive(Clone)]
pub struct Comparator<T> {
    cmp: Arc<dyn Fn(&SortKey<T>, &SortKey<T>) -> Ordering + Send + Sync>,
}

impl<T> Comparator<T> {
    pub fn new<F>(cmp: F) -> Self
    where
        F: Fn(&SortKey<T>, &SortKey<T>) -> Ordering + Send + Sync + 'static,
    {
        Self { cmp: Arc::new(cmp) }
    }

    /// Build a comparator from a key-extraction function over contents.
    pub fn by_key<K, F>(key: F) -> Self
    where
        T: Clone,
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self::new(move |a, b| match (a.contents(), b.contents()) {
            (Some(a), Some(b)) => key(&a).cmp(&key(&b)),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        })
    }

    pub fn compare(&self, a: &SortKey<T>, b: &SortKey<T>) -> Ordering {
        (self.cmp)(a, b)
    }

    /// Pointer identity with another comparator.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cmp, &other.cmp)
    }
}

/// Apply a comparator chain: the first non-equal verdict wins.
pub(crate) fn compare_chain<T>(chain: &[Comparator<T>], a: &SortKey<T>, b: &SortKey<T>) -> Ordering {
    for cmp in chain {
        let ordering = cmp.compare(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
