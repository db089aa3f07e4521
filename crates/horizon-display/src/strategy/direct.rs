//! The Direct stage: wraps raw elements into projection items.

use std::collections::HashSet;
use std::sync::Arc;

use crate::handlers::IdExtractor;
use crate::item::{DisplayItem, ItemRef};
use crate::source::CollectionSource;
use crate::strategy::{ItemsStrategy, SplicePayload, SpliceResult};

/// Innermost pipeline stage.
///
/// Holds the one-to-one wrapping of raw elements into [`DisplayItem`]s, in
/// source order. With uniqueness enabled and an identity extractor
/// configured, the output order keeps only the first occurrence of each
/// identity value; excluded duplicates stay in the backing item list so
/// they remain addressable for removal bookkeeping.
pub struct DirectStrategy<T> {
    source: Arc<dyn CollectionSource<T>>,
    /// All items in raw source order, including de-duplicated occurrences.
    items: Option<Vec<ItemRef<T>>>,
    /// Output order: indices into `items`.
    items_order: Option<Vec<usize>>,
    unique: bool,
    id_extractor: Option<IdExtractor<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> DirectStrategy<T> {
    pub fn new(
        source: Arc<dyn CollectionSource<T>>,
        unique: bool,
        id_extractor: Option<IdExtractor<T>>,
    ) -> Self {
        Self { source, items: None, items_order: None, unique, id_extractor }
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn set_unique(&mut self, unique: bool) {
        if self.unique != unique {
            self.unique = unique;
            self.items_order = None;
        }
    }

    pub fn id_extractor(&self) -> Option<&IdExtractor<T>> {
        self.id_extractor.as_ref()
    }

    /// The backing item for raw index `index`, de-duplicated or not.
    pub fn raw_at(&mut self, index: usize) -> Option<ItemRef<T>> {
        self.ensure_items();
        self.items.as_ref().and_then(|items| items.get(index).cloned())
    }

    /// Number of backing items, including de-duplicated occurrences.
    pub fn raw_count(&mut self) -> usize {
        self.ensure_items();
        self.items.as_ref().map(Vec::len).unwrap_or(0)
    }

    fn ensure_items(&mut self) {
        if self.items.is_some() {
            return;
        }
        let mut items = Vec::with_capacity(self.source.count());
        self.source.each(&mut |contents, _| {
            items.push(DisplayItem::entry(contents.clone()));
        });
        self.items = Some(items);
    }

    fn ensure_order(&mut self) {
        self.ensure_items();
        if self.items_order.is_some() {
            return;
        }
        let items = self.items.as_ref().unwrap();
        let order = match (&self.id_extractor, self.unique) {
            (Some(extract), true) => {
                let mut seen = HashSet::new();
                let mut order = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let id = item.contents().and_then(|contents| extract(&contents));
                    match id {
                        // First occurrence of each identity wins
                        Some(id) => {
                            if seen.insert(id) {
                                order.push(index);
                            }
                        }
                        None => order.push(index),
                    }
                }
                order
            }
            _ => (0..items.len()).collect(),
        };
        self.items_order = Some(order);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ItemsStrategy<T> for DirectStrategy<T> {
    fn count(&mut self) -> usize {
        self.ensure_order();
        self.items_order.as_ref().unwrap().len()
    }

    fn items(&mut self) -> Vec<ItemRef<T>> {
        self.ensure_order();
        let items = self.items.as_ref().unwrap();
        self.items_order
            .as_ref()
            .unwrap()
            .iter()
            .map(|&index| items[index].clone())
            .collect()
    }

    fn at(&mut self, index: usize) -> Option<ItemRef<T>> {
        self.ensure_order();
        let raw = *self.items_order.as_ref().unwrap().get(index)?;
        self.items.as_ref().unwrap().get(raw).cloned()
    }

    fn splice(&mut self, start: usize, delete_count: usize, added: SplicePayload<T>) -> SpliceResult<T> {
        self.ensure_items();
        let start_index = self.display_index(start);
        let items = self.items.as_mut().unwrap();
        let start = start.min(items.len());
        let end = (start + delete_count).min(items.len());
        let removed: Vec<ItemRef<T>> = items.drain(start..end).collect();
        let inserted = match added {
            SplicePayload::Contents(contents) => {
                contents.into_iter().map(DisplayItem::entry).collect::<Vec<_>>()
            }
            SplicePayload::Items(items) => items,
        };
        for (offset, item) in inserted.into_iter().enumerate() {
            items.insert(start + offset, item);
        }
        self.items_order = None;
        SpliceResult { items: removed, start_index }
    }

    fn reset(&mut self) {
        self.items = None;
        self.items_order = None;
    }

    fn invalidate(&mut self) {
        self.items_order = None;
    }

    fn display_index(&mut self, collection_index: usize) -> usize {
        self.ensure_order();
        let order = self.items_order.as_ref().unwrap();
        order
            .iter()
            .position(|&raw| raw == collection_index)
            .unwrap_or(order.len())
    }

    fn collection_index(&mut self, display_index: usize) -> Option<usize> {
        self.ensure_order();
        self.items_order.as_ref().unwrap().get(display_index).copied()
    }
}
