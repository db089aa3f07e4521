//! The User-Sort stage: applies the active comparator chain.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::handlers::{Comparator, SortKey, compare_chain};
use crate::item::ItemRef;
use crate::strategy::{DirectStrategy, ItemsStrategy, SplicePayload, SpliceResult};

/// Middle pipeline stage.
///
/// Decorates the Direct stage's order with the comparator chain shared with
/// the owning projection. With no comparators configured the stage is a
/// transparent pass-through. The chain must be re-applied (via
/// [`invalidate`]) whenever comparators or membership change.
///
/// [`invalidate`]: ItemsStrategy::invalidate
pub struct UserStrategy<T> {
    source: DirectStrategy<T>,
    sorters: Arc<RwLock<Vec<Comparator<T>>>>,
    /// Output order: indices into the source stage's output.
    items_order: Option<Vec<usize>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> UserStrategy<T> {
    pub fn new(source: DirectStrategy<T>, sorters: Arc<RwLock<Vec<Comparator<T>>>>) -> Self {
        Self { source, sorters, items_order: None }
    }

    pub fn source_mut(&mut self) -> &mut DirectStrategy<T> {
        &mut self.source
    }

    fn ensure_order(&mut self) {
        if self.items_order.is_some() {
            return;
        }
        let count = self.source.count();
        let sorters = self.sorters.read().clone();
        if sorters.is_empty() {
            self.items_order = Some((0..count).collect());
            return;
        }

        let mut keys = Vec::with_capacity(count);
        for position in 0..count {
            let item = match self.source.at(position) {
                Some(item) => item,
                None => continue,
            };
            let collection_index = self.source.collection_index(position).unwrap_or(position);
            keys.push(SortKey { item, collection_index, position });
        }
        // Stable sort: ties keep the natural pipeline order
        keys.sort_by(|a, b| compare_chain(&sorters, a, b));
        self.items_order = Some(keys.into_iter().map(|key| key.position).collect());
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ItemsStrategy<T> for UserStrategy<T> {
    fn count(&mut self) -> usize {
        self.source.count()
    }

    fn items(&mut self) -> Vec<ItemRef<T>> {
        self.ensure_order();
        let order = self.items_order.clone().unwrap();
        order
            .into_iter()
            .filter_map(|position| self.source.at(position))
            .collect()
    }

    fn at(&mut self, index: usize) -> Option<ItemRef<T>> {
        self.ensure_order();
        let position = *self.items_order.as_ref().unwrap().get(index)?;
        self.source.at(position)
    }

    fn splice(&mut self, start: usize, delete_count: usize, added: SplicePayload<T>) -> SpliceResult<T> {
        let result = self.source.splice(start, delete_count, added);
        self.items_order = None;
        result
    }

    fn reset(&mut self) {
        self.source.reset();
        self.items_order = None;
    }

    fn invalidate(&mut self) {
        self.source.invalidate();
        self.items_order = None;
    }

    fn display_index(&mut self, collection_index: usize) -> usize {
        let below = self.source.display_index(collection_index);
        if below >= self.source.count() {
            return self.count();
        }
        self.ensure_order();
        let order = self.items_order.as_ref().unwrap();
        order.iter().position(|&p| p == below).unwrap_or(order.len())
    }

    fn collection_index(&mut self, display_index: usize) -> Option<usize> {
        self.ensure_order();
        let position = *self.items_order.as_ref().unwrap().get(display_index)?;
        self.source.collection_index(position)
    }
}
