//! The Group stage: materializes synthetic header items.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::handlers::GroupFn;
use crate::item::{DisplayItem, ItemRef};
use crate::strategy::{ItemsStrategy, SplicePayload, SpliceResult, UserStrategy};

/// Cached output of one group recomputation.
struct GroupCache<T> {
    /// Output items: headers interleaved with the source stage's items.
    items: Vec<ItemRef<T>>,
    /// `member_pos[p]` is the output position of the source stage's item `p`.
    member_pos: Vec<usize>,
    /// For each output position, the source stage position, `None` for headers.
    slots: Vec<Option<usize>>,
}

/// Outermost pipeline stage.
///
/// Gathers items sharing a group key under one header item placed at the
/// first member's position, with groups ordered by first key appearance
/// and members keeping their relative order. A `None` key means "no
/// group": the item is emitted inline without a header. Header items are
/// pooled by key so a group keeps its identity across regroups; diffs
/// then see headers as stable items rather than churn.
pub struct GroupStrategy<T> {
    source: UserStrategy<T>,
    grouper: Arc<RwLock<Option<GroupFn<T>>>>,
    cache: Option<GroupCache<T>>,
    headers: HashMap<String, ItemRef<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> GroupStrategy<T> {
    pub fn new(source: UserStrategy<T>, grouper: Arc<RwLock<Option<GroupFn<T>>>>) -> Self {
        Self { source, grouper, cache: None, headers: HashMap::new() }
    }

    pub fn source_mut(&mut self) -> &mut UserStrategy<T> {
        &mut self.source
    }

    /// Whether a grouping function is currently configured.
    pub fn is_grouped(&self) -> bool {
        self.grouper.read().is_some()
    }

    fn ensure_cache(&mut self) {
        if self.cache.is_some() {
            return;
        }
        let grouper = self.grouper.read().clone();
        let source_items = self.source.items();

        let cache = match grouper {
            None => {
                let count = source_items.len();
                GroupCache {
                    items: source_items,
                    member_pos: (0..count).collect(),
                    slots: (0..count).map(Some).collect(),
                }
            }
            Some(grouper) => {
                let total = source_items.len();
                // Buckets in first-appearance order; a `None` key makes a
                // standalone bucket so ungrouped items stay in place
                let mut buckets: Vec<(Option<String>, Vec<(usize, ItemRef<T>)>)> = Vec::new();
                let mut bucket_by_key: HashMap<String, usize> = HashMap::new();
                for (position, item) in source_items.into_iter().enumerate() {
                    let collection_index =
                        self.source.collection_index(position).unwrap_or(position);
                    let key = item
                        .contents()
                        .and_then(|contents| grouper(&contents, collection_index, &item));
                    match key {
                        Some(key) => {
                            let slot = *bucket_by_key.entry(key.clone()).or_insert_with(|| {
                                buckets.push((Some(key.clone()), Vec::new()));
                                buckets.len() - 1
                            });
                            buckets[slot].1.push((position, item));
                        }
                        None => buckets.push((None, vec![(position, item)])),
                    }
                }

                let mut items = Vec::with_capacity(total + buckets.len());
                let mut member_pos = vec![0; total];
                let mut slots = Vec::with_capacity(total + buckets.len());
                for (key, members) in buckets {
                    if let Some(key) = &key {
                        let header = self
                            .headers
                            .entry(key.clone())
                            .or_insert_with(|| DisplayItem::group(key.clone()))
                            .clone();
                        slots.push(None);
                        items.push(header);
                    }
                    for (position, item) in members {
                        member_pos[position] = items.len();
                        slots.push(Some(position));
                        items.push(item);
                    }
                }
                // Drop pooled headers for groups that no longer exist
                self.headers.retain(|key, _| bucket_by_key.contains_key(key));
                GroupCache { items, member_pos, slots }
            }
        };
        self.cache = Some(cache);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ItemsStrategy<T> for GroupStrategy<T> {
    fn count(&mut self) -> usize {
        self.ensure_cache();
        self.cache.as_ref().unwrap().items.len()
    }

    fn items(&mut self) -> Vec<ItemRef<T>> {
        self.ensure_cache();
        self.cache.as_ref().unwrap().items.clone()
    }

    fn at(&mut self, index: usize) -> Option<ItemRef<T>> {
        self.ensure_cache();
        self.cache.as_ref().unwrap().items.get(index).cloned()
    }

    fn splice(&mut self, start: usize, delete_count: usize, added: SplicePayload<T>) -> SpliceResult<T> {
        let result = self.source.splice(start, delete_count, added);
        self.cache = None;
        result
    }

    fn reset(&mut self) {
        self.source.reset();
        self.cache = None;
        self.headers.clear();
    }

    fn invalidate(&mut self) {
        self.source.invalidate();
        self.cache = None;
    }

    fn display_index(&mut self, collection_index: usize) -> usize {
        let below = self.source.display_index(collection_index);
        self.ensure_cache();
        let cache = self.cache.as_ref().unwrap();
        match cache.member_pos.get(below) {
            Some(&position) => position,
            None => cache.items.len(),
        }
    }

    fn collection_index(&mut self, display_index: usize) -> Option<usize> {
        self.ensure_cache();
        let below = (*self.cache.as_ref().unwrap().slots.get(display_index)?)?;
        self.source.collection_index(below)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CollectionSource, ObservableList};
    use crate::strategy::DirectStrategy;

    #[derive(Clone, PartialEq, Debug)]
    struct Person {
        gender: &'static str,
        name: &'static str,
    }

    fn person(gender: &'static str, name: &'static str) -> Person {
        Person { gender, name }
    }

    fn strategy(
        items: Vec<Person>,
        grouped: bool,
    ) -> GroupStrategy<Person> {
        let source = Arc::new(ObservableList::from_items(items));
        let direct =
            DirectStrategy::new(source as Arc<dyn CollectionSource<Person>>, false, None);
        let user = UserStrategy::new(direct, Arc::new(RwLock::new(Vec::new())));
        let grouper: Option<GroupFn<Person>> = if grouped {
            Some(Arc::new(|p: &Person, _, _| Some(p.gender.to_string())))
        } else {
            None
        };
        GroupStrategy::new(user, Arc::new(RwLock::new(grouper)))
    }

    fn describe(stage: &mut GroupStrategy<Person>) -> Vec<String> {
        stage
            .items()
            .iter()
            .map(|item| match item.group_key() {
                Some(key) => format!("#{key}"),
                None => item.contents().unwrap().name.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_ungrouped_is_passthrough() {
        let mut stage = strategy(vec![person("M", "Fry"), person("F", "Leela")], false);
        assert_eq!(describe(&mut stage), vec!["Fry", "Leela"]);
        assert_eq!(stage.display_index(1), 1);
        assert_eq!(stage.collection_index(0), Some(0));
    }

    #[test]
    fn test_consecutive_keys_cluster() {
        let mut stage = strategy(
            vec![person("M", "Fry"), person("M", "Farnsworth"), person("F", "Leela")],
            true,
        );
        assert_eq!(describe(&mut stage), vec!["#M", "Fry", "Farnsworth", "#F", "Leela"]);
    }

    #[test]
    fn test_scattered_keys_are_gathered_under_one_header() {
        let mut stage = strategy(
            vec![person("M", "Fry"), person("F", "Leela"), person("M", "Farnsworth")],
            true,
        );
        assert_eq!(
            describe(&mut stage),
            vec!["#M", "Fry", "Farnsworth", "#F", "Leela"]
        );
        // Farnsworth: collection 2, pulled up next to Fry
        assert_eq!(stage.display_index(2), 2);
        assert_eq!(stage.collection_index(2), Some(2));
        // Leela: collection 1, now past the gathered M group
        assert_eq!(stage.display_index(1), 4);
        assert_eq!(stage.collection_index(4), Some(1));
    }

    #[test]
    fn test_index_translation_accounts_for_headers() {
        let mut stage = strategy(
            vec![person("M", "Fry"), person("M", "Farnsworth"), person("F", "Leela")],
            true,
        );
        // Fry: collection 0 -> display 1 (after the "M" header)
        assert_eq!(stage.display_index(0), 1);
        // Leela: collection 2 -> display 4 (after both headers)
        assert_eq!(stage.display_index(2), 4);
        // Headers have no collection index
        assert_eq!(stage.collection_index(0), None);
        assert_eq!(stage.collection_index(3), None);
        assert_eq!(stage.collection_index(4), Some(2));
    }

    #[test]
    fn test_headers_keep_identity_across_invalidate() {
        let mut stage = strategy(vec![person("M", "Fry")], true);
        let header_id = stage.at(0).unwrap().instance_id();
        stage.invalidate();
        assert_eq!(stage.at(0).unwrap().instance_id(), header_id);
    }

    #[test]
    fn test_headers_dropped_on_reset() {
        let mut stage = strategy(vec![person("M", "Fry")], true);
        let header_id = stage.at(0).unwrap().instance_id();
        stage.reset();
        assert_ne!(stage.at(0).unwrap().instance_id(), header_id);
    }

    #[test]
    fn test_none_key_means_no_group() {
        let source = Arc::new(ObservableList::from_items(vec![
            person("", "Nibbler"),
            person("M", "Fry"),
        ]));
        let direct =
            DirectStrategy::new(source as Arc<dyn CollectionSource<Person>>, false, None);
        let user = UserStrategy::new(direct, Arc::new(RwLock::new(Vec::new())));
        let grouper: Option<GroupFn<Person>> = Some(Arc::new(|p: &Person, _, _| {
            if p.gender.is_empty() { None } else { Some(p.gender.to_string()) }
        }));
        let mut stage = GroupStrategy::new(user, Arc::new(RwLock::new(grouper)));

        assert_eq!(describe(&mut stage), vec!["Nibbler", "#M", "Fry"]);
    }
}
