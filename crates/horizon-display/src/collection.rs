//! The projection: a read-only, filtered, sorted, grouped view over a
//! mutable source collection.
//!
//! `Collection<T>` orchestrates the items-strategy pipeline, owns the
//! filter and sort maps, subscribes to the source's change signals and
//! re-emits minimal change notifications in display coordinates. All
//! recomputation is synchronous: it happens inside the call that triggered
//! it, and notifications are flushed only once the triggering update
//! session closes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use horizon_display_core::{ConnectionId, Signal};
use parking_lot::{Mutex, RwLock};

use crate::enumerator::CollectionEnumerator;
use crate::error::{DisplayError, Result};
use crate::handlers::{Comparator, Filter, GroupFn, IdExtractor};
use crate::item::{GroupKey, ItemRef};
use crate::session::{UpdateSession, analyze_changes, split_at_headers};
use crate::source::{
    ChangeAction, ChangeEvent, CollectionSource, IntoSource, ItemChangeEvent, RaisingChange,
};
use crate::strategy::{DirectStrategy, GroupStrategy, ItemsStrategy, SplicePayload, UserStrategy};

/// Notification of a cursor change.
#[derive(Clone)]
pub struct CurrentChange<T> {
    pub new_item: Option<ItemRef<T>>,
    pub old_item: Option<ItemRef<T>>,
    pub new_position: isize,
    pub old_position: isize,
}

/// The signal set of a projection.
///
/// Every batch of structural notifications is bracketed by
/// `before_collection_change` / `after_collection_change`.
pub struct CollectionSignals<T> {
    pub before_collection_change: Signal<()>,
    pub collection_changed: Signal<ChangeEvent<ItemRef<T>>>,
    pub after_collection_change: Signal<()>,
    pub current_changed: Signal<CurrentChange<T>>,
}

impl<T: 'static> Default for CollectionSignals<T> {
    fn default() -> Self {
        Self {
            before_collection_change: Signal::new(),
            collection_changed: Signal::new(),
            after_collection_change: Signal::new(),
            current_changed: Signal::new(),
        }
    }
}

/// Construction options for [`Collection`].
pub struct CollectionOptions<T> {
    filters: Vec<Filter<T>>,
    sorters: Vec<Comparator<T>>,
    group: Option<GroupFn<T>>,
    id_extractor: Option<IdExtractor<T>>,
    unique: bool,
    important_properties: Vec<String>,
}

impl<T> Default for CollectionOptions<T> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sorters: Vec::new(),
            group: None,
            id_extractor: None,
            unique: false,
            important_properties: Vec::new(),
        }
    }
}

impl<T> CollectionOptions<T> {
    pub fn filter(mut self, filter: Filter<T>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, comparator: Comparator<T>) -> Self {
        self.sorters.push(comparator);
        self
    }

    pub fn group_by<F>(mut self, group: F) -> Self
    where
        F: Fn(&T, usize, &ItemRef<T>) -> Option<GroupKey> + Send + Sync + 'static,
    {
        self.group = Some(Arc::new(group));
        self
    }

    /// Configure the identity extractor used by uniqueness and uid lookups.
    pub fn identity<F>(mut self, extract: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.id_extractor = Some(Arc::new(extract));
        self
    }

    /// Keep only the first occurrence of each identity value.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Register an element property whose in-place change must trigger
    /// re-derivation. With no registered properties every reported change
    /// is treated as important.
    pub fn important_property(mut self, name: impl Into<String>) -> Self {
        self.important_properties.push(name.into());
        self
    }
}

/// Connection ids held against the source's signals for teardown.
struct SourceConnections {
    collection: ConnectionId,
    item: ConnectionId,
    raising: ConnectionId,
}

struct State<T> {
    pipeline: GroupStrategy<T>,
    /// Pass/fail per strategy position; `None` means not yet evaluated.
    filter_map: Vec<Option<bool>>,
    /// Strategy positions in display order.
    sort_map: Vec<usize>,
    /// Strategy items at the last map sync, parallel to `filter_map`.
    last_items: Vec<ItemRef<T>>,
    filters: Vec<Filter<T>>,
    important: Vec<String>,
    id_extractor: Option<IdExtractor<T>>,
    current_position: isize,
    session_depth: usize,
    session_before: Vec<ItemRef<T>>,
    session_current: Option<(u64, isize)>,
    raising_enabled: bool,
    raising_analyze: bool,
    /// Item-level change notifications queued while raising is suspended.
    deferred: Vec<ChangeEvent<ItemRef<T>>>,
    uid_map: HashMap<u64, String>,
    uids_used: HashSet<String>,
    utility: Option<CollectionEnumerator<T>>,
}

struct Inner<T> {
    source: Arc<dyn CollectionSource<T>>,
    sorters: Arc<RwLock<Vec<Comparator<T>>>>,
    grouper: Arc<RwLock<Option<GroupFn<T>>>>,
    state: Mutex<State<T>>,
    signals: CollectionSignals<T>,
}

/// A non-destructive projection of a source collection.
///
/// The view is read-only: structural mutators answer
/// [`DisplayError::ReadOnly`] and all change must originate from the
/// source. Dropping the projection disconnects it from the source's
/// signals.
pub struct Collection<T: Clone + PartialEq + Send + Sync + 'static> {
    inner: Arc<Inner<T>>,
    connections: Option<SourceConnections>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Collection<T> {
    pub fn new(source: impl IntoSource<T>) -> Self {
        Self::with_options(source, CollectionOptions::default())
    }

    pub fn with_options(source: impl IntoSource<T>, options: CollectionOptions<T>) -> Self {
        let source = source.into_source();
        let sorters = Arc::new(RwLock::new(options.sorters));
        let grouper = Arc::new(RwLock::new(options.group));

        let direct = DirectStrategy::new(source.clone(), options.unique, options.id_extractor.clone());
        let user = UserStrategy::new(direct, sorters.clone());
        let pipeline = GroupStrategy::new(user, grouper.clone());

        let mut state = State {
            pipeline,
            filter_map: Vec::new(),
            sort_map: Vec::new(),
            last_items: Vec::new(),
            filters: options.filters,
            important: options.important_properties,
            id_extractor: options.id_extractor,
            current_position: -1,
            session_depth: 0,
            session_before: Vec::new(),
            session_current: None,
            raising_enabled: true,
            raising_analyze: false,
            deferred: Vec::new(),
            uid_map: HashMap::new(),
            uids_used: HashSet::new(),
            utility: None,
        };
        Inner::resync(&mut state);
        Inner::refilter(&mut state, None);

        let inner = Arc::new(Inner {
            source: source.clone(),
            sorters,
            grouper,
            state: Mutex::new(state),
            signals: CollectionSignals::default(),
        });

        let connections = source.signals().map(|signals| {
            let weak: Weak<Inner<T>> = Arc::downgrade(&inner);
            let collection = signals.collection_changed.connect(move |event| {
                if let Some(inner) = weak.upgrade() {
                    Inner::on_source_change(&inner, event);
                }
            });
            let weak = Arc::downgrade(&inner);
            let item = signals.item_changed.connect(move |event| {
                if let Some(inner) = weak.upgrade() {
                    Inner::on_source_item_change(&inner, event);
                }
            });
            let weak = Arc::downgrade(&inner);
            let raising = signals.raising_changed.connect(move |change| {
                if let Some(inner) = weak.upgrade() {
                    Inner::on_source_raising_change(&inner, change);
                }
            });
            SourceConnections { collection, item, raising }
        });

        Self { inner, connections }
    }

    /// The projection's signal set.
    pub fn signals(&self) -> &CollectionSignals<T> {
        &self.inner.signals
    }

    /// The source this projection observes.
    pub fn source(&self) -> &Arc<dyn CollectionSource<T>> {
        &self.inner.source
    }

    // ------------------------------------------------------------------
    // Enumeration and positional access
    // ------------------------------------------------------------------

    /// Invoke `f` for each visible item with its display position.
    pub fn each(&self, mut f: impl FnMut(&ItemRef<T>, usize)) {
        let visible = self.items();
        for (position, item) in visible.iter().enumerate() {
            f(item, position);
        }
    }

    /// All visible items in display order.
    pub fn items(&self) -> Vec<ItemRef<T>> {
        let mut state = self.inner.state.lock();
        Inner::utility(&mut state).visible()
    }

    /// A detached enumerator over the current view.
    ///
    /// The enumerator snapshots the maps; it does not track later changes.
    pub fn enumerator(&self) -> CollectionEnumerator<T> {
        let state = self.inner.state.lock();
        CollectionEnumerator::new(
            state.last_items.clone(),
            state.filter_map.clone(),
            state.sort_map.clone(),
        )
    }

    /// The visible item at `index`.
    pub fn at(&self, index: usize) -> Option<ItemRef<T>> {
        let mut state = self.inner.state.lock();
        Inner::utility(&mut state).at(index).cloned()
    }

    /// Number of visible items; with `skip_groups`, group headers are not
    /// counted.
    pub fn count(&self, skip_groups: bool) -> usize {
        let mut state = self.inner.state.lock();
        let utility = Inner::utility(&mut state);
        if skip_groups {
            utility.visible().iter().filter(|item| !item.is_group()).count()
        } else {
            utility.count()
        }
    }

    // ------------------------------------------------------------------
    // Index translation
    // ------------------------------------------------------------------

    /// Display position of the element at source index `source_index`.
    pub fn index_by_source_index(&self, source_index: usize) -> Option<usize> {
        let mut state = self.inner.state.lock();
        let strategy = state.pipeline.display_index(source_index);
        if strategy >= state.last_items.len() {
            return None;
        }
        Inner::utility(&mut state).display_by_strategy(strategy)
    }

    /// Source index of the element at display position `index`.
    pub fn source_index_by_index(&self, index: usize) -> Option<usize> {
        let mut state = self.inner.state.lock();
        let strategy = Inner::utility(&mut state).strategy_by_display(index)?;
        state.pipeline.collection_index(strategy)
    }

    /// The visible item wrapping the element at source index `source_index`.
    pub fn item_by_source_index(&self, source_index: usize) -> Option<ItemRef<T>> {
        let index = self.index_by_source_index(source_index)?;
        self.at(index)
    }

    /// Display position of `element`, if it is visible.
    pub fn index_by_source_item(&self, element: &T) -> Option<usize> {
        let source_index = self.source_index_of(element)?;
        self.index_by_source_index(source_index)
    }

    /// The visible item wrapping `element`.
    pub fn item_by_source_item(&self, element: &T) -> Option<ItemRef<T>> {
        let index = self.index_by_source_item(element)?;
        self.at(index)
    }

    fn source_index_of(&self, element: &T) -> Option<usize> {
        if let Some(list) = self.inner.source.as_list() {
            return list.index_of(element);
        }
        let mut found = None;
        self.inner.source.each(&mut |candidate, index| {
            if found.is_none() && candidate == element {
                found = Some(index);
            }
        });
        found
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// The display identity of `item`, de-duplicated on collision.
    ///
    /// Requires an identity extractor for entry items.
    pub fn item_uid(&self, item: &ItemRef<T>) -> Result<String> {
        let mut state = self.inner.state.lock();
        if let Some(uid) = state.uid_map.get(&item.instance_id()) {
            return Ok(uid.clone());
        }
        let base = match item.group_key() {
            Some(key) => format!("group-{key}"),
            None => {
                let extract = state
                    .id_extractor
                    .as_ref()
                    .ok_or(DisplayError::MissingIdExtractor)?;
                item.contents()
                    .and_then(|contents| extract(&contents))
                    .unwrap_or_else(|| item.instance_id().to_string())
            }
        };
        let mut uid = base.clone();
        let mut attempt = 0;
        while state.uids_used.contains(&uid) {
            attempt += 1;
            uid = format!("{base}-{attempt}");
        }
        state.uids_used.insert(uid.clone());
        state.uid_map.insert(item.instance_id(), uid.clone());
        Ok(uid)
    }

    /// The item with the given instance id, visible or not.
    pub fn by_instance_id(&self, instance_id: u64) -> Option<ItemRef<T>> {
        let state = self.inner.state.lock();
        state
            .last_items
            .iter()
            .find(|item| item.instance_id() == instance_id)
            .cloned()
    }

    /// Display position of the visible item with the given instance id.
    pub fn index_by_instance_id(&self, instance_id: u64) -> Option<usize> {
        let mut state = self.inner.state.lock();
        Inner::utility(&mut state).index_of_instance(instance_id)
    }

    // ------------------------------------------------------------------
    // Filter management
    // ------------------------------------------------------------------

    pub fn filters(&self) -> Vec<Filter<T>> {
        self.inner.state.lock().filters.clone()
    }

    /// Replace the filter chain and re-derive the view.
    pub fn set_filter(&self, filters: Vec<Filter<T>>) {
        let (events, current) = {
            let mut state = self.inner.state.lock();
            Inner::begin_session(&mut state);
            state.filters = filters;
            let len = state.filter_map.len();
            state.filter_map = vec![None; len];
            Inner::refilter(&mut state, None);
            Inner::end_session(&mut state)
        };
        self.inner.dispatch(events, current);
    }

    /// Append a filter unless an identical one is already present.
    pub fn add_filter(&self, filter: Filter<T>) {
        {
            let state = self.inner.state.lock();
            if state.filters.iter().any(|existing| existing.same_as(&filter)) {
                return;
            }
        }
        let mut filters = self.filters();
        filters.push(filter);
        self.set_filter(filters);
    }

    /// Remove a filter by identity; returns whether it was present.
    pub fn remove_filter(&self, filter: &Filter<T>) -> bool {
        let mut filters = self.filters();
        let before = filters.len();
        filters.retain(|existing| !existing.same_as(filter));
        if filters.len() == before {
            return false;
        }
        self.set_filter(filters);
        true
    }

    // ------------------------------------------------------------------
    // Sort management
    // ------------------------------------------------------------------

    pub fn sorts(&self) -> Vec<Comparator<T>> {
        self.inner.sorters.read().clone()
    }

    /// Replace the comparator chain and re-derive the view.
    pub fn set_sort(&self, sorters: Vec<Comparator<T>>) {
        let (events, current) = {
            let mut state = self.inner.state.lock();
            Inner::begin_session(&mut state);
            *self.inner.sorters.write() = sorters;
            state.pipeline.invalidate();
            Inner::resync(&mut state);
            Inner::refilter(&mut state, None);
            Inner::end_session(&mut state)
        };
        self.inner.dispatch(events, current);
    }

    /// Append a comparator unless an identical one is already present.
    pub fn add_sort(&self, comparator: Comparator<T>) {
        let mut sorters = self.sorts();
        if sorters.iter().any(|existing| existing.same_as(&comparator)) {
            return;
        }
        sorters.push(comparator);
        self.set_sort(sorters);
    }

    /// Remove a comparator by identity; returns whether it was present.
    pub fn remove_sort(&self, comparator: &Comparator<T>) -> bool {
        let mut sorters = self.sorts();
        let before = sorters.len();
        sorters.retain(|existing| !existing.same_as(comparator));
        if sorters.len() == before {
            return false;
        }
        self.set_sort(sorters);
        true
    }

    // ------------------------------------------------------------------
    // Group management
    // ------------------------------------------------------------------

    pub fn group(&self) -> Option<GroupFn<T>> {
        self.inner.grouper.read().clone()
    }

    /// Replace the grouping function and re-derive the view.
    pub fn set_group(&self, group: Option<GroupFn<T>>) {
        let (events, current) = {
            let mut state = self.inner.state.lock();
            Inner::begin_session(&mut state);
            *self.inner.grouper.write() = group;
            state.pipeline.invalidate();
            Inner::resync(&mut state);
            Inner::refilter(&mut state, None);
            Inner::end_session(&mut state)
        };
        self.inner.dispatch(events, current);
    }

    /// Visible members of the group with the given key.
    pub fn group_items(&self, key: &str) -> Vec<ItemRef<T>> {
        let visible = self.items();
        let mut members = Vec::new();
        let mut in_group = false;
        for item in visible {
            match item.group_key() {
                Some(current) => in_group = current == key,
                None => {
                    if in_group {
                        members.push(item);
                    }
                }
            }
        }
        members
    }

    /// The group key governing the item at display position `index`.
    pub fn group_by_index(&self, index: usize) -> Option<GroupKey> {
        let visible = self.items();
        visible
            .get(..=index)?
            .iter()
            .rev()
            .find_map(|item| item.group_key().map(str::to_string))
    }

    // ------------------------------------------------------------------
    // Uniqueness
    // ------------------------------------------------------------------

    pub fn is_unique(&self) -> bool {
        self.inner.state.lock().pipeline.source_mut().source_mut().is_unique()
    }

    /// Toggle identity de-duplication and re-derive the view.
    pub fn set_unique(&self, unique: bool) {
        let (events, current) = {
            let mut state = self.inner.state.lock();
            Inner::begin_session(&mut state);
            state.pipeline.source_mut().source_mut().set_unique(unique);
            state.pipeline.invalidate();
            Inner::resync(&mut state);
            Inner::refilter(&mut state, None);
            Inner::end_session(&mut state)
        };
        self.inner.dispatch(events, current);
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// All selected items, ignoring the active filter.
    pub fn selected_items(&self) -> Vec<ItemRef<T>> {
        let state = self.inner.state.lock();
        state
            .last_items
            .iter()
            .filter(|item| !item.is_group() && item.is_selected())
            .cloned()
            .collect()
    }

    /// Set the selection flag of the items wrapping the given elements.
    ///
    /// Emits one batched replace notification covering exactly the visible
    /// items whose flag actually changed.
    pub fn set_selected(&self, elements: &[T], selected: bool) {
        self.update_selection(|item| {
            let contents = item.contents()?;
            elements.contains(&contents).then_some(selected)
        });
    }

    /// Set the selection flag of every item.
    pub fn set_selected_all(&self, selected: bool) {
        self.update_selection(|_| Some(selected));
    }

    /// Invert the selection flag of every item.
    pub fn invert_selected_all(&self) {
        let (events, current) = {
            let mut state = self.inner.state.lock();
            for item in &state.last_items {
                if !item.is_group() {
                    let selected = item.is_selected();
                    item.set_selected(!selected);
                }
            }
            let visible = Inner::utility(&mut state).visible();
            let event = ChangeEvent::reset(visible.clone(), visible);
            Inner::gate(&mut state, vec![event], None)
        };
        self.inner.dispatch(events, current);
    }

    fn update_selection(&self, decide: impl Fn(&ItemRef<T>) -> Option<bool>) {
        let (events, current) = {
            let mut state = self.inner.state.lock();
            let mut changed_ids = HashSet::new();
            for item in &state.last_items {
                if item.is_group() {
                    continue;
                }
                if let Some(selected) = decide(item) {
                    if item.set_selected(selected) {
                        changed_ids.insert(item.instance_id());
                    }
                }
            }
            if changed_ids.is_empty() {
                (Vec::new(), None)
            } else {
                let visible = Inner::utility(&mut state).visible();
                let changed: Vec<(usize, ItemRef<T>)> = visible
                    .into_iter()
                    .enumerate()
                    .filter(|(_, item)| changed_ids.contains(&item.instance_id()))
                    .collect();
                let mut events = Vec::new();
                for (start, items) in crate::session::pack_runs(changed) {
                    events.push(ChangeEvent::replace(items.clone(), items, start));
                }
                Inner::gate(&mut state, events, None)
            }
        };
        self.inner.dispatch(events, current);
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// The item under the navigation cursor.
    pub fn current(&self) -> Option<ItemRef<T>> {
        let mut state = self.inner.state.lock();
        let position = state.current_position;
        if position < 0 {
            return None;
        }
        Inner::utility(&mut state).at(position as usize).cloned()
    }

    /// The cursor position; `-1` when unset.
    pub fn current_position(&self) -> isize {
        self.inner.state.lock().current_position
    }

    /// Place the cursor at `position` and notify.
    pub fn set_current_position(&self, position: isize) -> Result<()> {
        self.reposition(position, false)
    }

    /// Place the cursor at `position` without notifying.
    pub fn set_current_position_silent(&self, position: isize) -> Result<()> {
        self.reposition(position, true)
    }

    /// Place the cursor on `item`; returns `false` if it is not visible.
    pub fn set_current(&self, item: &ItemRef<T>) -> bool {
        let position = {
            let mut state = self.inner.state.lock();
            Inner::utility(&mut state).index_of_instance(item.instance_id())
        };
        match position {
            Some(position) => self.reposition(position as isize, false).is_ok(),
            None => false,
        }
    }

    fn reposition(&self, position: isize, silent: bool) -> Result<()> {
        let change = {
            let mut state = self.inner.state.lock();
            let count = Inner::utility(&mut state).count() as isize;
            if position < -1 || position >= count {
                return Err(DisplayError::IndexOutOfBounds(position));
            }
            let old_position = state.current_position;
            if old_position == position {
                return Ok(());
            }
            let old_item = Self::item_at_position(&mut state, old_position);
            state.current_position = position;
            let new_item = Self::item_at_position(&mut state, position);
            if silent || !state.raising_enabled {
                None
            } else {
                Some(CurrentChange {
                    new_item,
                    old_item,
                    new_position: position,
                    old_position,
                })
            }
        };
        if let Some(change) = change {
            self.inner.signals.current_changed.emit(change);
        }
        Ok(())
    }

    fn item_at_position(state: &mut State<T>, position: isize) -> Option<ItemRef<T>> {
        if position < 0 {
            return None;
        }
        Inner::utility(state).at(position as usize).cloned()
    }

    /// Advance the cursor to the next entry, skipping group headers.
    pub fn move_to_next(&self) -> bool {
        self.step_cursor(1)
    }

    /// Step the cursor back to the previous entry, skipping group headers.
    pub fn move_to_previous(&self) -> bool {
        self.step_cursor(-1)
    }

    fn step_cursor(&self, step: isize) -> bool {
        let target = {
            let mut state = self.inner.state.lock();
            let count = Inner::utility(&mut state).count() as isize;
            let mut position = state.current_position;
            loop {
                position += step;
                if position < 0 || position >= count {
                    break None;
                }
                let is_group = Inner::utility(&mut state)
                    .at(position as usize)
                    .is_some_and(|item| item.is_group());
                if !is_group {
                    break Some(position);
                }
            }
        };
        match target {
            Some(position) => self.reposition(position, false).is_ok(),
            None => false,
        }
    }

    /// Move the cursor to the first entry.
    pub fn move_to_first(&self) -> bool {
        match self.entry_position_from(0, 1) {
            Some(position) if position != self.current_position() => {
                self.reposition(position, false).is_ok()
            }
            _ => false,
        }
    }

    /// Move the cursor to the last entry.
    pub fn move_to_last(&self) -> bool {
        let count = self.count(false);
        if count == 0 {
            return false;
        }
        match self.entry_position_from(count as isize - 1, -1) {
            Some(position) if position != self.current_position() => {
                self.reposition(position, false).is_ok()
            }
            _ => false,
        }
    }

    /// The first entry of the view.
    pub fn first(&self) -> Option<ItemRef<T>> {
        let position = self.entry_position_from(0, 1)?;
        self.at(position as usize)
    }

    /// The last entry of the view.
    pub fn last(&self) -> Option<ItemRef<T>> {
        let count = self.count(false);
        let position = self.entry_position_from(count as isize - 1, -1)?;
        self.at(position as usize)
    }

    /// The entry following `item` in display order.
    pub fn next_for(&self, item: &ItemRef<T>) -> Option<ItemRef<T>> {
        let index = self.index_by_instance_id(item.instance_id())?;
        let position = self.entry_position_from(index as isize + 1, 1)?;
        self.at(position as usize)
    }

    /// The entry preceding `item` in display order.
    pub fn previous_for(&self, item: &ItemRef<T>) -> Option<ItemRef<T>> {
        let index = self.index_by_instance_id(item.instance_id())?;
        let position = self.entry_position_from(index as isize - 1, -1)?;
        self.at(position as usize)
    }

    /// First non-header position at or beyond `from`, walking by `step`.
    fn entry_position_from(&self, from: isize, step: isize) -> Option<isize> {
        let mut state = self.inner.state.lock();
        let count = Inner::utility(&mut state).count() as isize;
        let mut position = from;
        while position >= 0 && position < count {
            let is_group = Inner::utility(&mut state)
                .at(position as usize)
                .is_some_and(|item| item.is_group());
            if !is_group {
                return Some(position);
            }
            position += step;
        }
        None
    }

    // ------------------------------------------------------------------
    // Change propagation
    // ------------------------------------------------------------------

    /// Report an in-place change of `element` to the projection.
    ///
    /// Used when the source collection is not observable or when the
    /// change bypassed it.
    pub fn notify_item_change(&self, element: &T, properties: &[&str]) {
        let Some(index) = self.source_index_of(element) else {
            return;
        };
        let properties: Vec<String> = properties.iter().map(|p| p.to_string()).collect();
        let (events, current) = {
            let mut state = self.inner.state.lock();
            Inner::apply_item_change(&mut state, index, element.clone(), &properties)
        };
        self.inner.dispatch(events, current);
    }

    // ------------------------------------------------------------------
    // Update sessions
    // ------------------------------------------------------------------

    /// Open a coalescing session: notifications are withheld until the
    /// matching [`finish_update_session`] call.
    ///
    /// [`finish_update_session`]: Collection::finish_update_session
    pub fn start_update_session(&self) -> UpdateSession {
        let mut state = self.inner.state.lock();
        Inner::begin_session(&mut state);
        UpdateSession { owner: Arc::as_ptr(&self.inner) as *const () as usize }
    }

    /// Close a session; the outermost close diffs the view against the
    /// session-start snapshot and flushes minimal notifications.
    ///
    /// A token minted by a different collection is rejected without
    /// touching this projection's session depth.
    pub fn finish_update_session(&self, session: UpdateSession) {
        if session.owner != Arc::as_ptr(&self.inner) as *const () as usize {
            tracing::warn!(
                target: "horizon_display::collection",
                "update session token belongs to a different collection; ignored"
            );
            return;
        }
        drop(session);
        let (events, current) = {
            let mut state = self.inner.state.lock();
            Inner::end_session(&mut state)
        };
        self.inner.dispatch(events, current);
    }

    // ------------------------------------------------------------------
    // Event raising
    // ------------------------------------------------------------------

    /// Whether this projection currently delivers notifications.
    pub fn is_event_raising(&self) -> bool {
        self.inner.state.lock().raising_enabled
    }

    /// Suspend or resume notification delivery.
    ///
    /// Suspending with `analyze` opens a session spanning the suspension;
    /// resuming closes it and flushes the coalesced diff. Without
    /// `analyze`, resuming silently rebuilds the whole view first.
    /// Item-level change notifications received while suspended are
    /// queued and replayed in FIFO order after resuming.
    pub fn set_event_raising(&self, enabled: bool, analyze: bool) {
        let (events, current, deferred) = {
            let mut state = self.inner.state.lock();
            if state.raising_enabled == enabled {
                return;
            }
            if !enabled {
                state.raising_enabled = false;
                state.raising_analyze = analyze;
                if analyze {
                    Inner::begin_session(&mut state);
                }
                (Vec::new(), None, Vec::new())
            } else {
                state.raising_enabled = true;
                let analyzed = state.raising_analyze;
                state.raising_analyze = false;
                let deferred = std::mem::take(&mut state.deferred);
                if analyzed {
                    let (events, current) = Inner::end_session(&mut state);
                    (events, current, deferred)
                } else {
                    // The suspension spanned unanalyzed changes: resynchronize
                    // wholesale before replaying anything
                    state.pipeline.reset();
                    Inner::resync(&mut state);
                    Inner::refilter(&mut state, None);
                    state.current_position = -1;
                    (Vec::new(), None, deferred)
                }
            }
        };
        self.inner.dispatch(events, current);
        for event in deferred {
            self.inner.dispatch(vec![event], None);
        }
    }

    // ------------------------------------------------------------------
    // Read-only guards
    // ------------------------------------------------------------------

    /// Unsupported: the projection is read-only.
    pub fn add(&self, _element: T) -> Result<()> {
        Err(DisplayError::ReadOnly)
    }

    /// Unsupported: the projection is read-only.
    pub fn remove(&self, _element: &T) -> Result<()> {
        Err(DisplayError::ReadOnly)
    }

    /// Unsupported: the projection is read-only.
    pub fn replace(&self, _index: usize, _element: T) -> Result<()> {
        Err(DisplayError::ReadOnly)
    }

    /// Unsupported: the projection is read-only.
    pub fn move_item(&self, _from: usize, _to: usize) -> Result<()> {
        Err(DisplayError::ReadOnly)
    }

    /// Unsupported: the projection is read-only.
    pub fn assign(&self, _elements: Vec<T>) -> Result<()> {
        Err(DisplayError::ReadOnly)
    }

    /// Unsupported: the projection is read-only.
    pub fn append(&self, _elements: Vec<T>) -> Result<()> {
        Err(DisplayError::ReadOnly)
    }

    /// Unsupported: the projection is read-only.
    pub fn prepend(&self, _elements: Vec<T>) -> Result<()> {
        Err(DisplayError::ReadOnly)
    }

    /// Unsupported: the projection is read-only.
    pub fn clear(&self) -> Result<()> {
        Err(DisplayError::ReadOnly)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Drop for Collection<T> {
    fn drop(&mut self) {
        if let (Some(connections), Some(signals)) =
            (self.connections.take(), self.inner.source.signals())
        {
            signals.collection_changed.disconnect(connections.collection);
            signals.item_changed.disconnect(connections.item);
            signals.raising_changed.disconnect(connections.raising);
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Inner<T> {
    /// Rebuild the maps after a structural pipeline change, carrying over
    /// filter verdicts of surviving items by instance identity.
    fn resync(state: &mut State<T>) {
        let new_items = state.pipeline.items();
        let old_verdicts: HashMap<u64, Option<bool>> = state
            .last_items
            .iter()
            .zip(state.filter_map.iter())
            .map(|(item, &verdict)| (item.instance_id(), verdict))
            .collect();
        state.filter_map = new_items
            .iter()
            .map(|item| old_verdicts.get(&item.instance_id()).copied().flatten())
            .collect();
        state.sort_map = (0..new_items.len()).collect();
        state.last_items = new_items;
        state.utility = None;
    }

    /// Re-run the filter chain.
    ///
    /// `range` bounds the display-walk positions to re-evaluate; entries
    /// without a recorded verdict and group headers are always evaluated.
    /// A positional filter forces a full pass regardless of the range.
    fn refilter(state: &mut State<T>, range: Option<(usize, usize)>) {
        let filters = state.filters.clone();
        let uses_position = filters.iter().any(Filter::uses_position);
        let items = state.last_items.clone();
        let total = items.len();
        let collection_indices: Vec<Option<usize>> =
            (0..total).map(|index| state.pipeline.collection_index(index)).collect();
        let (start, count) = match range {
            Some(range) if !uses_position => range,
            _ => (0, total),
        };

        let walk = state.sort_map.clone();
        let mut new_map = state.filter_map.clone();
        new_map.resize(total, None);
        let mut changed = false;

        // Pass 1: entries. Headers collect whether any member passed.
        let mut header_members: HashMap<usize, bool> = HashMap::new();
        let mut current_header: Option<usize> = None;
        let mut position = 0usize;
        for &index in &walk {
            let item = &items[index];
            // Walk positions count every slot of the sorted walk, headers
            // included, so they line up with the display-index ranges the
            // structural arms pass in.
            let walk_position = position;
            position += 1;
            if item.is_group() {
                current_header = Some(index);
                header_members.entry(index).or_insert(false);
                continue;
            }
            let old = new_map.get(index).copied().flatten();
            let must_evaluate =
                old.is_none() || (walk_position >= start && walk_position < start + count);
            let verdict = if must_evaluate {
                let pass = match item.contents() {
                    Some(contents) => {
                        let collection_index = collection_indices[index].unwrap_or(0);
                        filters
                            .iter()
                            .all(|f| f.matches(&contents, collection_index, item, walk_position))
                    }
                    None => true,
                };
                Some(pass)
            } else {
                old
            };
            if verdict != old {
                changed = true;
            }
            new_map[index] = verdict;
            if verdict == Some(true) {
                if let Some(header) = current_header {
                    header_members.insert(header, true);
                }
            }
        }

        // Pass 2: headers. A header passes iff it has a passing member,
        // unless a group predicate overrides the rule.
        for (&index, &has_members) in &header_members {
            let key = items[index].group_key().unwrap_or_default();
            let overrides: Vec<bool> = filters
                .iter()
                .filter_map(|f| f.matches_group(key, has_members))
                .collect();
            let pass = if overrides.is_empty() {
                has_members
            } else {
                overrides.iter().all(|&v| v)
            };
            if new_map[index] != Some(pass) {
                changed = true;
            }
            new_map[index] = Some(pass);
        }

        state.filter_map = new_map;
        if changed {
            state.utility = None;
            tracing::trace!(
                target: "horizon_display::collection",
                total,
                "filter verdicts changed, indexer invalidated"
            );
        }
    }

    /// The lazily rebuilt utility enumerator over the current maps.
    fn utility(state: &mut State<T>) -> &mut CollectionEnumerator<T> {
        if state.utility.is_none() {
            state.utility = Some(CollectionEnumerator::new(
                state.last_items.clone(),
                state.filter_map.clone(),
                state.sort_map.clone(),
            ));
        }
        state.utility.as_mut().unwrap()
    }

    fn begin_session(state: &mut State<T>) {
        state.session_depth += 1;
        if state.session_depth == 1 {
            state.session_before = Self::utility(state).visible();
            state.session_current = (state.current_position >= 0).then(|| {
                let position = state.current_position;
                let id = Self::utility(state)
                    .at(position as usize)
                    .map(|item| item.instance_id())
                    .unwrap_or(0);
                (id, position)
            });
        }
    }

    /// Close one session level. The outermost close diffs the view against
    /// the session snapshot, restores the cursor and gates the result on
    /// the raising state.
    fn end_session(state: &mut State<T>) -> (Vec<ChangeEvent<ItemRef<T>>>, Option<CurrentChange<T>>) {
        if state.session_depth == 0 {
            return (Vec::new(), None);
        }
        state.session_depth -= 1;
        if state.session_depth > 0 {
            return (Vec::new(), None);
        }
        let before = std::mem::take(&mut state.session_before);
        let session_current = state.session_current.take();
        let after = Self::utility(state).visible();

        let mut events = analyze_changes(&before, &after);
        if state.pipeline.is_grouped() {
            events = events.into_iter().flat_map(split_at_headers).collect();
        }

        let mut current = None;
        if let Some((id, old_position)) = session_current {
            match Self::utility(state).index_of_instance(id) {
                Some(position) => state.current_position = position as isize,
                None => {
                    state.current_position = -1;
                    let old_item = before.get(old_position as usize).cloned();
                    current = Some(CurrentChange {
                        new_item: None,
                        old_item,
                        new_position: -1,
                        old_position,
                    });
                }
            }
        }
        Self::gate(state, events, current)
    }

    /// Withhold notifications while raising is suspended: item-level
    /// changes are queued for replay, everything else is dropped (the
    /// resume path resynchronizes).
    fn gate(
        state: &mut State<T>,
        events: Vec<ChangeEvent<ItemRef<T>>>,
        current: Option<CurrentChange<T>>,
    ) -> (Vec<ChangeEvent<ItemRef<T>>>, Option<CurrentChange<T>>) {
        if state.raising_enabled {
            return (events, current);
        }
        for event in events {
            if event.action == ChangeAction::Change {
                state.deferred.push(event);
            }
        }
        (Vec::new(), None)
    }

    fn dispatch(&self, events: Vec<ChangeEvent<ItemRef<T>>>, current: Option<CurrentChange<T>>) {
        if !events.is_empty() {
            self.signals.before_collection_change.emit(());
            for event in events {
                tracing::debug!(
                    target: "horizon_display::collection",
                    action = ?event.action,
                    new_index = event.new_index,
                    old_index = event.old_index,
                    "projection change"
                );
                self.signals.collection_changed.emit(event);
            }
            self.signals.after_collection_change.emit(());
        }
        if let Some(current) = current {
            self.signals.current_changed.emit(current);
        }
    }

    fn on_source_change(inner: &Arc<Inner<T>>, event: &ChangeEvent<T>) {
        let (events, current) = {
            let mut state = inner.state.lock();
            Self::apply_source_change(&mut state, event)
        };
        inner.dispatch(events, current);
    }

    /// The source-event state machine.
    fn apply_source_change(
        state: &mut State<T>,
        event: &ChangeEvent<T>,
    ) -> (Vec<ChangeEvent<ItemRef<T>>>, Option<CurrentChange<T>>) {
        match event.action {
            ChangeAction::Reset => {
                let old_visible = Self::utility(state).visible();
                state.pipeline.reset();
                Self::resync(state);
                Self::refilter(state, None);
                let mut current = None;
                if state.current_position >= 0 {
                    let old_position = state.current_position;
                    state.current_position = -1;
                    current = Some(CurrentChange {
                        new_item: None,
                        old_item: old_visible.get(old_position as usize).cloned(),
                        new_position: -1,
                        old_position,
                    });
                }
                if state.session_depth > 0 {
                    // An outer session will report the rebuild as its diff
                    return Self::gate(state, Vec::new(), current);
                }
                let new_visible = Self::utility(state).visible();
                let reset = ChangeEvent::reset(old_visible, new_visible);
                Self::gate(state, vec![reset], current)
            }
            ChangeAction::Add => {
                Self::begin_session(state);
                state.pipeline.splice(
                    event.new_index,
                    0,
                    SplicePayload::Contents(event.new_items.clone()),
                );
                Self::resync(state);
                let start = state.pipeline.display_index(event.new_index);
                Self::refilter(state, Some((start, event.new_items.len())));
                Self::end_session(state)
            }
            ChangeAction::Remove => {
                Self::begin_session(state);
                state.pipeline.splice(
                    event.old_index,
                    event.old_items.len(),
                    SplicePayload::Items(Vec::new()),
                );
                Self::resync(state);
                // Surviving verdicts carry over; only unevaluated entries
                // and headers are revisited unless a filter is positional
                Self::refilter(state, Some((0, 0)));
                Self::end_session(state)
            }
            ChangeAction::Replace => {
                Self::begin_session(state);
                state.pipeline.splice(
                    event.old_index,
                    event.old_items.len(),
                    SplicePayload::Contents(event.new_items.clone()),
                );
                Self::resync(state);
                let start = state.pipeline.display_index(event.new_index);
                Self::refilter(state, Some((start, event.new_items.len())));
                Self::end_session(state)
            }
            ChangeAction::Move => {
                Self::begin_session(state);
                let moved = state.pipeline.splice(
                    event.old_index,
                    event.old_items.len(),
                    SplicePayload::Items(Vec::new()),
                );
                state
                    .pipeline
                    .splice(event.new_index, 0, SplicePayload::Items(moved.items));
                Self::resync(state);
                let start = state.pipeline.display_index(event.new_index);
                Self::refilter(state, Some((start, event.new_items.len())));
                Self::end_session(state)
            }
            ChangeAction::Change => {
                let mut events = Vec::new();
                let mut current = None;
                for (offset, element) in event.new_items.iter().enumerate() {
                    let (mut item_events, item_current) = Self::apply_item_change(
                        state,
                        event.new_index + offset,
                        element.clone(),
                        &[],
                    );
                    events.append(&mut item_events);
                    current = current.or(item_current);
                }
                (events, current)
            }
        }
    }

    fn on_source_item_change(inner: &Arc<Inner<T>>, event: &ItemChangeEvent<T>) {
        let (events, current) = {
            let mut state = inner.state.lock();
            Self::apply_item_change(&mut state, event.index, event.item.clone(), &event.properties)
        };
        inner.dispatch(events, current);
    }

    /// React to one element changing in place.
    ///
    /// Unimportant changes are forwarded as a change notification at the
    /// element's display position. Important changes re-derive the region:
    /// if the element ends up elsewhere the session diff reports a move
    /// (or remove/add when filtering flipped); if it stays put an explicit
    /// change notification is emitted so observers are not silently missed.
    fn apply_item_change(
        state: &mut State<T>,
        index: usize,
        element: T,
        properties: &[String],
    ) -> (Vec<ChangeEvent<ItemRef<T>>>, Option<CurrentChange<T>>) {
        if let Some(item) = state.pipeline.source_mut().source_mut().raw_at(index) {
            item.set_contents(element);
        }

        let important = properties.is_empty()
            || state.important.is_empty()
            || properties.iter().any(|p| state.important.contains(p));

        let strategy = state.pipeline.display_index(index);
        let item = state.last_items.get(strategy).cloned();

        if !important {
            let Some(item) = item else {
                return (Vec::new(), None);
            };
            let Some(position) = Self::utility(state).display_by_strategy(strategy) else {
                return (Vec::new(), None);
            };
            let event = ChangeEvent::changed(vec![item], position);
            return Self::gate(state, vec![event], None);
        }

        let before = item
            .as_ref()
            .and_then(|item| Self::utility(state).index_of_instance(item.instance_id()));

        Self::begin_session(state);
        state.pipeline.invalidate();
        Self::resync(state);
        Self::refilter(state, None);
        let (mut events, current) = Self::end_session(state);

        let after = item
            .as_ref()
            .and_then(|item| Self::utility(state).index_of_instance(item.instance_id()));
        if before == after {
            if let (Some(item), Some(position)) = (item, after) {
                let event = ChangeEvent::changed(vec![item], position);
                let (mut gated, _) = Self::gate(state, vec![event], None);
                events.append(&mut gated);
            }
        }
        (events, current)
    }

    fn on_source_raising_change(inner: &Arc<Inner<T>>, change: &RaisingChange) {
        // A source that resumed without analysis replayed nothing: rebuild
        // wholesale and report one reset
        if !(change.enabled && !change.analyzed) {
            return;
        }
        let (events, current) = {
            let mut state = inner.state.lock();
            let reset = ChangeEvent {
                action: ChangeAction::Reset,
                new_items: Vec::new(),
                new_index: 0,
                old_items: Vec::new(),
                old_index: 0,
            };
            Self::apply_source_change(&mut state, &reset)
        };
        inner.dispatch(events, current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::DisplayItem;
    use crate::source::ObservableList;

    #[derive(Clone, PartialEq, Debug)]
    struct Rec {
        id: u32,
        title: String,
    }

    fn rec(id: u32, title: &str) -> Rec {
        Rec { id, title: title.to_string() }
    }

    fn titles(collection: &Collection<Rec>) -> Vec<String> {
        collection
            .items()
            .iter()
            .map(|item| match item.group_key() {
                Some(key) => format!("#{key}"),
                None => item.contents().unwrap().title,
            })
            .collect()
    }

    // ====================================================================
    // Construction and access
    // ====================================================================

    #[test]
    fn test_plain_view_mirrors_source() {
        let collection = Collection::new(vec![rec(1, "a"), rec(2, "b")]);
        assert_eq!(titles(&collection), vec!["a", "b"]);
        assert_eq!(collection.count(false), 2);
        assert_eq!(collection.at(1).unwrap().contents().unwrap().id, 2);
        assert!(collection.at(2).is_none());
    }

    #[test]
    fn test_each_passes_positions() {
        let collection = Collection::new(vec![rec(1, "a"), rec(2, "b")]);
        let mut seen = Vec::new();
        collection.each(|item, position| {
            seen.push((item.contents().unwrap().id, position));
        });
        assert_eq!(seen, vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn test_read_only_guards() {
        let collection = Collection::new(vec![rec(1, "a")]);
        assert_eq!(collection.add(rec(2, "b")), Err(DisplayError::ReadOnly));
        assert_eq!(collection.remove(&rec(1, "a")), Err(DisplayError::ReadOnly));
        assert_eq!(collection.clear(), Err(DisplayError::ReadOnly));
        assert_eq!(collection.move_item(0, 0), Err(DisplayError::ReadOnly));
        assert_eq!(collection.count(false), 1);
    }

    // ====================================================================
    // Index translation
    // ====================================================================

    #[test]
    fn test_index_bijection() {
        let collection = Collection::with_options(
            vec![rec(3, "c"), rec(1, "a"), rec(2, "b")],
            CollectionOptions::default().sort(Comparator::by_key(|r: &Rec| r.title.clone())),
        );
        for display in 0..collection.count(false) {
            let source = collection.source_index_by_index(display).unwrap();
            assert_eq!(collection.index_by_source_index(source), Some(display));
        }
    }

    #[test]
    fn test_filtered_out_item_translates_to_none() {
        let collection = Collection::with_options(
            vec![rec(1, "keep"), rec(2, "drop")],
            CollectionOptions::default().filter(Filter::new(|r: &Rec| r.title == "keep")),
        );
        assert_eq!(collection.index_by_source_index(0), Some(0));
        assert_eq!(collection.index_by_source_index(1), None);
        assert_eq!(collection.index_by_source_item(&rec(2, "drop")), None);
    }

    // ====================================================================
    // Identity
    // ====================================================================

    #[test]
    fn test_item_uid_requires_extractor() {
        let collection = Collection::new(vec![rec(1, "a")]);
        let item = collection.at(0).unwrap();
        assert_eq!(collection.item_uid(&item), Err(DisplayError::MissingIdExtractor));
    }

    #[test]
    fn test_item_uid_collisions_are_suffixed() {
        let collection = Collection::with_options(
            vec![rec(7, "a"), rec(7, "b"), rec(7, "c")],
            CollectionOptions::default().identity(|r: &Rec| Some(r.id.to_string())),
        );
        let uids: Vec<String> = (0..3)
            .map(|i| collection.item_uid(&collection.at(i).unwrap()).unwrap())
            .collect();
        assert_eq!(uids, vec!["7", "7-1", "7-2"]);
        // Stable on re-query
        assert_eq!(collection.item_uid(&collection.at(1).unwrap()).unwrap(), "7-1");
    }

    #[test]
    fn test_by_instance_id() {
        let collection = Collection::new(vec![rec(1, "a")]);
        let item = collection.at(0).unwrap();
        let found = collection.by_instance_id(item.instance_id()).unwrap();
        assert_eq!(found.instance_id(), item.instance_id());
        assert_eq!(collection.index_by_instance_id(item.instance_id()), Some(0));
        assert!(collection.by_instance_id(u64::MAX).is_none());
    }

    // ====================================================================
    // Selection
    // ====================================================================

    #[test]
    fn test_selection_ignores_filter() {
        let collection = Collection::with_options(
            vec![rec(1, "keep"), rec(2, "drop")],
            CollectionOptions::default().filter(Filter::new(|r: &Rec| r.title == "keep")),
        );
        collection.set_selected_all(true);
        let selected = collection.selected_items();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_selection_emits_only_actual_changes() {
        let list = Arc::new(ObservableList::from_items(vec![rec(1, "a"), rec(2, "b")]));
        let collection = Collection::new(list);
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        collection.signals().collection_changed.connect(move |event| {
            events_clone.lock().push((event.action, event.new_items.len()));
        });

        collection.set_selected(&[rec(1, "a")], true);
        // Selecting the same element again changes nothing
        collection.set_selected(&[rec(1, "a")], true);

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], (ChangeAction::Replace, 1));
    }

    #[test]
    fn test_invert_selection() {
        let collection = Collection::new(vec![rec(1, "a"), rec(2, "b")]);
        collection.set_selected(&[rec(1, "a")], true);
        collection.invert_selected_all();
        let selected = collection.selected_items();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].contents().unwrap().id, 2);
    }

    // ====================================================================
    // Groups
    // ====================================================================

    #[test]
    fn test_group_lookup() {
        let collection = Collection::with_options(
            vec![rec(1, "ant"), rec(2, "axe"), rec(3, "bee")],
            CollectionOptions::default()
                .group_by(|r: &Rec, _, _| Some(r.title[..1].to_string())),
        );
        assert_eq!(titles(&collection), vec!["#a", "ant", "axe", "#b", "bee"]);
        assert_eq!(collection.group_items("a").len(), 2);
        assert_eq!(collection.group_by_index(4), Some("b".to_string()));
        assert_eq!(collection.group_by_index(1), Some("a".to_string()));
        assert_eq!(collection.count(true), 3);
    }

    // ====================================================================
    // Session tokens
    // ====================================================================

    #[test]
    fn test_foreign_session_token_is_rejected() {
        let list = Arc::new(ObservableList::from_items(vec![rec(1, "a")]));
        let other = Collection::new(vec![rec(9, "z")]);
        let collection = Collection::new(list.clone());

        let stray = other.start_update_session();
        collection.finish_update_session(stray);

        // Depth untouched: the collection still delivers notifications.
        let events: Arc<parking_lot::Mutex<Vec<ChangeAction>>> = Arc::default();
        let sink = events.clone();
        collection
            .signals()
            .collection_changed
            .connect(move |event| sink.lock().push(event.action));
        list.push(rec(2, "b"));
        assert_eq!(*events.lock(), vec![ChangeAction::Add]);
    }

    // ====================================================================
    // Teardown
    // ====================================================================

    #[test]
    fn test_drop_disconnects_from_source() {
        let list = Arc::new(ObservableList::from_items(vec![rec(1, "a")]));
        let signals = list.signals();
        let baseline = signals.collection_changed.connection_count();
        {
            let _collection = Collection::new(list.clone());
            assert_eq!(signals.collection_changed.connection_count(), baseline + 1);
        }
        assert_eq!(signals.collection_changed.connection_count(), baseline);
        assert_eq!(signals.item_changed.connection_count(), 0);
        assert_eq!(signals.raising_changed.connection_count(), 0);
    }

    #[test]
    fn test_group_header_type_helpers() {
        let header = DisplayItem::<Rec>::group("x");
        assert!(header.is_group());
    }
}
