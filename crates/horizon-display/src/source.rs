//! Source collection contracts and the default observable list.
//!
//! A projection consumes its source through three capability traits:
//!
//! - [`Enumerable`]: the only required capability (`count`, `each`);
//! - [`SourceList`]: positional access, enabling index translation;
//! - observability, exposed as [`CollectionSource::signals`], enabling
//!   live updates.
//!
//! Capabilities are probed once, when the projection is constructed, and
//! held as typed accessors from then on. [`ObservableList`] implements all
//! three and is the adapter a bare `Vec<T>` is wrapped into.

use std::sync::Arc;

use horizon_display_core::Signal;
use parking_lot::{Mutex, RwLock};

/// The kind of a structural change notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeAction {
    /// The whole collection was rebuilt; old and new carry the full sets.
    Reset,
    /// Items were inserted at `new_index`.
    Add,
    /// Items were removed from `old_index`.
    Remove,
    /// Items at `old_index`/`new_index` were replaced in place.
    Replace,
    /// Items moved from `old_index` to `new_index`.
    Move,
    /// Items changed in place without moving.
    Change,
}

/// One structural change notification.
///
/// The same shape is used on both sides of a projection: sources emit it
/// over raw elements (`ChangeEvent<T>`), projections re-emit it in display
/// coordinates over items (`ChangeEvent<ItemRef<T>>`).
#[derive(Clone, Debug)]
pub struct ChangeEvent<I> {
    pub action: ChangeAction,
    pub new_items: Vec<I>,
    pub new_index: usize,
    pub old_items: Vec<I>,
    pub old_index: usize,
}

impl<I> ChangeEvent<I> {
    pub fn reset(old_items: Vec<I>, new_items: Vec<I>) -> Self {
        Self { action: ChangeAction::Reset, new_items, new_index: 0, old_items, old_index: 0 }
    }

    pub fn add(new_items: Vec<I>, new_index: usize) -> Self {
        Self { action: ChangeAction::Add, new_items, new_index, old_items: Vec::new(), old_index: 0 }
    }

    pub fn remove(old_items: Vec<I>, old_index: usize) -> Self {
        Self { action: ChangeAction::Remove, new_items: Vec::new(), new_index: 0, old_items, old_index }
    }

    pub fn replace(old_items: Vec<I>, new_items: Vec<I>, index: usize) -> Self {
        Self { action: ChangeAction::Replace, new_items, new_index: index, old_items, old_index: index }
    }

    pub fn moved(items: Vec<I>, old_index: usize, new_index: usize) -> Self
    where
        I: Clone,
    {
        Self { action: ChangeAction::Move, new_items: items.clone(), new_index, old_items: items, old_index }
    }

    pub fn changed(items: Vec<I>, index: usize) -> Self
    where
        I: Clone,
    {
        Self { action: ChangeAction::Change, new_items: items.clone(), new_index: index, old_items: items, old_index: index }
    }
}

/// An in-place change of one element.
#[derive(Clone, Debug)]
pub struct ItemChangeEvent<T> {
    /// The element's new value.
    pub item: T,
    /// The element's index in the source.
    pub index: usize,
    /// Names of the properties that changed, when known.
    pub properties: Vec<String>,
}

/// Emitted when a source's event raising is toggled.
#[derive(Clone, Copy, Debug)]
pub struct RaisingChange {
    /// The new raising state.
    pub enabled: bool,
    /// Whether changes made during the suspension were recorded and
    /// replayed. When `false` on resume, observers must resynchronize.
    pub analyzed: bool,
}

/// The signal set of an observable source.
pub struct SourceSignals<T> {
    pub collection_changed: Signal<ChangeEvent<T>>,
    pub item_changed: Signal<ItemChangeEvent<T>>,
    pub raising_changed: Signal<RaisingChange>,
}

impl<T: 'static> Default for SourceSignals<T> {
    fn default() -> Self {
        Self {
            collection_changed: Signal::new(),
            item_changed: Signal::new(),
            raising_changed: Signal::new(),
        }
    }
}

/// Minimal capability every source must have.
pub trait Enumerable<T>: Send + Sync {
    /// Number of elements.
    fn count(&self) -> usize;

    /// Invoke `f` for each element in order with its index.
    fn each(&self, f: &mut dyn FnMut(&T, usize));
}

/// Positional-access capability.
pub trait SourceList<T>: Enumerable<T> {
    /// The element at `index`, if any.
    fn at(&self, index: usize) -> Option<T>;

    /// The index of the first element equal to `item`.
    fn index_of(&self, item: &T) -> Option<usize>;
}

/// The full source contract consumed by a projection.
///
/// The optional capabilities default to absent; a type that is a plain
/// enumerable needs to implement nothing beyond [`Enumerable`].
pub trait CollectionSource<T>: Enumerable<T> {
    /// Positional access, when the source supports it.
    fn as_list(&self) -> Option<&dyn SourceList<T>> {
        None
    }

    /// Change signals, when the source is observable.
    fn signals(&self) -> Option<&SourceSignals<T>> {
        None
    }
}

/// Conversion into a shared source handle.
///
/// Lets `Collection::new` accept a bare `Vec<T>` (auto-wrapped into an
/// [`ObservableList`]) or any already-shared source.
pub trait IntoSource<T> {
    fn into_source(self) -> Arc<dyn CollectionSource<T>>;
}

impl<T: Clone + PartialEq + Send + Sync + 'static> IntoSource<T> for Vec<T> {
    fn into_source(self) -> Arc<dyn CollectionSource<T>> {
        Arc::new(ObservableList::from_items(self))
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> IntoSource<T> for Arc<ObservableList<T>> {
    fn into_source(self) -> Arc<dyn CollectionSource<T>> {
        self
    }
}

impl<T> IntoSource<T> for Arc<dyn CollectionSource<T>> {
    fn into_source(self) -> Arc<dyn CollectionSource<T>> {
        self
    }
}

/// A change recorded while event raising was suspended.
enum QueuedEvent<T> {
    Collection(ChangeEvent<T>),
    Item(ItemChangeEvent<T>),
}

/// Event-raising bookkeeping for [`ObservableList`].
struct RaisingState<T> {
    enabled: bool,
    /// Record changes made while raising is off, for replay on resume.
    analyze: bool,
    queued: Vec<QueuedEvent<T>>,
    /// Whether any unrecorded change happened while raising was off.
    missed: bool,
}

impl<T> Default for RaisingState<T> {
    fn default() -> Self {
        Self { enabled: true, analyze: false, queued: Vec::new(), missed: false }
    }
}

/// The default observable, positional list used as a projection source.
///
/// Mutators apply their change and emit one [`ChangeEvent`] describing it.
/// Event raising can be suspended with [`set_event_raising`]; changes made
/// while suspended are either recorded and replayed in FIFO order on resume
/// (`analyze` mode) or collapsed into a single "resynchronize" hint carried
/// by the raising-changed signal.
///
/// [`set_event_raising`]: ObservableList::set_event_raising
pub struct ObservableList<T> {
    items: RwLock<Vec<T>>,
    signals: SourceSignals<T>,
    raising: Mutex<RaisingState<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ObservableList<T> {
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            signals: SourceSignals::default(),
            raising: Mutex::new(RaisingState::default()),
        }
    }

    /// The signal set of this list.
    pub fn signals(&self) -> &SourceSignals<T> {
        &self.signals
    }

    /// A snapshot of the current contents.
    pub fn items(&self) -> Vec<T> {
        self.items.read().clone()
    }

    pub fn count(&self) -> usize {
        self.items.read().len()
    }

    pub fn at(&self, index: usize) -> Option<T> {
        self.items.read().get(index).cloned()
    }

    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.items.read().iter().position(|x| x == item)
    }

    pub fn each(&self, mut f: impl FnMut(&T, usize)) {
        for (index, item) in self.items.read().iter().enumerate() {
            f(item, index);
        }
    }

    /// Append one element.
    pub fn push(&self, item: T) {
        let index = {
            let mut items = self.items.write();
            items.push(item.clone());
            items.len() - 1
        };
        self.emit(ChangeEvent::add(vec![item], index));
    }

    /// Insert one element at `index` (clamped to the current length).
    pub fn insert(&self, index: usize, item: T) {
        let index = {
            let mut items = self.items.write();
            let index = index.min(items.len());
            items.insert(index, item.clone());
            index
        };
        self.emit(ChangeEvent::add(vec![item], index));
    }

    /// Insert several elements at `index`.
    pub fn insert_all(&self, index: usize, new_items: Vec<T>) {
        if new_items.is_empty() {
            return;
        }
        let index = {
            let mut items = self.items.write();
            let index = index.min(items.len());
            for (offset, item) in new_items.iter().enumerate() {
                items.insert(index + offset, item.clone());
            }
            index
        };
        self.emit(ChangeEvent::add(new_items, index));
    }

    /// Remove the element at `index`; returns it if it existed.
    pub fn remove_at(&self, index: usize) -> Option<T> {
        let removed = {
            let mut items = self.items.write();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.emit(ChangeEvent::remove(vec![removed.clone()], index));
        Some(removed)
    }

    /// Remove the first element equal to `item`; returns whether one was found.
    pub fn remove(&self, item: &T) -> bool {
        let index = match self.index_of(item) {
            Some(index) => index,
            None => return false,
        };
        self.remove_at(index).is_some()
    }

    /// Replace the element at `index`; returns the old value.
    pub fn replace(&self, index: usize, item: T) -> Option<T> {
        let old = {
            let mut items = self.items.write();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, item.clone())
        };
        self.emit(ChangeEvent::replace(vec![old.clone()], vec![item], index));
        Some(old)
    }

    /// Move the element at `from` so it ends up at `to`.
    pub fn move_item(&self, from: usize, to: usize) -> bool {
        let item = {
            let mut items = self.items.write();
            if from >= items.len() || to >= items.len() {
                return false;
            }
            let item = items.remove(from);
            items.insert(to, item.clone());
            item
        };
        if from != to {
            self.emit(ChangeEvent::moved(vec![item], from, to));
        }
        true
    }

    /// Replace the whole contents.
    pub fn assign(&self, new_items: Vec<T>) {
        let old = {
            let mut items = self.items.write();
            std::mem::replace(&mut *items, new_items.clone())
        };
        self.emit(ChangeEvent::reset(old, new_items));
    }

    /// Append several elements.
    pub fn append(&self, new_items: Vec<T>) {
        let index = self.count();
        self.insert_all(index, new_items);
    }

    /// Insert several elements at the front.
    pub fn prepend(&self, new_items: Vec<T>) {
        self.insert_all(0, new_items);
    }

    /// Remove all elements.
    pub fn clear(&self) {
        self.assign(Vec::new());
    }

    /// Report an in-place change of the element at `index`.
    pub fn notify_item_change(&self, index: usize, properties: &[&str]) {
        let item = match self.at(index) {
            Some(item) => item,
            None => return,
        };
        let event = ItemChangeEvent {
            item,
            index,
            properties: properties.iter().map(|p| p.to_string()).collect(),
        };
        {
            let mut raising = self.raising.lock();
            if !raising.enabled {
                if raising.analyze {
                    raising.queued.push(QueuedEvent::Item(event));
                } else {
                    raising.missed = true;
                }
                return;
            }
        }
        self.signals.item_changed.emit(event);
    }

    /// Whether change notifications are currently delivered.
    pub fn is_event_raising(&self) -> bool {
        self.raising.lock().enabled
    }

    /// Suspend or resume change notification delivery.
    ///
    /// With `analyze`, changes made while suspended are recorded and
    /// replayed in FIFO order on resume. Without it, resuming emits no
    /// change events; the raising-changed notification carries
    /// `analyzed: false` so observers know to resynchronize.
    pub fn set_event_raising(&self, enabled: bool, analyze: bool) {
        let (replay, analyzed) = {
            let mut raising = self.raising.lock();
            if raising.enabled == enabled {
                return;
            }
            raising.enabled = enabled;
            if enabled {
                // Whether the suspension recorded everything it saw
                let analyzed = raising.analyze && !raising.missed;
                raising.analyze = false;
                raising.missed = false;
                (std::mem::take(&mut raising.queued), analyzed)
            } else {
                raising.analyze = analyze;
                (Vec::new(), analyze)
            }
        };
        if enabled {
            for event in replay {
                match event {
                    QueuedEvent::Collection(event) => self.signals.collection_changed.emit(event),
                    QueuedEvent::Item(event) => self.signals.item_changed.emit(event),
                }
            }
        }
        self.signals.raising_changed.emit(RaisingChange { enabled, analyzed });
    }

    fn emit(&self, event: ChangeEvent<T>) {
        {
            let mut raising = self.raising.lock();
            if !raising.enabled {
                if raising.analyze {
                    raising.queued.push(QueuedEvent::Collection(event));
                } else {
                    raising.missed = true;
                }
                return;
            }
        }
        tracing::trace!(
            target: "horizon_display::source",
            action = ?event.action,
            new_index = event.new_index,
            old_index = event.old_index,
            "source change"
        );
        self.signals.collection_changed.emit(event);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Enumerable<T> for ObservableList<T> {
    fn count(&self) -> usize {
        ObservableList::count(self)
    }

    fn each(&self, f: &mut dyn FnMut(&T, usize)) {
        for (index, item) in self.items.read().iter().enumerate() {
            f(item, index);
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> SourceList<T> for ObservableList<T> {
    fn at(&self, index: usize) -> Option<T> {
        ObservableList::at(self, index)
    }

    fn index_of(&self, item: &T) -> Option<usize> {
        ObservableList::index_of(self, item)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> CollectionSource<T> for ObservableList<T> {
    fn as_list(&self) -> Option<&dyn SourceList<T>> {
        Some(self)
    }

    fn signals(&self) -> Option<&SourceSignals<T>> {
        Some(&self.signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn capture<T: Clone + PartialEq + Send + Sync + 'static>(
        list: &ObservableList<T>,
    ) -> Arc<Mutex<Vec<ChangeEvent<T>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        list.signals().collection_changed.connect(move |event| {
            events_clone.lock().push(event.clone());
        });
        events
    }

    #[test]
    fn test_push_emits_add() {
        let list = ObservableList::new();
        let events = capture(&list);

        list.push(10);
        list.push(20);

        assert_eq!(list.items(), vec![10, 20]);
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].action, ChangeAction::Add);
        assert_eq!(events[1].new_items, vec![20]);
        assert_eq!(events[1].new_index, 1);
    }

    #[test]
    fn test_remove_at() {
        let list = ObservableList::from_items(vec![1, 2, 3]);
        let events = capture(&list);

        assert_eq!(list.remove_at(1), Some(2));
        assert_eq!(list.remove_at(5), None);

        assert_eq!(list.items(), vec![1, 3]);
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ChangeAction::Remove);
        assert_eq!(events[0].old_items, vec![2]);
        assert_eq!(events[0].old_index, 1);
    }

    #[test]
    fn test_replace() {
        let list = ObservableList::from_items(vec!["a", "b"]);
        let events = capture(&list);

        assert_eq!(list.replace(1, "c"), Some("b"));

        let events = events.lock();
        assert_eq!(events[0].action, ChangeAction::Replace);
        assert_eq!(events[0].old_items, vec!["b"]);
        assert_eq!(events[0].new_items, vec!["c"]);
        assert_eq!(events[0].new_index, 1);
    }

    #[test]
    fn test_move_item() {
        let list = ObservableList::from_items(vec![1, 2, 3]);
        let events = capture(&list);

        assert!(list.move_item(0, 2));
        assert_eq!(list.items(), vec![2, 3, 1]);

        let events = events.lock();
        assert_eq!(events[0].action, ChangeAction::Move);
        assert_eq!(events[0].old_index, 0);
        assert_eq!(events[0].new_index, 2);
    }

    #[test]
    fn test_assign_emits_reset() {
        let list = ObservableList::from_items(vec![1]);
        let events = capture(&list);

        list.assign(vec![7, 8]);

        let events = events.lock();
        assert_eq!(events[0].action, ChangeAction::Reset);
        assert_eq!(events[0].old_items, vec![1]);
        assert_eq!(events[0].new_items, vec![7, 8]);
    }

    #[test]
    fn test_raising_suspended_with_analyze_replays() {
        let list = ObservableList::from_items(vec![1]);
        let events = capture(&list);

        list.set_event_raising(false, true);
        list.push(2);
        list.remove_at(0);
        assert!(events.lock().is_empty());

        list.set_event_raising(true, false);
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, ChangeAction::Add);
        assert_eq!(events[1].action, ChangeAction::Remove);
    }

    #[test]
    fn test_raising_suspended_without_analyze_drops() {
        let list = ObservableList::from_items(vec![1]);
        let events = capture(&list);
        let raisings = Arc::new(Mutex::new(Vec::new()));
        let raisings_clone = raisings.clone();
        list.signals().raising_changed.connect(move |change| {
            raisings_clone.lock().push(*change);
        });

        list.set_event_raising(false, false);
        list.push(2);
        list.set_event_raising(true, false);

        assert!(events.lock().is_empty());
        let raisings = raisings.lock();
        assert_eq!(raisings.len(), 2);
        assert!(raisings[1].enabled);
        assert!(!raisings[1].analyzed);
    }

    #[test]
    fn test_item_change_notification() {
        let list = ObservableList::from_items(vec!["x"]);
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        list.signals().item_changed.connect(move |event| {
            received_clone.lock().push((event.item, event.index, event.properties.clone()));
        });

        list.notify_item_change(0, &["title"]);

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], ("x", 0, vec!["title".to_string()]));
    }
}
