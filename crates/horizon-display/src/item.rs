//! Projection items.
//!
//! A [`DisplayItem`] wraps one raw source element (or one synthetic group
//! header) for presentation inside a projection. Items are handed out as
//! [`ItemRef`] so the projection, its enumerators and observers can share
//! them without copying contents.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

/// Opaque key produced by a grouping function.
pub type GroupKey = String;

/// Monotonic counter backing [`DisplayItem::instance_id`].
static INSTANCE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a projection item.
pub type ItemRef<T> = Arc<DisplayItem<T>>;

/// The payload of a projection item.
pub enum ItemKind<T> {
    /// A regular entry wrapping one raw source element.
    ///
    /// Contents are interior-mutable so that an in-place change of the
    /// source element can be reflected without discarding the item (and with
    /// it the item's instance identity, uid and selection flag).
    Entry(RwLock<T>),
    /// A synthetic group header carrying the group key.
    Group(GroupKey),
}

/// One item of a projection: a wrapped raw element or a group header.
///
/// Every item carries a process-unique `instance_id` and an atomic selection
/// flag. Items are created by the Direct pipeline stage (entries) or the
/// Group stage (headers) and destroyed when spliced out.
pub struct DisplayItem<T> {
    instance_id: u64,
    selected: AtomicBool,
    kind: ItemKind<T>,
}

impl<T> DisplayItem<T> {
    /// Wrap a raw element into a new entry item.
    pub fn entry(contents: T) -> ItemRef<T> {
        Arc::new(Self {
            instance_id: INSTANCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            selected: AtomicBool::new(false),
            kind: ItemKind::Entry(RwLock::new(contents)),
        })
    }

    /// Create a new group header item for `key`.
    pub fn group(key: impl Into<GroupKey>) -> ItemRef<T> {
        Arc::new(Self {
            instance_id: INSTANCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            selected: AtomicBool::new(false),
            kind: ItemKind::Group(key.into()),
        })
    }

    /// Process-unique identifier of this item instance.
    ///
    /// Stable for the lifetime of the item; never reused within a process.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Whether this item is a synthetic group header.
    pub fn is_group(&self) -> bool {
        matches!(self.kind, ItemKind::Group(_))
    }

    /// Replace the wrapped raw element in place.
    ///
    /// Used when the source reports an in-place element change; the item
    /// keeps its instance identity and selection flag.
    pub(crate) fn set_contents(&self, contents: T) {
        if let ItemKind::Entry(cell) = &self.kind {
            *cell.write() = contents;
        }
    }

    /// The group key, or `None` for regular entries.
    pub fn group_key(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Group(key) => Some(key),
            ItemKind::Entry(_) => None,
        }
    }

    /// Current selection flag.
    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::SeqCst)
    }

    /// Set the selection flag; returns `true` if the flag actually changed.
    pub fn set_selected(&self, selected: bool) -> bool {
        self.selected.swap(selected, Ordering::SeqCst) != selected
    }
}

impl<T: Clone> DisplayItem<T> {
    /// A clone of the wrapped raw element, or `None` for group headers.
    pub fn contents(&self) -> Option<T> {
        match &self.kind {
            ItemKind::Entry(contents) => Some(contents.read().clone()),
            ItemKind::Group(_) => None,
        }
    }
}

impl<T: std::fmt::Debug + Clone> std::fmt::Debug for DisplayItem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("DisplayItem");
        s.field("instance_id", &self.instance_id)
            .field("selected", &self.is_selected());
        match &self.kind {
            ItemKind::Entry(contents) => s.field("contents", &*contents.read()),
            ItemKind::Group(key) => s.field("group", key),
        };
        s.finish()
    }
}
