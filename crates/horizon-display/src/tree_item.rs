//! Hierarchy wrapper for tree-shaped projections.
//!
//! A `TreeItem` ties a display item to a parent and an ordered list of
//! children. The projection itself stays flat; consumers that render
//! trees use the wrapper for indentation and expand state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::item::ItemRef;

pub struct TreeItem<T> {
    item: ItemRef<T>,
    parent: RwLock<Weak<TreeItem<T>>>,
    children: RwLock<Vec<Arc<TreeItem<T>>>>,
    expanded: AtomicBool,
    /// Whether the invisible root counts as a level of its own. Roots of
    /// such trees report level 1 even though they have no parent.
    root_counted: bool,
}

impl<T: Clone> TreeItem<T> {
    /// A root node. With `root_counted` the root reports level 1 and its
    /// children start at 2; otherwise the root is level 0.
    pub fn new_root(item: ItemRef<T>, root_counted: bool) -> Arc<Self> {
        Arc::new(Self {
            item,
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            expanded: AtomicBool::new(false),
            root_counted,
        })
    }

    /// The wrapped display item.
    pub fn item(&self) -> &ItemRef<T> {
        &self.item
    }

    pub fn parent(&self) -> Option<Arc<TreeItem<T>>> {
        self.parent.read().upgrade()
    }

    pub fn children(&self) -> Vec<Arc<TreeItem<T>>> {
        self.children.read().clone()
    }

    pub fn has_children(&self) -> bool {
        !self.children.read().is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.read().upgrade().is_none()
    }

    /// The topmost ancestor; the node itself when detached.
    pub fn root(self: &Arc<Self>) -> Arc<TreeItem<T>> {
        match self.parent() {
            Some(parent) => parent.root(),
            None => self.clone(),
        }
    }

    /// Append a child node wrapping `item`.
    pub fn add_child(self: &Arc<Self>, item: ItemRef<T>) -> Arc<TreeItem<T>> {
        let child = Arc::new(TreeItem {
            item,
            parent: RwLock::new(Arc::downgrade(self)),
            children: RwLock::new(Vec::new()),
            expanded: AtomicBool::new(false),
            root_counted: self.root_counted,
        });
        self.children.write().push(child.clone());
        child
    }

    /// Detach a child; returns whether it was present.
    pub fn remove_child(&self, child: &Arc<TreeItem<T>>) -> bool {
        let mut children = self.children.write();
        let before = children.len();
        children.retain(|candidate| !Arc::ptr_eq(candidate, child));
        if children.len() == before {
            return false;
        }
        *child.parent.write() = Weak::new();
        true
    }

    /// Nesting depth. A node with a parent is one level below it; a
    /// detached node is at level 1 when the tree counts its root,
    /// otherwise 0.
    pub fn level(&self) -> usize {
        match self.parent() {
            Some(parent) => parent.level() + 1,
            None => usize::from(self.root_counted),
        }
    }

    /// Whether this node is the last of its parent's children.
    pub fn is_last_child(&self) -> bool {
        match self.parent() {
            Some(parent) => {
                let children = parent.children.read();
                children
                    .last()
                    .is_some_and(|last| std::ptr::eq(Arc::as_ptr(last), self))
            }
            None => true,
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.load(Ordering::Relaxed)
    }

    pub fn set_expanded(&self, expanded: bool) {
        self.expanded.store(expanded, Ordering::Relaxed);
    }

    /// This node and every descendant, depth first.
    pub fn flatten(self: &Arc<Self>) -> Vec<Arc<TreeItem<T>>> {
        let mut out = vec![self.clone()];
        for child in self.children.read().iter() {
            out.extend(child.flatten());
        }
        out
    }
}
