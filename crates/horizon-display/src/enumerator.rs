//! Cursor and utility enumerator over (items, filter map, sort map).
//!
//! The enumerator walks the sort map in display order, skipping strategy
//! positions whose filter-map entry is not a recorded pass. A position of
//! `-1` means "before the first item". The same type serves both the
//! projection's navigation cursor and its index-translation utility; the
//! projection hands each a snapshot of the current maps and rebuilds them
//! lazily after structural invalidation.

use crate::error::{DisplayError, Result};
use crate::item::ItemRef;

pub struct CollectionEnumerator<T> {
    items: Vec<ItemRef<T>>,
    filter_map: Vec<Option<bool>>,
    sort_map: Vec<usize>,
    /// Passing strategy positions, in display order.
    order: Vec<usize>,
    position: isize,
}

impl<T> CollectionEnumerator<T> {
    pub fn new(items: Vec<ItemRef<T>>, filter_map: Vec<Option<bool>>, sort_map: Vec<usize>) -> Self {
        let mut enumerator = Self {
            items,
            filter_map,
            sort_map,
            order: Vec::new(),
            position: -1,
        };
        enumerator.rebuild_order();
        enumerator
    }

    fn rebuild_order(&mut self) {
        self.order = self
            .sort_map
            .iter()
            .copied()
            .filter(|&index| self.filter_map.get(index).copied().flatten() == Some(true))
            .collect();
    }

    /// Replace the snapshot after the maps changed; the cursor position is
    /// clamped into the new range.
    pub fn re_index(
        &mut self,
        items: Vec<ItemRef<T>>,
        filter_map: Vec<Option<bool>>,
        sort_map: Vec<usize>,
    ) {
        self.items = items;
        self.filter_map = filter_map;
        self.sort_map = sort_map;
        self.rebuild_order();
        let max = self.order.len() as isize - 1;
        if self.position > max {
            self.position = max;
        }
    }

    /// Number of visible entries.
    pub fn count(&self) -> usize {
        self.order.len()
    }

    /// The visible item at display position `index`.
    pub fn at(&self, index: usize) -> Option<&ItemRef<T>> {
        self.order.get(index).and_then(|&strategy| self.items.get(strategy))
    }

    /// All visible items in display order.
    pub fn visible(&self) -> Vec<ItemRef<T>> {
        self.order
            .iter()
            .filter_map(|&strategy| self.items.get(strategy).cloned())
            .collect()
    }

    /// The current cursor position, `-1` when unset.
    pub fn position(&self) -> isize {
        self.position
    }

    /// Position the cursor without moving through intermediate entries.
    pub fn set_position(&mut self, position: isize) -> Result<()> {
        if position < -1 || position >= self.order.len() as isize {
            return Err(DisplayError::IndexOutOfBounds(position));
        }
        self.position = position;
        Ok(())
    }

    /// The item under the cursor.
    pub fn current(&self) -> Option<&ItemRef<T>> {
        if self.position < 0 {
            return None;
        }
        self.at(self.position as usize)
    }

    /// Position the cursor on `item`; returns `false` if it is not visible.
    pub fn set_current(&mut self, item: &ItemRef<T>) -> bool {
        match self.index_of_instance(item.instance_id()) {
            Some(index) => {
                self.position = index as isize;
                true
            }
            None => false,
        }
    }

    /// Advance to the next visible entry.
    pub fn move_next(&mut self) -> bool {
        if self.position + 1 >= self.order.len() as isize {
            return false;
        }
        self.position += 1;
        true
    }

    /// Step back to the previous visible entry.
    pub fn move_previous(&mut self) -> bool {
        if self.position <= 0 {
            return false;
        }
        self.position -= 1;
        true
    }

    /// Clear the cursor back to "before first".
    pub fn reset(&mut self) {
        self.position = -1;
    }

    /// Display position of the visible item with the given instance id.
    pub fn index_of_instance(&self, instance_id: u64) -> Option<usize> {
        self.order.iter().position(|&strategy| {
            self.items
                .get(strategy)
                .is_some_and(|item| item.instance_id() == instance_id)
        })
    }

    /// Translate a strategy position into a display position.
    pub fn display_by_strategy(&self, strategy_index: usize) -> Option<usize> {
        self.order.iter().position(|&index| index == strategy_index)
    }

    /// Translate a display position into a strategy position.
    pub fn strategy_by_display(&self, display_index: usize) -> Option<usize> {
        self.order.get(display_index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::DisplayItem;

    fn enumerator(values: &[i32], filter: &[bool]) -> CollectionEnumerator<i32> {
        let items: Vec<_> = values.iter().map(|&v| DisplayItem::entry(v)).collect();
        let filter_map = filter.iter().map(|&pass| Some(pass)).collect();
        let sort_map = (0..items.len()).collect();
        CollectionEnumerator::new(items, filter_map, sort_map)
    }

    #[test]
    fn test_walks_in_order() {
        let mut e = enumerator(&[10, 20, 30], &[true, true, true]);
        assert_eq!(e.position(), -1);
        assert!(e.move_next());
        assert_eq!(e.current().unwrap().contents(), Some(10));
        assert!(e.move_next());
        assert!(e.move_next());
        assert_eq!(e.current().unwrap().contents(), Some(30));
        assert!(!e.move_next());
        assert_eq!(e.position(), 2);
    }

    #[test]
    fn test_skips_filtered_out() {
        let mut e = enumerator(&[10, 20, 30], &[true, false, true]);
        assert_eq!(e.count(), 2);
        assert!(e.move_next());
        assert!(e.move_next());
        assert_eq!(e.current().unwrap().contents(), Some(30));
        assert!(!e.move_next());
    }

    #[test]
    fn test_unevaluated_entries_are_excluded() {
        let items = vec![DisplayItem::entry(1), DisplayItem::entry(2)];
        let e = CollectionEnumerator::new(items, vec![Some(true), None], vec![0, 1]);
        assert_eq!(e.count(), 1);
    }

    #[test]
    fn test_sort_map_reorders() {
        let items = vec![DisplayItem::entry("a"), DisplayItem::entry("b")];
        let e = CollectionEnumerator::new(items, vec![Some(true), Some(true)], vec![1, 0]);
        assert_eq!(e.at(0).unwrap().contents(), Some("b"));
        assert_eq!(e.at(1).unwrap().contents(), Some("a"));
    }

    #[test]
    fn test_move_previous_and_reset() {
        let mut e = enumerator(&[1, 2], &[true, true]);
        assert!(!e.move_previous());
        e.move_next();
        e.move_next();
        assert!(e.move_previous());
        assert_eq!(e.current().unwrap().contents(), Some(1));
        e.reset();
        assert_eq!(e.position(), -1);
        assert!(e.current().is_none());
    }

    #[test]
    fn test_set_position_bounds() {
        let mut e = enumerator(&[1, 2, 3], &[true, true, true]);
        assert!(e.set_position(2).is_ok());
        assert_eq!(e.current().unwrap().contents(), Some(3));
        assert!(e.set_position(-1).is_ok());
        assert_eq!(e.set_position(3), Err(DisplayError::IndexOutOfBounds(3)));
        assert_eq!(e.set_position(-2), Err(DisplayError::IndexOutOfBounds(-2)));
    }

    #[test]
    fn test_set_current() {
        let items = vec![DisplayItem::entry(1), DisplayItem::entry(2)];
        let outsider = DisplayItem::entry(3);
        let mut e = CollectionEnumerator::new(items.clone(), vec![Some(true), Some(true)], vec![0, 1]);
        assert!(e.set_current(&items[1]));
        assert_eq!(e.position(), 1);
        assert!(!e.set_current(&outsider));
        assert_eq!(e.position(), 1);
    }

    #[test]
    fn test_re_index_clamps_position() {
        let mut e = enumerator(&[1, 2, 3], &[true, true, true]);
        e.set_position(2).unwrap();
        let items = vec![DisplayItem::entry(1)];
        e.re_index(items, vec![Some(true)], vec![0]);
        assert_eq!(e.position(), 0);
        assert_eq!(e.count(), 1);
    }

    #[test]
    fn test_index_translations() {
        let e = enumerator(&[1, 2, 3], &[true, false, true]);
        assert_eq!(e.display_by_strategy(2), Some(1));
        assert_eq!(e.display_by_strategy(1), None);
        assert_eq!(e.strategy_by_display(1), Some(2));
        assert_eq!(e.strategy_by_display(2), None);
    }
}
