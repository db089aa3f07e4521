//! Update sessions: coalescing structural recomputation into one
//! externally observable notification batch.
//!
//! A session is opened by `Collection::start_update_session`, which
//! snapshots the visible items, and closed by `finish_update_session`,
//! which diffs that snapshot against the visible items at close and
//! synthesizes the minimal set of remove/add/move notifications. Sessions
//! nest; only the outermost close analyzes and emits, so cascading
//! recomputation never emits partial notifications.

use std::collections::{HashMap, HashSet};

use crate::item::ItemRef;
use crate::source::ChangeEvent;

/// Token returned by `start_update_session` and consumed by
/// `finish_update_session`. Deliberately neither `Copy` nor constructible
/// outside the crate, so every opened session is closed exactly once. The
/// token remembers which collection minted it; closing it against another
/// collection is rejected.
#[must_use = "an update session must be finished"]
pub struct UpdateSession {
    pub(crate) owner: usize,
}

/// Group runs of consecutive indices into `(start, items)` packs.
pub(crate) fn pack_runs<T>(entries: Vec<(usize, ItemRef<T>)>) -> Vec<(usize, Vec<ItemRef<T>>)> {
    let mut packs: Vec<(usize, Vec<ItemRef<T>>)> = Vec::new();
    for (index, item) in entries {
        match packs.last_mut() {
            Some((start, items)) if *start + items.len() == index => items.push(item),
            _ => packs.push((index, vec![item])),
        }
    }
    packs
}

/// Indices (into `seq`) of one longest non-decreasing subsequence.
///
/// Used to pick the largest set of common items that kept their relative
/// order; everything else is reported as moved.
fn longest_stable_subsequence(seq: &[usize]) -> HashSet<usize> {
    if seq.is_empty() {
        return HashSet::new();
    }
    // Patience sorting with parent links
    let mut tails: Vec<usize> = Vec::new(); // positions in seq
    let mut parent: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &value) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&tail| seq[tail] <= value);
        if slot > 0 {
            parent[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }
    let mut keep = HashSet::new();
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        keep.insert(i);
        cursor = parent[i];
    }
    keep
}

/// Diff two visible-item snapshots into minimal change notifications.
///
/// Items are matched by instance identity. Emission order: removes in
/// ascending old position, then adds in ascending new position, then moves
/// in ascending new position.
pub(crate) fn analyze_changes<T>(
    old: &[ItemRef<T>],
    new: &[ItemRef<T>],
) -> Vec<ChangeEvent<ItemRef<T>>> {
    let old_positions: HashMap<u64, usize> = old
        .iter()
        .enumerate()
        .map(|(position, item)| (item.instance_id(), position))
        .collect();
    let new_ids: HashSet<u64> = new.iter().map(|item| item.instance_id()).collect();

    let mut events = Vec::new();

    let removed: Vec<(usize, ItemRef<T>)> = old
        .iter()
        .enumerate()
        .filter(|(_, item)| !new_ids.contains(&item.instance_id()))
        .map(|(position, item)| (position, item.clone()))
        .collect();
    for (start, items) in pack_runs(removed) {
        events.push(ChangeEvent::remove(items, start));
    }

    let added: Vec<(usize, ItemRef<T>)> = new
        .iter()
        .enumerate()
        .filter(|(_, item)| !old_positions.contains_key(&item.instance_id()))
        .map(|(position, item)| (position, item.clone()))
        .collect();
    for (start, items) in pack_runs(added) {
        events.push(ChangeEvent::add(items, start));
    }

    // Common items in new order, with their old positions
    let common: Vec<(usize, usize, ItemRef<T>)> = new
        .iter()
        .enumerate()
        .filter_map(|(new_position, item)| {
            old_positions
                .get(&item.instance_id())
                .map(|&old_position| (new_position, old_position, item.clone()))
        })
        .collect();
    let old_order: Vec<usize> = common.iter().map(|&(_, old_position, _)| old_position).collect();
    let stable = longest_stable_subsequence(&old_order);

    let mut moved: Vec<(usize, usize, ItemRef<T>)> = Vec::new();
    for (i, (new_position, old_position, item)) in common.into_iter().enumerate() {
        if !stable.contains(&i) {
            moved.push((new_position, old_position, item));
        }
    }
    // Pack consecutive movers in new coordinates
    let mut pack: Vec<(usize, usize, ItemRef<T>)> = Vec::new();
    let mut flush = |pack: &mut Vec<(usize, usize, ItemRef<T>)>, events: &mut Vec<ChangeEvent<ItemRef<T>>>| {
        if let Some(&(new_start, old_start, _)) = pack.first() {
            let items: Vec<ItemRef<T>> = pack.iter().map(|(_, _, item)| item.clone()).collect();
            events.push(ChangeEvent::moved(items, old_start, new_start));
            pack.clear();
        }
    };
    for entry in moved {
        match pack.last() {
            Some(&(last_new, last_old, _))
                if last_new + 1 == entry.0 && last_old + 1 == entry.1 => {}
            Some(_) => flush(&mut pack, &mut events),
            None => {}
        }
        pack.push(entry);
    }
    flush(&mut pack, &mut events);

    events
}

/// Split an Add/Remove/Change pack at group-header boundaries so observers
/// receive one notification per touched group.
pub(crate) fn split_at_headers<T>(event: ChangeEvent<ItemRef<T>>) -> Vec<ChangeEvent<ItemRef<T>>> {
    use crate::source::ChangeAction;

    let (items, base) = match event.action {
        ChangeAction::Add | ChangeAction::Change => (&event.new_items, event.new_index),
        ChangeAction::Remove => (&event.old_items, event.old_index),
        _ => return vec![event],
    };
    let mut cuts: Vec<usize> = items
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, item)| item.is_group())
        .map(|(offset, _)| offset)
        .collect();
    if cuts.is_empty() {
        return vec![event];
    }
    cuts.push(items.len());

    let mut packs = Vec::new();
    let mut from = 0;
    for cut in cuts {
        let slice: Vec<ItemRef<T>> = items[from..cut].to_vec();
        packs.push(match event.action {
            ChangeAction::Add => ChangeEvent::add(slice, base + from),
            ChangeAction::Change => ChangeEvent::changed(slice, base + from),
            ChangeAction::Remove => ChangeEvent::remove(slice, base + from),
            _ => unreachable!(),
        });
        from = cut;
    }
    packs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::DisplayItem;
    use crate::source::ChangeAction;

    fn items(values: &[i32]) -> Vec<ItemRef<i32>> {
        values.iter().map(|&v| DisplayItem::entry(v)).collect()
    }

    #[test]
    fn test_no_change_yields_no_events() {
        let old = items(&[1, 2, 3]);
        assert!(analyze_changes(&old, &old).is_empty());
    }

    #[test]
    fn test_pure_add_is_one_pack() {
        let old = items(&[1]);
        let mut new = old.clone();
        new.push(DisplayItem::entry(2));
        new.push(DisplayItem::entry(3));

        let events = analyze_changes(&old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ChangeAction::Add);
        assert_eq!(events[0].new_index, 1);
        assert_eq!(events[0].new_items.len(), 2);
    }

    #[test]
    fn test_pure_remove_is_one_pack() {
        let old = items(&[1, 2, 3]);
        let new = vec![old[0].clone()];

        let events = analyze_changes(&old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ChangeAction::Remove);
        assert_eq!(events[0].old_index, 1);
        assert_eq!(events[0].old_items.len(), 2);
    }

    #[test]
    fn test_disjoint_removes_are_separate_packs() {
        let old = items(&[1, 2, 3, 4]);
        let new = vec![old[1].clone(), old[3].clone()];

        let events = analyze_changes(&old, &new);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].old_index, 0);
        assert_eq!(events[1].old_index, 2);
    }

    #[test]
    fn test_reorder_reports_move() {
        let old = items(&[1, 2, 3]);
        let new = vec![old[2].clone(), old[0].clone(), old[1].clone()];

        let events = analyze_changes(&old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ChangeAction::Move);
        assert_eq!(events[0].new_index, 0);
        assert_eq!(events[0].old_index, 2);
        assert_eq!(events[0].new_items[0].contents(), Some(3));
    }

    #[test]
    fn test_add_and_remove_combined() {
        let old = items(&[1, 2]);
        let added = DisplayItem::entry(9);
        let new = vec![old[1].clone(), added];

        let events = analyze_changes(&old, &new);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, ChangeAction::Remove);
        assert_eq!(events[0].old_index, 0);
        assert_eq!(events[1].action, ChangeAction::Add);
        assert_eq!(events[1].new_index, 1);
    }

    #[test]
    fn test_split_at_headers() {
        let header_m = DisplayItem::<i32>::group("M");
        let header_f = DisplayItem::<i32>::group("F");
        let a = DisplayItem::entry(1);
        let b = DisplayItem::entry(2);
        let event = ChangeEvent::add(vec![header_m, a, header_f.clone(), b], 3);

        let packs = split_at_headers(event);
        assert_eq!(packs.len(), 2);
        assert_eq!(packs[0].new_index, 3);
        assert_eq!(packs[0].new_items.len(), 2);
        assert_eq!(packs[1].new_index, 5);
        assert!(packs[1].new_items[0].is_group());
    }

    #[test]
    fn test_split_leaves_headerless_packs_alone() {
        let event = ChangeEvent::add(items(&[1, 2]), 0);
        let packs = split_at_headers(event);
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].new_items.len(), 2);
    }
}
