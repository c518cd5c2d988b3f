//! Per-owner ordering of todos.
//!
//! Both store implementations compute positions through these functions so
//! the in-memory store and Postgres agree on the numbering rules.

use std::collections::{HashMap, HashSet};

/// Largest position a todo can be moved to by an edit.
pub const MAX_POSITION: i32 = 1_000_000;

/// Returns the position for a todo appended to a list holding `positions`:
/// one past the largest existing position, or 1 for an empty list. `None`
/// when the largest position is already `i32::MAX`.
pub fn next_position<I>(positions: I) -> Option<i32>
where
    I: IntoIterator<Item = i32>,
{
    match positions.into_iter().max() {
        Some(max) => max.checked_add(1),
        None => Some(1),
    }
}

/// Computes new positions for a reorder request.
///
/// `current` holds `(id, position)` for every todo of the owner, `requested`
/// the ids in their new order. Each requested id gets its index + 1, first
/// occurrence winning; ids the owner does not have are skipped without
/// shifting later ones. Todos left out of the request follow the reordered
/// prefix, keeping their previous relative order.
///
/// Returns `(id, position)` for every todo of the owner, requested ones first.
pub fn reorder_plan(current: &[(i32, i32)], requested: &[i32]) -> Vec<(i32, i32)> {
    let owned: HashSet<i32> = current.iter().map(|(id, _)| *id).collect();
    let mut assigned: HashMap<i32, i32> = HashMap::new();
    let mut plan = Vec::with_capacity(current.len());

    for (index, id) in requested.iter().enumerate() {
        if owned.contains(id) && !assigned.contains_key(id) {
            let position = index as i32 + 1;
            assigned.insert(*id, position);
            plan.push((*id, position));
        }
    }

    let mut omitted: Vec<(i32, i32)> = current
        .iter()
        .filter(|(id, _)| !assigned.contains_key(id))
        .copied()
        .collect();
    omitted.sort_by_key(|(id, position)| (*position, *id));

    let mut next = assigned.values().copied().max().unwrap_or(0);
    for (id, _) in omitted {
        next += 1;
        plan.push((id, next));
    }

    plan
}

/// Filters a plan down to the rows whose position actually changes.
pub fn changed_positions(current: &[(i32, i32)], plan: &[(i32, i32)]) -> Vec<(i32, i32)> {
    let before: HashMap<i32, i32> = current.iter().copied().collect();
    plan.iter()
        .filter(|(id, position)| before.get(id) != Some(position))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_next_position() {
        assert_eq!(next_position(Vec::new()), Some(1));
        assert_eq!(next_position(vec![1, 2, 3]), Some(4));
        assert_eq!(next_position(vec![7, 2]), Some(8));
        assert_eq!(next_position(vec![0]), Some(1));
        assert_eq!(next_position(Some(MAX_POSITION)), Some(MAX_POSITION + 1));
    }

    #[test]
    fn test_next_position_at_i32_max() {
        assert_eq!(next_position(vec![3, i32::MAX]), None);
    }

    #[test]
    fn test_full_reorder() {
        let current = vec![(1, 1), (2, 2), (3, 3)];
        let plan = reorder_plan(&current, &[3, 1, 2]);
        assert_eq!(plan, vec![(3, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_partial_reorder_pushes_omitted_after_prefix() {
        // Todo 7 already held position 2; reordering only [3, 5] must not leave two todos at 2.
        let current = vec![(3, 4), (5, 1), (7, 2)];
        let plan = reorder_plan(&current, &[3, 5]);
        assert_eq!(plan, vec![(3, 1), (5, 2), (7, 3)]);
    }

    #[test]
    fn test_omitted_keep_relative_order() {
        let current = vec![(1, 5), (2, 1), (3, 3), (4, 3)];
        let plan = reorder_plan(&current, &[1]);
        assert_eq!(plan, vec![(1, 1), (2, 2), (3, 3), (4, 4)]);
    }

    #[test]
    fn test_foreign_and_duplicate_ids() {
        let current = vec![(1, 1), (2, 2)];
        // 99 belongs to someone else, the second 2 is a duplicate.
        let plan = reorder_plan(&current, &[99, 2, 2, 1]);
        assert_eq!(plan, vec![(2, 2), (1, 4)]);
    }

    #[test]
    fn test_empty_request_compacts_positions() {
        let current = vec![(1, 4), (2, 9)];
        let plan = reorder_plan(&current, &[]);
        assert_eq!(plan, vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn test_changed_positions() {
        let current = vec![(1, 1), (2, 2), (3, 3)];
        let plan = reorder_plan(&current, &[1, 3, 2]);
        assert_eq!(changed_positions(&current, &plan), vec![(3, 2), (2, 3)]);
    }
}
