//! Neighbor selection after a session is destroyed.
//!
//! Live sessions are treated as points on a ring sorted by creation order.
//! When one is removed, focus moves to the point immediately clockwise from
//! it: the next tab to the right, wrapping around to the first tab.

/// Returns the smallest key in `sorted` strictly greater than `target`,
/// wrapping around to the smallest key overall.
///
/// `sorted` must be in ascending order and may or may not contain `target`.
/// Returns `None` when no key other than `target` exists.
pub fn circular_successor<'a, K: Ord>(sorted: &'a [K], target: &K) -> Option<&'a K> {
    debug_assert!(sorted.windows(2).all(|w| w[0] < w[1]), "keys must be sorted");

    let idx = sorted.partition_point(|key| key <= target);
    let candidate = sorted.get(idx).or_else(|| sorted.first())?;

    if candidate == target {
        None
    } else {
        Some(candidate)
    }
}
