use crate::data::Allocation;
use itertools::Itertools;
use std::cmp::Reverse;

/// How many placement minutes an allocation has to spare across its week.
/// Lower means fewer viable placements.
pub fn flexibility(allocation: &Allocation) -> i64 {
    i64::from(allocation.window_width()) * allocation.allowed_days.len() as i64
        - i64::from(allocation.duration_minutes)
}

/// Most constrained first: flexibility ascending, then larger groups,
/// then allocation id so equal inputs always yield the same order.
pub fn rank(allocations: &[Allocation]) -> Vec<&Allocation> {
    allocations
        .iter()
        .sorted_by_key(|a| (flexibility(a), Reverse(a.number_of_students), a.id))
        .collect()
}
