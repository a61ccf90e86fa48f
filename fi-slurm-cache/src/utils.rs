use std::collections::HashSet;

use chrono::{DateTime, Utc};

/// Converts a Unix timestamp into a UTC datetime, or `None` when it is out of range
pub fn time_t_to_datetime(timestamp: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
}

/// Splits a comma-joined Slurm list such as `"alice,bob"` into a set
///
/// Slurm prints an empty string for an empty list, so empty members are dropped rather than
/// kept as `""`
pub fn split_comma_list(list: &str) -> HashSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|member| !member.is_empty())
        .map(String::from)
        .collect()
}

/// Sorts and deduplicates, the shape every availability view is returned in
pub fn sorted_unique<T: Ord>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut items: Vec<T> = items.into_iter().collect();
    items.sort_unstable();
    items.dedup();
    items
}
