//! Token-usage accounting across agent calls.

use std::collections::BTreeMap;

/// Running totals per counter name (e.g. `input_tokens`, `output_tokens`).
///
/// `BTreeMap` keeps serialized output in a stable key order.
pub type UsageCounters = BTreeMap<String, u64>;

/// Counters reported by a single backend call. A `None` value means the
/// backend did not report that counter for this call.
pub type UsageReport = BTreeMap<String, Option<u64>>;

/// Add an incoming usage report onto running totals.
///
/// Absent or `None` counters contribute nothing (they do not zero existing
/// totals). Addition makes the merge associative and commutative, so retry
/// paths can feed reports in any order and reach the same totals.
pub fn merge_usage(base: &UsageCounters, report: &UsageReport) -> UsageCounters {
    let mut merged = base.clone();
    for (key, value) in report {
        let Some(value) = value else { continue };
        *merged.entry(key.clone()).or_insert(0) += value;
    }
    merged
}
