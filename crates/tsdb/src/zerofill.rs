//! Result shaping
//!
//! Reshapes decoded store rows into per-entity results. Every requested id
//! and every bucket of the range is present; anything the store did not
//! return is zero.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::rows::RawRow;

/// Entity id to ascending `(bucket start, value)` pairs
pub type ResultSeries = BTreeMap<u64, Vec<(i64, u64)>>;

/// Parent id to ascending `(bucket start, child id to count)` pairs
pub type FrequencySeries = BTreeMap<u64, Vec<(i64, BTreeMap<u64, u64>)>>;

/// Parent id to child id to total count
pub type FrequencyTotals = BTreeMap<u64, BTreeMap<u64, u64>>;

/// Parent id to `(child id, score)` pairs, best first
pub type RankedList = BTreeMap<u64, Vec<(u64, f64)>>;

/// Per-bucket values for each id
pub fn fill_series(rows: &[RawRow], ids: &[u64], series: &[i64]) -> ResultSeries {
    let mut filled: BTreeMap<u64, BTreeMap<i64, u64>> = ids
        .iter()
        .map(|id| (*id, series.iter().map(|b| (*b, 0)).collect()))
        .collect();

    for row in rows {
        let (Some(entity), Some(time)) = (row.entity, row.time) else {
            continue;
        };
        if let Some(value) = filled
            .get_mut(&entity)
            .and_then(|buckets| buckets.get_mut(&time))
        {
            *value += row.value;
        }
    }

    filled
        .into_iter()
        .map(|(id, buckets)| (id, buckets.into_iter().collect()))
        .collect()
}

/// One value per id
pub fn fill_totals(rows: &[RawRow], ids: &[u64]) -> BTreeMap<u64, u64> {
    let mut totals: BTreeMap<u64, u64> = ids.iter().map(|id| (*id, 0)).collect();

    for row in rows {
        if let Some(total) = row.entity.and_then(|e| totals.get_mut(&e)) {
            *total += row.value;
        }
    }

    totals
}

/// Per-bucket counts for each parent's own children
///
/// Rows are scoped per parent: a child counts toward a parent only if that
/// parent asked for it.
pub fn fill_frequency_series(
    rows: &[RawRow],
    keys: &BTreeMap<u64, Vec<u64>>,
    series: &[i64],
) -> FrequencySeries {
    let mut filled: BTreeMap<u64, BTreeMap<i64, BTreeMap<u64, u64>>> = keys
        .iter()
        .map(|(parent, children)| {
            let empty: BTreeMap<u64, u64> = children.iter().map(|c| (*c, 0)).collect();
            (*parent, series.iter().map(|b| (*b, empty.clone())).collect())
        })
        .collect();

    for row in rows {
        let (Some(parent), Some(time), Some(child)) = (row.entity, row.time, row.child) else {
            continue;
        };
        if let Some(count) = filled
            .get_mut(&parent)
            .and_then(|buckets| buckets.get_mut(&time))
            .and_then(|counts| counts.get_mut(&child))
        {
            *count += row.value;
        }
    }

    filled
        .into_iter()
        .map(|(parent, buckets)| (parent, buckets.into_iter().collect()))
        .collect()
}

/// Total counts for each parent's own children
pub fn fill_frequency_totals(rows: &[RawRow], keys: &BTreeMap<u64, Vec<u64>>) -> FrequencyTotals {
    let mut totals: FrequencyTotals = keys
        .iter()
        .map(|(parent, children)| (*parent, children.iter().map(|c| (*c, 0)).collect()))
        .collect();

    for row in rows {
        let (Some(parent), Some(child)) = (row.entity, row.child) else {
            continue;
        };
        if let Some(count) = totals
            .get_mut(&parent)
            .and_then(|counts| counts.get_mut(&child))
        {
            *count += row.value;
        }
    }

    totals
}

/// Top `limit` children of each id
///
/// Children are ordered by total count descending, ties broken by child id
/// ascending. Scores are rank weights: with `n` children kept, the first
/// scores `n` and the last scores `1`.
pub fn rank(rows: &[RawRow], ids: &[u64], limit: usize) -> RankedList {
    let mut totals: BTreeMap<u64, BTreeMap<u64, u64>> =
        ids.iter().map(|id| (*id, BTreeMap::new())).collect();

    for row in rows {
        let (Some(parent), Some(child)) = (row.entity, row.child) else {
            continue;
        };
        if let Some(counts) = totals.get_mut(&parent) {
            *counts.entry(child).or_default() += row.value;
        }
    }

    totals
        .into_iter()
        .map(|(parent, counts)| {
            let mut ordered: Vec<(u64, u64)> =
                counts.into_iter().filter(|(_, count)| *count > 0).collect();
            ordered.sort_by_key(|(child, count)| (Reverse(*count), *child));
            ordered.truncate(limit);

            let n = ordered.len();
            let ranked = ordered
                .into_iter()
                .enumerate()
                .map(|(i, (child, _))| (child, (n - i) as f64))
                .collect();
            (parent, ranked)
        })
        .collect()
}
