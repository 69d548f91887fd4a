//! Tests for result shaping

use std::collections::BTreeMap;

use crate::rows::RawRow;
use crate::zerofill::{fill_frequency_series, fill_frequency_totals, fill_series, fill_totals, rank};

fn series_row(entity: u64, time: i64, value: u64) -> RawRow {
    RawRow {
        entity: Some(entity),
        time: Some(time),
        child: None,
        value,
    }
}

fn child_row(entity: u64, time: Option<i64>, child: u64, value: u64) -> RawRow {
    RawRow {
        entity: Some(entity),
        time,
        child: Some(child),
        value,
    }
}

#[test]
fn test_fill_series_zero_fills_ids_and_buckets() {
    let rows = vec![series_row(1, 3600, 5)];
    let filled = fill_series(&rows, &[1, 2], &[0, 3600, 7200]);

    assert_eq!(filled[&1], vec![(0, 0), (3600, 5), (7200, 0)]);
    assert_eq!(filled[&2], vec![(0, 0), (3600, 0), (7200, 0)]);
}

#[test]
fn test_fill_series_ignores_unrequested_rows() {
    let rows = vec![series_row(9, 0, 5), series_row(1, 1800, 4)];
    let filled = fill_series(&rows, &[1], &[0, 3600]);

    assert_eq!(filled.len(), 1);
    assert_eq!(filled[&1], vec![(0, 0), (3600, 0)]);
}

#[test]
fn test_fill_totals() {
    let rows = vec![
        RawRow {
            entity: Some(1),
            time: None,
            child: None,
            value: 7,
        },
        RawRow {
            entity: None,
            time: None,
            child: None,
            value: 3,
        },
    ];
    let totals = fill_totals(&rows, &[1, 2]);
    assert_eq!(totals, BTreeMap::from([(1, 7), (2, 0)]));
}

#[test]
fn test_fill_frequency_series_scopes_children_per_parent() {
    let keys = BTreeMap::from([(1, vec![10, 11]), (2, vec![10])]);
    let rows = vec![
        child_row(1, Some(0), 10, 3),
        child_row(1, Some(3600), 11, 2),
        // 11 was not requested for parent 2
        child_row(2, Some(0), 11, 9),
        child_row(2, Some(3600), 10, 1),
    ];

    let filled = fill_frequency_series(&rows, &keys, &[0, 3600]);

    assert_eq!(
        filled[&1],
        vec![
            (0, BTreeMap::from([(10, 3), (11, 0)])),
            (3600, BTreeMap::from([(10, 0), (11, 2)])),
        ]
    );
    assert_eq!(
        filled[&2],
        vec![
            (0, BTreeMap::from([(10, 0)])),
            (3600, BTreeMap::from([(10, 1)])),
        ]
    );
}

#[test]
fn test_fill_frequency_totals() {
    let keys = BTreeMap::from([(1, vec![10, 11]), (2, vec![])]);
    let rows = vec![child_row(1, None, 10, 4), child_row(2, None, 10, 4)];

    let totals = fill_frequency_totals(&rows, &keys);
    assert_eq!(totals[&1], BTreeMap::from([(10, 4), (11, 0)]));
    assert!(totals[&2].is_empty());
}

#[test]
fn test_rank_orders_by_count_then_child() {
    let rows = vec![
        child_row(1, None, 30, 5),
        child_row(1, None, 20, 9),
        child_row(1, None, 10, 5),
    ];

    let ranked = rank(&rows, &[1, 2], 10);
    assert_eq!(ranked[&1], vec![(20, 3.0), (10, 2.0), (30, 1.0)]);
    assert!(ranked[&2].is_empty());
}

#[test]
fn test_rank_ties_and_limit() {
    let rows = vec![child_row(1, None, 2, 12), child_row(1, None, 1, 12)];
    assert_eq!(rank(&rows, &[1], 10)[&1], vec![(1, 2.0), (2, 1.0)]);
    assert_eq!(rank(&rows, &[1], 1)[&1], vec![(1, 1.0)]);
}

#[test]
fn test_rank_sums_rows_across_buckets() {
    let rows = vec![
        child_row(1, Some(0), 10, 1),
        child_row(1, Some(3600), 10, 1),
        child_row(1, Some(0), 11, 1),
    ];
    assert_eq!(rank(&rows, &[1], 5)[&1], vec![(10, 2.0), (11, 1.0)]);
}
