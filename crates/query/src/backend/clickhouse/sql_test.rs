//! Tests for ClickHouse SQL rendering

use chrono::{TimeZone, Utc};

use super::*;

fn base_query() -> StoreQuery {
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 15, 4, 0, 0).unwrap();
    StoreQuery::new("events", start, end)
}

#[test]
fn test_basic_select() {
    let sql = SqlBuilder::new("events")
        .select("project_id")
        .select_as("count()", "aggregate")
        .build();

    assert_eq!(sql, "SELECT project_id, count() AS aggregate FROM events");
}

#[test]
fn test_render_count_by_entity_and_time() {
    let sql = render(
        &base_query()
            .group_by_column("project_id")
            .group_by_time(3600)
            .with_condition(Condition::is_in("project_id", [1u64, 2])),
    );

    assert!(sql.starts_with("SELECT project_id, intDiv(toUInt32(timestamp), 3600) * 3600 AS time, count() AS aggregate FROM events"));
    assert!(sql.contains("timestamp >= toDateTime(1705276800, 'UTC')"));
    assert!(sql.contains("timestamp < toDateTime(1705291200, 'UTC')"));
    assert!(sql.contains("project_id IN (1, 2)"));
    assert!(sql.contains("GROUP BY project_id, time"));
    assert!(sql.ends_with("ORDER BY project_id, time"));
}

#[test]
fn test_render_daily_bucket() {
    let sql = render(&base_query().group_by_time(86_400));
    assert!(sql.contains("toUInt32(toStartOfDay(timestamp, 'UTC')) AS time"));

    // multi-day rollups stay epoch aligned
    let sql = render(&base_query().group_by_time(172_800));
    assert!(sql.contains("intDiv(toUInt32(timestamp), 172800) * 172800 AS time"));
}

#[test]
fn test_render_uniq() {
    let sql = render(
        &base_query()
            .group_by_column("group_id")
            .with_aggregation(Aggregation::Uniq("user_id".into())),
    );

    assert!(sql.contains("uniq(user_id) AS aggregate"));
    assert!(sql.contains("GROUP BY group_id"));
}

#[test]
fn test_render_union_has_no_group_by() {
    let sql = render(&base_query().with_aggregation(Aggregation::Uniq("user_id".into())));

    assert!(sql.starts_with("SELECT uniq(user_id) AS aggregate FROM events WHERE"));
    assert!(!sql.contains("GROUP BY"));
}

#[test]
fn test_condition_operators() {
    let cases = vec![
        (Condition::eq("environment", "prod"), "environment = 'prod'"),
        (Condition::ne("level", "debug"), "level != 'debug'"),
        (Condition::gte("retries", 3), "retries >= 3"),
        (Condition::lt("retries", 10), "retries < 10"),
        (Condition::contains("message", "50%_off"), "message LIKE '%50\\%\\_off%'"),
        (Condition::is_set("user_id"), "user_id IS NOT NULL"),
        (Condition::is_not_set("user_id"), "user_id IS NULL"),
        (
            Condition::is_empty("environment"),
            "(environment IS NULL OR environment = '')",
        ),
    ];

    for (condition, expected) in cases {
        let sql = render(&base_query().with_condition(condition));
        assert!(sql.contains(expected), "expected `{}` in {}", expected, sql);
    }
}

#[test]
fn test_empty_in_list_matches_nothing() {
    let empty: Vec<u64> = Vec::new();
    let sql = render(&base_query().with_condition(Condition::is_in("group_id", empty)));
    assert!(sql.ends_with("AND 0"));
}

#[test]
fn test_sql_injection_prevention() {
    let sql = render(&base_query().with_condition(Condition::eq("environment", "'; DROP TABLE events; --")));

    // The quote is doubled, so the payload stays inside the string literal
    assert!(sql.contains("environment = '''; DROP TABLE events; --'"), "{}", sql);
}

#[test]
fn test_identifier_quoting() {
    let sql = render(&base_query().group_by_column("tags[sentry:release]"));
    assert!(sql.contains("`tags[sentry:release]`"));

    let sql = render(&StoreQuery::new(
        "analytics.events",
        base_query().start,
        base_query().end,
    ));
    assert!(sql.contains("FROM analytics.events"));
}
