//! Tests for ClickHouse backend

use chrono::{TimeZone, Utc};
use serde_json::json;

use super::*;

// =============================================================================
// Response Parsing Tests
// =============================================================================

#[test]
fn test_parse_rows_in_query_column_order() {
    let body = "{\"aggregate\":3,\"time\":1705276800,\"group_id\":7}\n\
                {\"aggregate\":5,\"time\":1705280400,\"group_id\":7}\n";

    let result = parse_json_each_row(body, &["group_id", "time", "aggregate"], 4).unwrap();

    assert_eq!(result.column_names(), vec!["group_id", "time", "aggregate"]);
    assert_eq!(result.row_count, 2);
    assert_eq!(result.rows[0], vec![json!(7), json!(1705276800), json!(3)]);
    assert_eq!(result.rows[1][2], json!(5));
    assert_eq!(result.columns[0].data_type, DataType::UInt64);
    assert_eq!(result.execution_time_ms, 4);
}

#[test]
fn test_parse_empty_body() {
    let result = parse_json_each_row("  \n", &["project_id", "aggregate"], 0).unwrap();
    assert!(result.is_empty());
    assert_eq!(result.columns.len(), 2);
    assert_eq!(result.columns[0].data_type, DataType::Unknown);
}

#[test]
fn test_parse_missing_column_is_error() {
    let body = "{\"project_id\":\"1\",\"aggregate\":\"5\"}";
    let err = parse_json_each_row(body, &["group_id", "aggregate"], 0).unwrap_err();

    assert!(matches!(err, QueryError::Serialization(ref m) if m.contains("group_id")));
}

#[test]
fn test_parse_null_key_is_kept() {
    let result =
        parse_json_each_row("{\"time\":null,\"aggregate\":\"12\"}", &["time", "aggregate"], 0)
            .unwrap();

    assert_eq!(result.rows[0], vec![serde_json::Value::Null, json!("12")]);
}

#[test]
fn test_parse_invalid_json() {
    let err = parse_json_each_row("{\"aggregate\":", &["aggregate"], 0).unwrap_err();
    assert!(matches!(err, QueryError::Serialization(_)));
}

// =============================================================================
// Request Building Tests
// =============================================================================

#[test]
fn test_build_url() {
    let backend = ClickHouseBackend::new(
        &ClickHouseBackendConfig::new("http://localhost:8123/", "analytics")
            .with_max_execution_time(15),
    )
    .unwrap();

    let url = backend.build_url(Some("tsdb range"));
    assert!(url.starts_with("http://localhost:8123/?database=analytics"));
    assert!(url.contains("max_execution_time=15"));
    assert!(url.contains("output_format_json_quote_64bit_integers=0"));
    assert!(url.ends_with("&log_comment=tsdb%20range"));

    assert!(!backend.build_url(None).contains("log_comment"));
}

#[test]
fn test_urlencoding() {
    assert_eq!(urlencoding::encode("abc-_.~"), "abc-_.~");
    assert_eq!(urlencoding::encode("a b"), "a%20b");
    assert_eq!(urlencoding::encode("a=b&c"), "a%3Db%26c");
}

#[test]
fn test_debug_hides_credentials() {
    let backend = ClickHouseBackend::new(
        &ClickHouseBackendConfig::default().with_credentials("reader", "s3cret"),
    )
    .unwrap();

    let debug = format!("{:?}", backend);
    assert!(debug.contains("localhost:8123"));
    assert!(!debug.contains("s3cret"));
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_unreachable_server_is_connection_error() {
    let backend = ClickHouseBackend::new(
        &ClickHouseBackendConfig::new("http://127.0.0.1:1", "default").with_request_timeout(5),
    )
    .unwrap();

    let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let query = StoreQuery::new("events", start, start + chrono::Duration::hours(1));

    let err = backend.execute(&query).await.unwrap_err();
    assert!(err.is_unavailable(), "unexpected error: {:?}", err);
}

#[tokio::test]
async fn test_invalid_query_rejected_before_sending() {
    let backend = ClickHouseBackend::new(&ClickHouseBackendConfig::new("http://127.0.0.1:1", "default"))
        .unwrap();

    let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let query = StoreQuery::new("events", start, start).group_by_time(-60);

    let err = backend.execute(&query).await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidQuery(_)));
}
