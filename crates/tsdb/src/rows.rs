//! Store row decoding
//!
//! Store rows are flat: group keys then the aggregate. Ids and counts may
//! arrive as JSON numbers or, for 64-bit integers, as numeric strings.

use serde_json::Value;
use tally_query::{AGGREGATE_COLUMN, QueryResult, TIME_COLUMN};

use crate::error::{Result, TsdbError};

/// Which key columns a result carries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowShape {
    /// Entity id column
    pub entity: Option<String>,
    /// Child id column
    pub child: Option<String>,
    /// Whether rows carry a time bucket
    pub time: bool,
}

/// One decoded store row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRow {
    /// Entity id
    pub entity: Option<u64>,
    /// Bucket start
    pub time: Option<i64>,
    /// Child id
    pub child: Option<u64>,
    /// Aggregate
    pub value: u64,
}

/// Decode store rows into [`RawRow`]s
///
/// Rows whose entity or child key is null cannot belong to any requested
/// entity and are skipped.
///
/// # Errors
///
/// Returns `MalformedResponse` if a key column is missing or a value is not
/// a non-negative integer.
pub fn decode_rows(result: &QueryResult, shape: &RowShape) -> Result<Vec<RawRow>> {
    if result.rows.is_empty() {
        return Ok(Vec::new());
    }

    let entity_idx = shape
        .entity
        .as_deref()
        .map(|c| column_index(result, c))
        .transpose()?;
    let child_idx = shape
        .child
        .as_deref()
        .map(|c| column_index(result, c))
        .transpose()?;
    let time_idx = shape
        .time
        .then(|| column_index(result, TIME_COLUMN))
        .transpose()?;
    let value_idx = column_index(result, AGGREGATE_COLUMN)?;

    let mut rows = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let value = cell(row, value_idx)?;
        let value = as_u64(value).ok_or_else(|| malformed(AGGREGATE_COLUMN, value))?;

        let entity = match entity_idx {
            Some(idx) => match key_u64(row, idx)? {
                Some(id) => Some(id),
                None => continue,
            },
            None => None,
        };
        let child = match child_idx {
            Some(idx) => match key_u64(row, idx)? {
                Some(id) => Some(id),
                None => continue,
            },
            None => None,
        };
        let time = match time_idx {
            Some(idx) => {
                let v = cell(row, idx)?;
                Some(as_i64(v).ok_or_else(|| malformed(TIME_COLUMN, v))?)
            }
            None => None,
        };

        rows.push(RawRow {
            entity,
            time,
            child,
            value,
        });
    }

    Ok(rows)
}

fn column_index(result: &QueryResult, name: &str) -> Result<usize> {
    result.column_index(name).ok_or_else(|| {
        TsdbError::MalformedResponse(format!(
            "expected column '{}', got {:?}",
            name,
            result.column_names()
        ))
    })
}

fn cell(row: &[Value], idx: usize) -> Result<&Value> {
    row.get(idx).ok_or_else(|| {
        TsdbError::MalformedResponse(format!(
            "row has {} values, expected at least {}",
            row.len(),
            idx + 1
        ))
    })
}

fn key_u64(row: &[Value], idx: usize) -> Result<Option<u64>> {
    let value = cell(row, idx)?;
    if value.is_null() {
        return Ok(None);
    }
    as_u64(value)
        .map(Some)
        .ok_or_else(|| malformed("key", value))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn malformed(what: &str, value: &Value) -> TsdbError {
    TsdbError::MalformedResponse(format!("unexpected {} value: {}", what, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_query::{Column, DataType};

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
        let columns = columns
            .iter()
            .map(|c| Column::new(*c, DataType::Unknown, true))
            .collect();
        QueryResult::new(columns, rows, 0)
    }

    fn series_shape() -> RowShape {
        RowShape {
            entity: Some("group_id".into()),
            child: None,
            time: true,
        }
    }

    #[test]
    fn test_decode_series_rows() {
        let result = result(
            &["group_id", "time", "aggregate"],
            vec![
                vec![json!(1), json!(3600), json!(3)],
                vec![json!("18446744073709551615"), json!("7200"), json!("4")],
            ],
        );

        let rows = decode_rows(&result, &series_shape()).unwrap();
        assert_eq!(
            rows,
            vec![
                RawRow { entity: Some(1), time: Some(3600), child: None, value: 3 },
                RawRow { entity: Some(u64::MAX), time: Some(7200), child: None, value: 4 },
            ]
        );
    }

    #[test]
    fn test_null_keys_are_skipped() {
        let shape = RowShape {
            entity: Some("project_id".into()),
            child: Some("group_id".into()),
            time: false,
        };
        let result = result(
            &["project_id", "group_id", "aggregate"],
            vec![
                vec![json!(1), Value::Null, json!(5)],
                vec![json!(1), json!(2), json!(6)],
            ],
        );

        let rows = decode_rows(&result, &shape).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].child, Some(2));
    }

    #[test]
    fn test_empty_result_needs_no_columns() {
        let rows = decode_rows(&QueryResult::empty(), &series_shape()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let result = result(&["group_id", "aggregate"], vec![vec![json!(1), json!(2)]]);
        let err = decode_rows(&result, &series_shape()).unwrap_err();
        assert!(matches!(err, TsdbError::MalformedResponse(ref m) if m.contains("time")));
    }

    #[test]
    fn test_bad_values_are_malformed() {
        let shape = RowShape::default();

        let negative = result(&["aggregate"], vec![vec![json!(-1)]]);
        assert!(matches!(
            decode_rows(&negative, &shape),
            Err(TsdbError::MalformedResponse(_))
        ));

        let text = result(&["aggregate"], vec![vec![json!("many")]]);
        assert!(matches!(
            decode_rows(&text, &shape),
            Err(TsdbError::MalformedResponse(_))
        ));

        let short = result(&["group_id", "time", "aggregate"], vec![vec![json!(1)]]);
        assert!(matches!(
            decode_rows(&short, &series_shape()),
            Err(TsdbError::MalformedResponse(_))
        ));
    }
}
