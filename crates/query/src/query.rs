//! Structured store queries
//!
//! A [`StoreQuery`] describes one aggregation against an event dataset:
//! which rows to read (time window and conditions), how to group them
//! (columns and/or time buckets) and what to compute per group. Backends
//! translate it into their own query language.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;

/// Output column holding the time bucket start (seconds since epoch)
pub const TIME_COLUMN: &str = "time";

/// Output column holding the aggregate value
pub const AGGREGATE_COLUMN: &str = "aggregate";

/// Column holding the event timestamp
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// One aggregation query against the event store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreQuery {
    /// Dataset (table) to read
    pub dataset: String,
    /// Start of the window (inclusive)
    pub start: DateTime<Utc>,
    /// End of the window (exclusive)
    pub end: DateTime<Utc>,
    /// Grouping keys, in output column order
    pub group_by: Vec<GroupBy>,
    /// Row conditions, combined with AND
    pub conditions: Vec<Condition>,
    /// Aggregate computed per group
    pub aggregation: Aggregation,
    /// Caller tag forwarded to the store for accounting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

impl StoreQuery {
    /// Create a query over `[start, end)` counting all rows
    pub fn new(dataset: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            dataset: dataset.into(),
            start,
            end,
            group_by: Vec::new(),
            conditions: Vec::new(),
            aggregation: Aggregation::Count,
            referrer: None,
        }
    }

    /// Group by a column
    pub fn group_by_column(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(GroupBy::Column(column.into()));
        self
    }

    /// Group by time bucket of `rollup` seconds
    pub fn group_by_time(mut self, rollup: i64) -> Self {
        self.group_by.push(GroupBy::Time { rollup });
        self
    }

    /// Add a condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Set the aggregation
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the referrer
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Names of the output columns, group keys first then the aggregate
    pub fn output_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.group_by.iter().map(GroupBy::output_name).collect();
        columns.push(AGGREGATE_COLUMN);
        columns
    }

    /// Check the query is well formed
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.dataset.is_empty() {
            return Err(QueryError::InvalidQuery("dataset is empty".to_string()));
        }
        for group in &self.group_by {
            if let GroupBy::Time { rollup } = group
                && *rollup <= 0
            {
                return Err(QueryError::InvalidQuery(format!(
                    "time rollup must be positive, got {}",
                    rollup
                )));
            }
        }
        Ok(())
    }
}

/// A grouping key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Group by a column value
    Column(String),
    /// Group by time bucket start, `rollup` seconds wide
    Time {
        /// Bucket width in seconds
        rollup: i64,
    },
}

impl GroupBy {
    /// Name of the output column for this key
    pub fn output_name(&self) -> &str {
        match self {
            Self::Column(name) => name,
            Self::Time { .. } => TIME_COLUMN,
        }
    }
}

/// Aggregate computed per group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Number of rows
    Count,
    /// Approximate number of distinct non-null values of a column
    Uniq(String),
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Field name to filter on
    pub field: String,
    /// Operator for comparison
    pub operator: Operator,
    /// Value(s) to compare against
    pub value: ConditionValue,
}

impl Condition {
    fn single(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: ConditionValue::Single(value.into()),
        }
    }

    fn bare(field: impl Into<String>, operator: Operator) -> Self {
        Self {
            field: field.into(),
            operator,
            value: ConditionValue::None,
        }
    }

    /// Create an equality condition
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Eq, value)
    }

    /// Create a not-equal condition
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Ne, value)
    }

    /// Create a greater-than-or-equal condition
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Gte, value)
    }

    /// Create a less-than condition
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Lt, value)
    }

    /// Create a contains condition
    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::single(field, Operator::Contains, value.into())
    }

    /// Create an IN condition
    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: Operator::In,
            value: ConditionValue::Multiple(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Create an is_set condition (field is not null)
    pub fn is_set(field: impl Into<String>) -> Self {
        Self::bare(field, Operator::IsSet)
    }

    /// Create an is_not_set condition (field is null)
    pub fn is_not_set(field: impl Into<String>) -> Self {
        Self::bare(field, Operator::IsNotSet)
    }

    /// Create an is_empty condition (field is null or the empty string)
    pub fn is_empty(field: impl Into<String>) -> Self {
        Self::bare(field, Operator::IsEmpty)
    }
}

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Contains substring
    Contains,
    /// In list
    In,
    /// Not in list
    NotIn,
    /// Field is set (not null)
    IsSet,
    /// Field is not set (null)
    IsNotSet,
    /// Field is null or the empty string
    IsEmpty,
}

/// Condition value (single, multiple, or none)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// No value (for is_set/is_not_set/is_empty)
    None,
    /// Multiple values (for IN)
    Multiple(Vec<Value>),
    /// Single value
    Single(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 15, 4, 0, 0).unwrap();
        (start, end)
    }

    #[test]
    fn test_output_columns_follow_group_order() {
        let (start, end) = window();
        let query = StoreQuery::new("events", start, end)
            .group_by_column("project_id")
            .group_by_time(3600)
            .group_by_column("group_id");

        assert_eq!(
            query.output_columns(),
            vec!["project_id", "time", "group_id", "aggregate"]
        );
    }

    #[test]
    fn test_validate_rejects_bad_rollup() {
        let (start, end) = window();
        let query = StoreQuery::new("events", start, end).group_by_time(0);
        assert!(matches!(query.validate(), Err(QueryError::InvalidQuery(_))));

        let query = StoreQuery::new("", start, end);
        assert!(query.validate().is_err());

        let query = StoreQuery::new("events", start, end).group_by_time(60);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_condition_constructors() {
        let cond = Condition::is_in("project_id", [1u64, 2]);
        assert_eq!(cond.operator, Operator::In);
        assert_eq!(
            cond.value,
            ConditionValue::Multiple(vec![json!(1), json!(2)])
        );

        let cond = Condition::eq("environment", "prod");
        assert_eq!(cond.value, ConditionValue::Single(json!("prod")));

        let cond = Condition::is_empty("environment");
        assert_eq!(cond.operator, Operator::IsEmpty);
        assert_eq!(cond.value, ConditionValue::None);
    }

    #[test]
    fn test_query_serialization() {
        let (start, end) = window();
        let query = StoreQuery::new("events", start, end)
            .group_by_time(3600)
            .with_aggregation(Aggregation::Uniq("user_id".into()))
            .with_referrer("tsdb");

        let json = serde_json::to_string(&query).unwrap();
        assert!(json.contains("\"uniq\":\"user_id\""));
        assert!(json.contains("\"rollup\":3600"));

        let parsed: StoreQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, query);
    }
}
