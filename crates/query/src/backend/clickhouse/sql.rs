//! SQL rendering for ClickHouse
//!
//! Turns a [`StoreQuery`] into ClickHouse SQL. Time buckets are rendered as
//! epoch seconds so results line up with the bucket sequence computed by
//! callers.

use serde_json::Value;

use crate::query::{
    AGGREGATE_COLUMN, Aggregation, Condition, ConditionValue, GroupBy, Operator, StoreQuery,
    TIME_COLUMN, TIMESTAMP_COLUMN,
};

const DAY_SECONDS: i64 = 86_400;

/// SQL statement builder
pub(crate) struct SqlBuilder {
    table: String,
    select: Vec<String>,
    where_clauses: Vec<String>,
    group_by: Vec<String>,
    order_by: Vec<String>,
}

impl SqlBuilder {
    /// Create a new builder for a table
    pub(crate) fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: Vec::new(),
            where_clauses: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// Add a SELECT column
    pub(crate) fn select(mut self, column: impl Into<String>) -> Self {
        self.select.push(column.into());
        self
    }

    /// Add a SELECT column with alias
    pub(crate) fn select_as(mut self, expr: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select.push(format!("{} AS {}", expr.into(), alias.into()));
        self
    }

    /// Add a WHERE clause
    pub(crate) fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clauses.push(clause.into());
        self
    }

    /// Add a GROUP BY column
    pub(crate) fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    /// Add an ORDER BY column
    pub(crate) fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    /// Build the final SQL query
    pub(crate) fn build(self) -> String {
        let mut sql = String::new();

        sql.push_str("SELECT ");
        if self.select.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clauses.join(" AND "));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        sql
    }
}

/// Render a store query as ClickHouse SQL
pub(crate) fn render(query: &StoreQuery) -> String {
    let mut builder = SqlBuilder::new(escape_identifier(&query.dataset));

    for group in &query.group_by {
        match group {
            GroupBy::Column(column) => {
                let column = escape_identifier(column);
                builder = builder
                    .select(column.clone())
                    .group_by(column.clone())
                    .order_by(column);
            }
            GroupBy::Time { rollup } => {
                builder = builder
                    .select_as(time_bucket_expr(*rollup), TIME_COLUMN)
                    .group_by(TIME_COLUMN)
                    .order_by(TIME_COLUMN);
            }
        }
    }

    let aggregate = match &query.aggregation {
        Aggregation::Count => "count()".to_string(),
        Aggregation::Uniq(column) => format!("uniq({})", escape_identifier(column)),
    };
    builder = builder.select_as(aggregate, AGGREGATE_COLUMN);

    builder = builder.where_clause(format!(
        "{ts} >= toDateTime({}, 'UTC') AND {ts} < toDateTime({}, 'UTC')",
        query.start.timestamp(),
        query.end.timestamp(),
        ts = TIMESTAMP_COLUMN,
    ));

    for condition in &query.conditions {
        if let Some(clause) = condition_to_sql(condition) {
            builder = builder.where_clause(clause);
        }
    }

    builder.build()
}

/// Expression computing the bucket start (epoch seconds) of the event timestamp
fn time_bucket_expr(rollup: i64) -> String {
    if rollup == DAY_SECONDS {
        format!("toUInt32(toStartOfDay({}, 'UTC'))", TIMESTAMP_COLUMN)
    } else {
        format!(
            "intDiv(toUInt32({}), {rollup}) * {rollup}",
            TIMESTAMP_COLUMN,
            rollup = rollup
        )
    }
}

/// Convert a Condition to a SQL WHERE clause
fn condition_to_sql(condition: &Condition) -> Option<String> {
    let field = escape_identifier(&condition.field);

    match (&condition.operator, &condition.value) {
        (Operator::Eq, ConditionValue::Single(v)) => Some(format!("{} = {}", field, literal(v))),
        (Operator::Ne, ConditionValue::Single(v)) => Some(format!("{} != {}", field, literal(v))),
        (Operator::Gt, ConditionValue::Single(v)) => Some(format!("{} > {}", field, literal(v))),
        (Operator::Gte, ConditionValue::Single(v)) => {
            Some(format!("{} >= {}", field, literal(v)))
        }
        (Operator::Lt, ConditionValue::Single(v)) => Some(format!("{} < {}", field, literal(v))),
        (Operator::Lte, ConditionValue::Single(v)) => {
            Some(format!("{} <= {}", field, literal(v)))
        }
        (Operator::Contains, ConditionValue::Single(Value::String(v))) => {
            Some(format!("{} LIKE '%{}%'", field, escape_like(v)))
        }
        (Operator::In, ConditionValue::Multiple(values)) if values.is_empty() => {
            Some("0".to_string())
        }
        (Operator::In, ConditionValue::Multiple(values)) => {
            Some(format!("{} IN ({})", field, literal_list(values)))
        }
        (Operator::NotIn, ConditionValue::Multiple(values)) if values.is_empty() => None,
        (Operator::NotIn, ConditionValue::Multiple(values)) => {
            Some(format!("{} NOT IN ({})", field, literal_list(values)))
        }
        (Operator::IsSet, _) => Some(format!("{} IS NOT NULL", field)),
        (Operator::IsNotSet, _) => Some(format!("{} IS NULL", field)),
        (Operator::IsEmpty, _) => Some(format!("({f} IS NULL OR {f} = '')", f = field)),
        _ => None,
    }
}

/// Render a JSON value as a SQL literal
fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", escape_string(s)),
        other => format!("'{}'", escape_string(&other.to_string())),
    }
}

fn literal_list(values: &[Value]) -> String {
    values.iter().map(literal).collect::<Vec<_>>().join(", ")
}

/// Escape a string value for SQL (prevent injection)
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

/// Escape identifier (column/table name)
fn escape_identifier(s: &str) -> String {
    // Only allow alphanumeric, underscore and dotted database prefixes
    if s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        s.to_string()
    } else {
        format!("`{}`", s.replace('`', "``"))
    }
}

/// Escape LIKE pattern special characters
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
        .replace('\'', "''")
}

#[cfg(test)]
#[path = "sql_test.rs"]
mod sql_test;
