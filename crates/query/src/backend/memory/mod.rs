//! In-memory backend
//!
//! Evaluates [`StoreQuery`] descriptors over events held in process. Used for
//! local development and tests. Distinct counts are exact, which is within
//! the error bound callers already accept from the approximate store.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::backend::QueryBackend;
use crate::error::QueryError;
use crate::query::{
    Aggregation, Condition, ConditionValue, GroupBy, Operator, StoreQuery,
};
use crate::result::{Column, DataType, QueryResult};

/// A stored event: a timestamp plus named fields
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// Field values by column name
    pub fields: BTreeMap<String, Value>,
}

impl Event {
    /// Create an event with no fields
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    /// Set a field
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Field value, `Null` when absent
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }
}

/// Backend holding events in memory, keyed by dataset
#[derive(Debug, Default)]
pub struct MemoryBackend {
    datasets: RwLock<HashMap<String, Vec<Event>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one event
    pub fn insert(&self, dataset: &str, event: Event) {
        self.datasets
            .write()
            .entry(dataset.to_string())
            .or_default()
            .push(event);
    }

    /// Insert many events
    pub fn extend(&self, dataset: &str, events: impl IntoIterator<Item = Event>) {
        self.datasets
            .write()
            .entry(dataset.to_string())
            .or_default()
            .extend(events);
    }

    /// Number of events stored in a dataset
    pub fn len(&self, dataset: &str) -> usize {
        self.datasets.read().get(dataset).map_or(0, Vec::len)
    }

    /// Whether a dataset holds no events
    pub fn is_empty(&self, dataset: &str) -> bool {
        self.len(dataset) == 0
    }

    /// Drop all events
    pub fn clear(&self) {
        self.datasets.write().clear();
    }
}

/// Running aggregate for one group
enum Accumulator {
    Count(u64),
    Uniq(HashSet<String>),
}

impl Accumulator {
    fn new(aggregation: &Aggregation) -> Self {
        match aggregation {
            Aggregation::Count => Self::Count(0),
            Aggregation::Uniq(_) => Self::Uniq(HashSet::new()),
        }
    }

    fn add(&mut self, aggregation: &Aggregation, event: &Event) {
        match (self, aggregation) {
            (Self::Count(n), _) => *n += 1,
            (Self::Uniq(seen), Aggregation::Uniq(column)) => {
                let value = event.get(column);
                if !value.is_null() {
                    seen.insert(value.to_string());
                }
            }
            (Self::Uniq(_), Aggregation::Count) => {}
        }
    }

    fn value(&self) -> u64 {
        match self {
            Self::Count(n) => *n,
            Self::Uniq(seen) => seen.len() as u64,
        }
    }
}

#[async_trait]
impl QueryBackend for MemoryBackend {
    async fn execute(&self, query: &StoreQuery) -> Result<QueryResult, QueryError> {
        query.validate()?;
        let start = Instant::now();

        // Groups keyed by their serialized key so output order is deterministic
        let mut groups: BTreeMap<String, (Vec<Value>, Accumulator)> = BTreeMap::new();

        {
            let datasets = self.datasets.read();
            let events = datasets.get(&query.dataset).map(Vec::as_slice).unwrap_or(&[]);

            for event in events {
                if event.timestamp < query.start || event.timestamp >= query.end {
                    continue;
                }
                if !query.conditions.iter().all(|c| matches_condition(event, c)) {
                    continue;
                }

                let key: Vec<Value> = query
                    .group_by
                    .iter()
                    .map(|group| match group {
                        GroupBy::Column(column) => event.get(column).clone(),
                        GroupBy::Time { rollup } => {
                            Value::from(time_bucket(event.timestamp.timestamp(), *rollup))
                        }
                    })
                    .collect();

                let sort_key = serde_json::to_string(&key)?;
                groups
                    .entry(sort_key)
                    .or_insert_with(|| (key, Accumulator::new(&query.aggregation)))
                    .1
                    .add(&query.aggregation, event);
            }
        }

        // An ungrouped aggregate always yields exactly one row
        if query.group_by.is_empty() && groups.is_empty() {
            groups.insert(
                String::new(),
                (Vec::new(), Accumulator::new(&query.aggregation)),
            );
        }

        let rows: Vec<Vec<Value>> = groups
            .into_values()
            .map(|(mut key, acc)| {
                key.push(Value::from(acc.value()));
                key
            })
            .collect();

        let columns: Vec<Column> = query
            .output_columns()
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let data_type = rows
                    .first()
                    .and_then(|row| row.get(idx))
                    .map(DataType::infer)
                    .unwrap_or(DataType::Unknown);
                Column::new(name, data_type, true)
            })
            .collect();

        let execution_time_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            dataset = %query.dataset,
            rows = rows.len(),
            time_ms = execution_time_ms,
            "memory query executed"
        );

        Ok(QueryResult::new(columns, rows, execution_time_ms))
    }

    async fn health_check(&self) -> Result<(), QueryError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Start of the `rollup`-second bucket containing `ts`
fn time_bucket(ts: i64, rollup: i64) -> i64 {
    ts - ts.rem_euclid(rollup)
}

/// Evaluate a condition with SQL semantics: comparisons against null are false
fn matches_condition(event: &Event, condition: &Condition) -> bool {
    let field = event.get(&condition.field);

    match (&condition.operator, &condition.value) {
        (Operator::IsSet, _) => !field.is_null(),
        (Operator::IsNotSet, _) => field.is_null(),
        (Operator::IsEmpty, _) => field.is_null() || field.as_str() == Some(""),
        _ if field.is_null() => false,
        (Operator::Eq, ConditionValue::Single(v)) => values_equal(field, v),
        (Operator::Ne, ConditionValue::Single(v)) => !values_equal(field, v),
        (Operator::Gt, ConditionValue::Single(v)) => {
            compare_values(field, v) == Some(Ordering::Greater)
        }
        (Operator::Gte, ConditionValue::Single(v)) => matches!(
            compare_values(field, v),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        (Operator::Lt, ConditionValue::Single(v)) => {
            compare_values(field, v) == Some(Ordering::Less)
        }
        (Operator::Lte, ConditionValue::Single(v)) => matches!(
            compare_values(field, v),
            Some(Ordering::Less | Ordering::Equal)
        ),
        (Operator::Contains, ConditionValue::Single(Value::String(needle))) => field
            .as_str()
            .is_some_and(|haystack| haystack.contains(needle.as_str())),
        (Operator::In, ConditionValue::Multiple(values)) => {
            values.iter().any(|v| values_equal(field, v))
        }
        (Operator::NotIn, ConditionValue::Multiple(values)) => {
            !values.iter().any(|v| values_equal(field, v))
        }
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b).map_or(a == b, |ord| ord == Ordering::Equal)
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
