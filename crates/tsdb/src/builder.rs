//! Query builder for store aggregation queries
//!
//! Turns an [`AggregationRequest`] into a [`StoreQuery`]:
//! - Entity filter, and child filter for parent/children requests
//! - Environment filter (named, or the default environment)
//! - Time window aligned to rollup buckets, optionally narrowed to where
//!   the requested entities have been seen
//! - Grouping by entity, child and time bucket as the plan asks

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use tally_query::{Aggregation, Condition, GroupBy, StoreQuery};

use crate::directory::SeenWindow;
use crate::error::{Result, TsdbError};
use crate::model::{ENVIRONMENT_COLUMN, ModelDescriptor, Operation, TsdbModel};
use crate::rollup::{self, bucket_start, to_datetime};
use crate::rows::RowShape;

/// Entities a request is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKeys {
    /// Plain entity ids
    Ids(Vec<u64>),
    /// Parent ids, each with the child ids of interest
    Children(BTreeMap<u64, Vec<u64>>),
}

impl EntityKeys {
    /// Top-level ids, ascending and without duplicates
    pub fn top_level(&self) -> Vec<u64> {
        match self {
            Self::Ids(ids) => ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect(),
            Self::Children(map) => map.keys().copied().collect(),
        }
    }

    /// Union of all child ids, when children were given
    pub fn children(&self) -> Option<Vec<u64>> {
        match self {
            Self::Ids(_) => None,
            Self::Children(map) => Some(
                map.values()
                    .flatten()
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
            ),
        }
    }

    /// Whether no top-level id was given
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Ids(ids) => ids.is_empty(),
            Self::Children(map) => map.is_empty(),
        }
    }
}

impl From<Vec<u64>> for EntityKeys {
    fn from(ids: Vec<u64>) -> Self {
        Self::Ids(ids)
    }
}

impl From<&[u64]> for EntityKeys {
    fn from(ids: &[u64]) -> Self {
        Self::Ids(ids.to_vec())
    }
}

impl From<BTreeMap<u64, Vec<u64>>> for EntityKeys {
    fn from(map: BTreeMap<u64, Vec<u64>>) -> Self {
        Self::Children(map)
    }
}

/// Environment restriction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentFilter {
    /// Events recorded in the named environment
    Named(String),
    /// Events recorded without an environment (null or empty)
    Default,
}

impl EnvironmentFilter {
    /// Filter for an environment name; the empty name is the default environment
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            Self::Default
        } else {
            Self::Named(name)
        }
    }

    fn condition(&self) -> Condition {
        match self {
            Self::Named(name) => Condition::eq(ENVIRONMENT_COLUMN, name.as_str()),
            Self::Default => Condition::is_empty(ENVIRONMENT_COLUMN),
        }
    }
}

/// A request for aggregated data about some entities over a time range
#[derive(Debug, Clone)]
pub struct AggregationRequest {
    /// Model to query
    pub model: TsdbModel,
    /// Entities of interest
    pub keys: EntityKeys,
    /// Start of the range (inclusive)
    pub start: DateTime<Utc>,
    /// End of the range (inclusive)
    pub end: DateTime<Utc>,
    /// Bucket width in seconds
    pub rollup: i64,
    /// Optional environment restriction
    pub environment: Option<EnvironmentFilter>,
    /// Additional conditions on event fields
    pub conditions: Vec<Condition>,
    /// Seen windows of top-level entities, used to narrow the store window
    pub seen: BTreeMap<u64, SeenWindow>,
}

impl AggregationRequest {
    /// Create a request
    pub fn new(
        model: TsdbModel,
        keys: impl Into<EntityKeys>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        rollup: i64,
    ) -> Self {
        Self {
            model,
            keys: keys.into(),
            start,
            end,
            rollup,
            environment: None,
            conditions: Vec::new(),
            seen: BTreeMap::new(),
        }
    }

    /// Restrict to an environment
    pub fn with_environment(mut self, environment: EnvironmentFilter) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Add a condition on an event field
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Record where an entity has been seen
    pub fn with_seen_window(mut self, id: u64, window: SeenWindow) -> Self {
        self.seen.insert(id, window);
        self
    }

    /// Earliest first-seen and latest last-seen, if every top-level id has a window
    fn seen_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if self.seen.is_empty() {
            return None;
        }

        let mut bounds: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        for id in self.keys.top_level() {
            let window = self.seen.get(&id)?;
            bounds = Some(match bounds {
                Some((first, last)) => (
                    first.min(window.first_seen),
                    last.max(window.last_seen),
                ),
                None => (window.first_seen, window.last_seen),
            });
        }
        bounds
    }
}

/// Aggregate to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Event count (per child for ranking models)
    Count,
    /// Distinct count of the model's counted column
    Distinct,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count"),
            Self::Distinct => f.write_str("distinct count"),
        }
    }
}

/// What to aggregate and how to group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPlan {
    /// Aggregate to compute
    pub aggregate: Aggregate,
    /// Group rows by entity id
    pub group_on_model: bool,
    /// Group rows by time bucket
    pub group_on_time: bool,
}

impl QueryPlan {
    /// Per-entity, per-bucket series
    pub const fn series(aggregate: Aggregate) -> Self {
        Self {
            aggregate,
            group_on_model: true,
            group_on_time: true,
        }
    }

    /// Per-entity totals over the window
    pub const fn totals(aggregate: Aggregate) -> Self {
        Self {
            aggregate,
            group_on_model: true,
            group_on_time: false,
        }
    }

    /// One aggregate over all entities and the whole window
    pub const fn union(aggregate: Aggregate) -> Self {
        Self {
            aggregate,
            group_on_model: false,
            group_on_time: false,
        }
    }
}

/// A store query together with what is needed to shape its results
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    /// Query to send to the store
    pub query: StoreQuery,
    /// Descriptor of the requested model
    pub descriptor: ModelDescriptor,
    /// Bucket width in seconds
    pub rollup: i64,
    /// Every bucket start of the requested range
    pub series: Vec<i64>,
}

impl BuiltQuery {
    /// Which key columns the store rows carry
    pub fn shape(&self) -> RowShape {
        let grouped_on = |column: &str| {
            self.query
                .group_by
                .iter()
                .any(|g| matches!(g, GroupBy::Column(c) if c == column))
        };

        RowShape {
            entity: grouped_on(self.descriptor.entity_column)
                .then(|| self.descriptor.entity_column.to_string()),
            child: self
                .descriptor
                .child_column()
                .filter(|c| grouped_on(c))
                .map(str::to_string),
            time: self
                .query
                .group_by
                .iter()
                .any(|g| matches!(g, GroupBy::Time { .. })),
        }
    }
}

/// Builds store queries from aggregation requests
pub struct QueryBuilder<'a> {
    request: &'a AggregationRequest,
    plan: QueryPlan,
    referrer: Option<String>,
}

impl<'a> QueryBuilder<'a> {
    /// Create a builder for a request, planning a count series
    pub fn new(request: &'a AggregationRequest) -> Self {
        Self {
            request,
            plan: QueryPlan::series(Aggregate::Count),
            referrer: None,
        }
    }

    /// Set the plan
    pub fn plan(mut self, plan: QueryPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Tag the query with a referrer
    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Validate the request and build the store query
    ///
    /// # Errors
    ///
    /// - `UnknownModel` if the model is not served here
    /// - `InvalidRequest` for a reversed range, a bad rollup, empty keys or
    ///   an aggregate the model cannot serve
    pub fn build(self) -> Result<BuiltQuery> {
        let request = self.request;
        let descriptor = request.model.describe()?;

        if request.keys.is_empty() {
            return Err(TsdbError::InvalidRequest(format!(
                "no {} ids requested",
                request.model
            )));
        }
        if matches!(request.keys, EntityKeys::Children(_)) && descriptor.child_column().is_none() {
            return Err(TsdbError::InvalidRequest(format!(
                "model {} has no child entities",
                request.model
            )));
        }

        let aggregation = match (self.plan.aggregate, descriptor.operation) {
            (Aggregate::Count, Operation::Count | Operation::TopK { .. }) => Aggregation::Count,
            (Aggregate::Distinct, Operation::DistinctCount { column }) => {
                Aggregation::Uniq(column.to_string())
            }
            (aggregate, _) => {
                return Err(TsdbError::InvalidRequest(format!(
                    "model {} cannot serve a {} aggregate",
                    request.model, aggregate
                )));
            }
        };

        let series = rollup::buckets(request.start, request.end, request.rollup)?;
        let (start, end) = self.window(&series)?;

        let mut query =
            StoreQuery::new(descriptor.dataset, start, end).with_aggregation(aggregation);

        if self.plan.group_on_model {
            query = query.group_by_column(descriptor.entity_column);
        }
        if self.plan.aggregate == Aggregate::Count
            && let Some(child_column) = descriptor.child_column()
        {
            query = query.group_by_column(child_column);
        }
        if self.plan.group_on_time {
            query = query.group_by_time(request.rollup);
        }

        query = query.with_condition(Condition::is_in(
            descriptor.entity_column,
            request.keys.top_level(),
        ));
        if let (Some(children), Some(child_column)) =
            (request.keys.children(), descriptor.child_column())
        {
            query = query.with_condition(Condition::is_in(child_column, children));
        }
        if let Some(environment) = &request.environment {
            query = query.with_condition(environment.condition());
        }
        for condition in &request.conditions {
            query = query.with_condition(condition.clone());
        }
        if let Some(referrer) = self.referrer {
            query = query.with_referrer(referrer);
        }

        Ok(BuiltQuery {
            query,
            descriptor,
            rollup: request.rollup,
            series,
        })
    }

    /// Store window `[first bucket, last bucket + rollup)`, narrowed to the seen window
    fn window(&self, series: &[i64]) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let rollup = self.request.rollup;
        let (Some(&first), Some(&last)) = (series.first(), series.last()) else {
            return Err(TsdbError::InvalidRequest("empty bucket series".to_string()));
        };

        let mut start = first;
        let mut end = last + rollup;

        if let Some((first_seen, last_seen)) = self.request.seen_bounds() {
            start = start.max(bucket_start(first_seen.timestamp(), rollup));
            end = end.min(bucket_start(last_seen.timestamp(), rollup) + rollup);
            end = end.max(start);
        }

        Ok((to_datetime(start)?, to_datetime(end)?))
    }
}
