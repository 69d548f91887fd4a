//! TSDB engine
//!
//! Entry point for time-series queries. Each operation builds one store
//! query (two, in order, for [`Tsdb::most_frequent_series`]), decodes the
//! rows and zero-fills them over the requested ids and buckets.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_query::{Condition, QueryBackend, QueryEngine};

use crate::builder::{
    Aggregate, AggregationRequest, BuiltQuery, EntityKeys, EnvironmentFilter, QueryBuilder,
    QueryPlan,
};
use crate::config::{Config, TsdbConfig};
use crate::directory::{EntityDirectory, StaticDirectory};
use crate::error::{Result, TsdbError};
use crate::model::{Operation, TsdbModel};
use crate::rollup::optimal_rollup;
use crate::rows::{RawRow, decode_rows};
use crate::zerofill::{
    FrequencySeries, FrequencyTotals, RankedList, ResultSeries, fill_frequency_series,
    fill_frequency_totals, fill_series, fill_totals, rank,
};

/// Per-call options shared by every operation
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Bucket width in seconds; chosen from the configured rollups when unset
    pub rollup: Option<i64>,
    /// Environment to restrict to
    pub environment_id: Option<u64>,
    /// Additional conditions on event fields
    pub conditions: Vec<Condition>,
}

impl QueryOptions {
    /// Options with nothing set
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed rollup
    pub fn with_rollup(mut self, rollup: i64) -> Self {
        self.rollup = Some(rollup);
        self
    }

    /// Restrict to an environment
    pub fn with_environment(mut self, environment_id: u64) -> Self {
        self.environment_id = Some(environment_id);
        self
    }

    /// Add a condition on an event field
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// Time-series query engine over the event store
#[derive(Clone)]
pub struct Tsdb {
    backend: Arc<dyn QueryBackend>,
    directory: Arc<dyn EntityDirectory>,
    config: TsdbConfig,
}

impl Tsdb {
    /// Create an engine over a backend, with default settings and an empty directory
    pub fn new(backend: impl QueryBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            directory: Arc::new(StaticDirectory::new()),
            config: TsdbConfig::default(),
        }
    }

    /// Create an engine from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let backend = QueryEngine::from_config(&config.query)?;
        Ok(Self::new(backend).with_config(config.tsdb.clone()))
    }

    /// Replace the settings
    pub fn with_config(mut self, config: TsdbConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the entity directory
    pub fn with_directory(mut self, directory: impl EntityDirectory + 'static) -> Self {
        self.directory = Arc::new(directory);
        self
    }

    /// Current settings
    pub fn config(&self) -> &TsdbConfig {
        &self.config
    }

    /// Name of the store backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Check the store is reachable
    pub async fn health_check(&self) -> Result<()> {
        self.backend.health_check().await.map_err(TsdbError::from)
    }

    /// Event counts per id and bucket
    pub async fn range(
        &self,
        model: TsdbModel,
        ids: &[u64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> Result<ResultSeries> {
        expect_operation(model, "range", |op| matches!(op, Operation::Count))?;

        let request = self.request(model, ids.into(), start, end, options)?;
        let (built, rows) = self
            .execute(&request, QueryPlan::series(Aggregate::Count), "range")
            .await?;

        Ok(fill_series(&rows, &request.keys.top_level(), &built.series))
    }

    /// Distinct counts per id and bucket
    pub async fn distinct_count_series(
        &self,
        model: TsdbModel,
        ids: &[u64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> Result<ResultSeries> {
        let request = self.request(model, ids.into(), start, end, options)?;
        let (built, rows) = self
            .execute(
                &request,
                QueryPlan::series(Aggregate::Distinct),
                "distinct_count_series",
            )
            .await?;

        Ok(fill_series(&rows, &request.keys.top_level(), &built.series))
    }

    /// Distinct counts per id over the whole range
    pub async fn distinct_count_totals(
        &self,
        model: TsdbModel,
        ids: &[u64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> Result<BTreeMap<u64, u64>> {
        let request = self.request(model, ids.into(), start, end, options)?;
        let (_, rows) = self
            .execute(
                &request,
                QueryPlan::totals(Aggregate::Distinct),
                "distinct_count_totals",
            )
            .await?;

        Ok(fill_totals(&rows, &request.keys.top_level()))
    }

    /// One distinct count across all ids and the whole range
    pub async fn distinct_count_union(
        &self,
        model: TsdbModel,
        ids: &[u64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> Result<u64> {
        let request = self.request(model, ids.into(), start, end, options)?;
        let (_, rows) = self
            .execute(
                &request,
                QueryPlan::union(Aggregate::Distinct),
                "distinct_count_union",
            )
            .await?;

        Ok(rows.iter().map(|r| r.value).sum())
    }

    /// Most frequent children of each id over the range
    ///
    /// Keeps at most `limit` children per id (the configured default when
    /// `None`), best first, ties broken by child id.
    pub async fn most_frequent(
        &self,
        model: TsdbModel,
        ids: &[u64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
        options: &QueryOptions,
    ) -> Result<RankedList> {
        expect_operation(model, "ranking", |op| matches!(op, Operation::TopK { .. }))?;

        let limit = limit.unwrap_or(self.config.default_limit);
        let request = self.request(model, ids.into(), start, end, options)?;
        let (_, rows) = self
            .execute(&request, QueryPlan::totals(Aggregate::Count), "most_frequent")
            .await?;

        Ok(rank(&rows, &request.keys.top_level(), limit))
    }

    /// Per-bucket counts of the most frequent children of each id
    ///
    /// Ranks first, then breaks down each id's ranked children per bucket.
    pub async fn most_frequent_series(
        &self,
        model: TsdbModel,
        ids: &[u64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
        options: &QueryOptions,
    ) -> Result<FrequencySeries> {
        let ranked = self
            .most_frequent(model, ids, start, end, limit, options)
            .await?;

        let items: BTreeMap<u64, Vec<u64>> = ranked
            .into_iter()
            .map(|(parent, children)| {
                (parent, children.into_iter().map(|(child, _)| child).collect())
            })
            .collect();

        self.frequency_series(model, &items, start, end, options)
            .await
    }

    /// Per-bucket counts of the given children of each parent
    pub async fn frequency_series(
        &self,
        model: TsdbModel,
        items: &BTreeMap<u64, Vec<u64>>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> Result<FrequencySeries> {
        expect_operation(model, "frequency", |op| matches!(op, Operation::TopK { .. }))?;

        let request = self.request(model, items.clone().into(), start, end, options)?;
        let (built, rows) = self
            .execute(
                &request,
                QueryPlan::series(Aggregate::Count),
                "frequency_series",
            )
            .await?;

        Ok(fill_frequency_series(&rows, items, &built.series))
    }

    /// Total counts of the given children of each parent
    pub async fn frequency_totals(
        &self,
        model: TsdbModel,
        items: &BTreeMap<u64, Vec<u64>>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> Result<FrequencyTotals> {
        expect_operation(model, "frequency", |op| matches!(op, Operation::TopK { .. }))?;

        let request = self.request(model, items.clone().into(), start, end, options)?;
        let (_, rows) = self
            .execute(
                &request,
                QueryPlan::totals(Aggregate::Count),
                "frequency_totals",
            )
            .await?;

        Ok(fill_frequency_totals(&rows, items))
    }

    /// Resolve options into a request
    fn request(
        &self,
        model: TsdbModel,
        keys: EntityKeys,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> Result<AggregationRequest> {
        let rollup = match options.rollup {
            Some(rollup) => rollup,
            None => optimal_rollup(start, end, &self.config.rollups)
                .ok_or_else(|| TsdbError::Config("no rollups configured".to_string()))?,
        };

        let mut request = AggregationRequest::new(model, keys, start, end, rollup);

        if let Some(environment_id) = options.environment_id {
            let name = self
                .directory
                .environment_name(environment_id)
                .ok_or_else(|| {
                    TsdbError::InvalidRequest(format!("unknown environment id {}", environment_id))
                })?;
            request = request.with_environment(EnvironmentFilter::from_name(name));
        }

        for condition in &options.conditions {
            request = request.with_condition(condition.clone());
        }

        for id in request.keys.top_level() {
            if let Some(window) = self.directory.seen_window(model, id) {
                request = request.with_seen_window(id, window);
            }
        }

        Ok(request)
    }

    /// Build, run and decode one store query
    async fn execute(
        &self,
        request: &AggregationRequest,
        plan: QueryPlan,
        operation: &'static str,
    ) -> Result<(BuiltQuery, Vec<RawRow>)> {
        let built = QueryBuilder::new(request)
            .plan(plan)
            .referrer(self.config.referrer.as_str())
            .build()?;

        let result = self.backend.execute(&built.query).await.map_err(|e| {
            tracing::warn!(
                operation,
                model = %request.model,
                backend = self.backend.name(),
                error = %e,
                "store query failed"
            );
            TsdbError::from(e)
        })?;

        let rows = decode_rows(&result, &built.shape())?;

        tracing::debug!(
            operation,
            model = %request.model,
            rollup = built.rollup,
            buckets = built.series.len(),
            rows = rows.len(),
            time_ms = result.execution_time_ms,
            "tsdb query executed"
        );

        Ok((built, rows))
    }
}

impl std::fmt::Debug for Tsdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tsdb")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Fail unless the model aggregates the way an operation needs
fn expect_operation(
    model: TsdbModel,
    what: &str,
    supported: impl Fn(Operation) -> bool,
) -> Result<()> {
    let descriptor = model.describe()?;
    if supported(descriptor.operation) {
        Ok(())
    } else {
        Err(TsdbError::InvalidRequest(format!(
            "model {} does not support {} queries",
            model, what
        )))
    }
}
