//! Tally Query - event store access for Tally time-series queries
//!
//! Provides a unified interface for running aggregation queries against the
//! event store:
//! - **ClickHouse**: Production columnar store, over the HTTP interface
//! - **Memory**: In-process events for development and tests, constructed
//!   directly rather than from config
//!
//! Callers describe what they want as a [`StoreQuery`] (dataset, time window,
//! group-by keys, conditions, aggregate) and receive flat rows back.
//!
//! # Usage
//!
//! ```ignore
//! use tally_query::{Aggregation, Condition, QueryConfig, QueryEngine, StoreQuery};
//!
//! let engine = QueryEngine::from_config(&QueryConfig::clickhouse("http://localhost:8123", "default"))?;
//!
//! let query = StoreQuery::new("events", start, end)
//!     .group_by_column("project_id")
//!     .group_by_time(3600)
//!     .with_condition(Condition::is_in("project_id", [1u64, 2]));
//!
//! let result = engine.execute(&query).await?;
//! println!("Rows: {}", result.row_count);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod query;
pub mod result;

// Re-exports
pub use backend::QueryBackend;
pub use backend::clickhouse::{ClickHouseBackend, ClickHouseBackendConfig};
pub use backend::memory::{Event, MemoryBackend};
pub use config::{QueryBackendType, QueryConfig};
pub use error::QueryError;
pub use query::{
    AGGREGATE_COLUMN, Aggregation, Condition, ConditionValue, GroupBy, Operator, StoreQuery,
    TIME_COLUMN, TIMESTAMP_COLUMN,
};
pub use result::{Column, DataType, QueryResult};

use std::sync::Arc;

use async_trait::async_trait;

/// Query engine that routes queries to the configured backend
#[derive(Clone)]
pub struct QueryEngine {
    backend: Arc<dyn QueryBackend>,
}

impl QueryEngine {
    /// Create a new query engine with a specific backend
    pub fn new(backend: impl QueryBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Create a query engine from config
    pub fn from_config(config: &QueryConfig) -> Result<Self, QueryError> {
        match config.backend_type()? {
            QueryBackendType::ClickHouse => {
                let url = config.url.as_ref().ok_or_else(|| {
                    QueryError::Config("url required for clickhouse backend".to_string())
                })?;
                let database = config.database.as_deref().unwrap_or("default");

                let mut ch_config = ClickHouseBackendConfig::new(url, database)
                    .with_max_execution_time(config.max_execution_time)
                    .with_request_timeout(config.request_timeout);

                if let (Some(user), Some(pass)) = (&config.username, &config.password) {
                    ch_config = ch_config.with_credentials(user, pass);
                }

                Ok(Self::new(ClickHouseBackend::new(&ch_config)?))
            }
        }
    }

    /// Get the backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[async_trait]
impl QueryBackend for QueryEngine {
    async fn execute(&self, query: &StoreQuery) -> Result<QueryResult, QueryError> {
        self.backend.execute(query).await
    }

    async fn health_check(&self) -> Result<(), QueryError> {
        self.backend.health_check().await
    }

    fn name(&self) -> &'static str {
        self.backend.name()
    }
}
