//! Query backend trait and implementations

pub mod clickhouse;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::QueryError;
use crate::query::StoreQuery;
use crate::result::QueryResult;

/// Query backend trait
///
/// Implemented by the ClickHouse and in-memory backends. A backend receives a
/// structured [`StoreQuery`] and returns one flat row per group: the group-by
/// values in order, followed by the aggregate.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Execute an aggregation query
    async fn execute(&self, query: &StoreQuery) -> Result<QueryResult, QueryError>;

    /// Check if backend is available
    async fn health_check(&self) -> Result<(), QueryError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: QueryBackend + ?Sized> QueryBackend for Arc<T> {
    async fn execute(&self, query: &StoreQuery) -> Result<QueryResult, QueryError> {
        (**self).execute(query).await
    }

    async fn health_check(&self) -> Result<(), QueryError> {
        (**self).health_check().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
