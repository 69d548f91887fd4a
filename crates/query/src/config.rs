//! Query configuration types

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Query configuration
///
/// # Example
///
/// ```toml
/// [query]
/// backend = "clickhouse"
/// url = "http://localhost:8123"
/// database = "default"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Backend type (clickhouse)
    pub backend: Option<String>,

    /// ClickHouse HTTP URL
    pub url: Option<String>,

    /// Database name
    pub database: Option<String>,

    /// Username for authentication
    pub username: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Server-side execution limit in seconds
    pub max_execution_time: u64,

    /// Client-side request timeout in seconds
    pub request_timeout: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            backend: None,
            url: None,
            database: None,
            username: None,
            password: None,
            max_execution_time: 30,
            request_timeout: 60,
        }
    }
}

impl QueryConfig {
    /// Create config for ClickHouse backend
    pub fn clickhouse(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            backend: Some("clickhouse".to_string()),
            url: Some(url.into()),
            database: Some(database.into()),
            ..Default::default()
        }
    }

    /// Resolve the backend type, inferring it from what's configured
    pub fn backend_type(&self) -> Result<QueryBackendType, QueryError> {
        match self.backend.as_deref() {
            Some("clickhouse") => Ok(QueryBackendType::ClickHouse),
            // Events only reach a MemoryBackend through its API, so one built
            // from config would always be empty.
            Some("memory") => Err(QueryError::Config(
                "the memory backend cannot be configured; construct MemoryBackend with its \
                 events and pass it to the engine"
                    .to_string(),
            )),
            Some(other) => Err(QueryError::Config(format!("unknown backend: {}", other))),
            None if self.url.is_some() => Ok(QueryBackendType::ClickHouse),
            None => Err(QueryError::Config(
                "no query backend configured: set backend = \"clickhouse\" with \
                 url = \"http://localhost:8123\""
                    .to_string(),
            )),
        }
    }
}

/// Query backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryBackendType {
    /// ClickHouse backend
    ClickHouse,
}
