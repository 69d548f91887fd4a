//! Query error types

/// Errors that can occur during query execution
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Backend not configured
    #[error("backend not configured: {0}")]
    BackendNotConfigured(String),

    /// Connection failed (store unreachable)
    #[error("connection failed: {0}")]
    Connection(String),

    /// Query execution failed (store answered with a non-success status)
    #[error("query execution failed: {0}")]
    Execution(String),

    /// Query timed out
    #[error("query timed out after {0}s")]
    Timeout(u64),

    /// Query descriptor cannot be expressed by this backend
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Response could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl QueryError {
    /// Whether this error means the store could not be reached or refused the query
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Execution(_) | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Serialization(err.to_string())
    }
}
