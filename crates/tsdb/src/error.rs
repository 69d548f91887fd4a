//! TSDB error types

use std::io;

use tally_query::QueryError;
use thiserror::Error;

/// TSDB errors
#[derive(Debug, Error)]
pub enum TsdbError {
    /// Request cannot be served as asked (bad range, rollup, keys or environment)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Model is not served by this layer
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Store unreachable, timed out or refused the query
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Store answered with rows of an unexpected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    ConfigIo {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration is inconsistent or names no usable backend
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<QueryError> for TsdbError {
    fn from(err: QueryError) -> Self {
        match err {
            err if err.is_unavailable() => TsdbError::BackendUnavailable(err.to_string()),
            QueryError::Serialization(msg) => TsdbError::MalformedResponse(msg),
            QueryError::InvalidQuery(msg) => TsdbError::InvalidRequest(msg),
            QueryError::Config(msg) | QueryError::BackendNotConfigured(msg) => {
                TsdbError::Config(msg)
            }
            err => TsdbError::BackendUnavailable(err.to_string()),
        }
    }
}

/// Result type for TSDB operations
pub type Result<T> = std::result::Result<T, TsdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_mapping() {
        let err: TsdbError = QueryError::Connection("refused".into()).into();
        assert!(matches!(err, TsdbError::BackendUnavailable(_)));

        let err: TsdbError = QueryError::Timeout(30).into();
        assert!(matches!(err, TsdbError::BackendUnavailable(ref m) if m.contains("30s")));

        let err: TsdbError = QueryError::Execution("HTTP 500".into()).into();
        assert!(matches!(err, TsdbError::BackendUnavailable(_)));

        let err: TsdbError = QueryError::Serialization("bad row".into()).into();
        assert!(matches!(err, TsdbError::MalformedResponse(ref m) if m == "bad row"));

        let err: TsdbError = QueryError::InvalidQuery("rollup".into()).into();
        assert!(matches!(err, TsdbError::InvalidRequest(_)));

        let err: TsdbError = QueryError::BackendNotConfigured("none".into()).into();
        assert!(matches!(err, TsdbError::Config(_)));
    }

    #[test]
    fn test_config_errors_keep_source() {
        use std::error::Error as _;

        let err = TsdbError::ConfigIo {
            path: "/etc/tally.toml".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/etc/tally.toml"));
        assert!(err.source().is_some());

        let toml_err = toml::from_str::<toml::Value>("[tsdb").unwrap_err();
        let err = TsdbError::from(toml_err);
        assert!(matches!(err, TsdbError::ConfigParse(_)));
        assert!(err.source().is_some());
    }
}
