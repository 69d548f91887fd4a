//! ClickHouse backend for event aggregation queries
//!
//! Renders [`StoreQuery`] descriptors to SQL and executes them against a
//! ClickHouse database using the HTTP interface.

mod sql;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::backend::QueryBackend;
use crate::error::QueryError;
use crate::query::StoreQuery;
use crate::result::{Column, DataType, QueryResult};

// =============================================================================
// Configuration
// =============================================================================

/// ClickHouse backend configuration
#[derive(Debug, Clone)]
pub struct ClickHouseBackendConfig {
    /// ClickHouse HTTP URL (e.g., "http://localhost:8123")
    pub url: String,

    /// Database name
    pub database: String,

    /// Username for authentication (optional)
    pub username: Option<String>,

    /// Password for authentication (optional)
    pub password: Option<String>,

    /// Max execution time in seconds (server side)
    pub max_execution_time: u64,

    /// HTTP request timeout in seconds (client side)
    pub request_timeout: u64,
}

impl Default for ClickHouseBackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".into(),
            database: "default".into(),
            username: None,
            password: None,
            max_execution_time: 30,
            request_timeout: 60,
        }
    }
}

impl ClickHouseBackendConfig {
    /// Create a new config with URL and database
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Set authentication credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the server-side execution limit
    pub fn with_max_execution_time(mut self, seconds: u64) -> Self {
        self.max_execution_time = seconds;
        self
    }

    /// Set the client-side request timeout
    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }
}

// =============================================================================
// Backend Implementation
// =============================================================================

/// ClickHouse backend using the HTTP interface
#[derive(Clone)]
pub struct ClickHouseBackend {
    client: reqwest::Client,
    config: ClickHouseBackendConfig,
}

impl std::fmt::Debug for ClickHouseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseBackend")
            .field("url", &self.config.url)
            .field("database", &self.config.database)
            .finish()
    }
}

impl ClickHouseBackend {
    /// Create a new ClickHouse backend from config
    pub fn new(config: &ClickHouseBackendConfig) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| QueryError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Create from URL and database directly
    pub fn from_url(
        url: impl Into<String>,
        database: impl Into<String>,
    ) -> Result<Self, QueryError> {
        Self::new(&ClickHouseBackendConfig::new(url, database))
    }

    /// Build the request URL with settings parameters
    fn build_url(&self, referrer: Option<&str>) -> String {
        let mut url = format!(
            "{}/?database={}&max_execution_time={}&output_format_json_quote_64bit_integers=0",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&self.config.database),
            self.config.max_execution_time
        );

        if let Some(referrer) = referrer {
            url.push_str("&log_comment=");
            url.push_str(&urlencoding::encode(referrer));
        }

        url
    }

    /// Send SQL and get the raw response body
    async fn execute_sql(&self, sql: &str, referrer: Option<&str>) -> Result<String, QueryError> {
        let url = self.build_url(referrer);

        let mut request = self.client.post(&url).body(sql.to_string());

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                QueryError::Timeout(self.config.request_timeout)
            } else {
                QueryError::Connection(format!("ClickHouse connection failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Execution(format!(
                "ClickHouse error ({}): {}",
                status,
                body.trim()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| QueryError::Execution(format!("failed to read response: {}", e)))
    }
}

#[async_trait]
impl QueryBackend for ClickHouseBackend {
    async fn execute(&self, query: &StoreQuery) -> Result<QueryResult, QueryError> {
        query.validate()?;

        let sql = sql::render(query);
        let start = Instant::now();

        let response_text = self
            .execute_sql(
                &format!("{} FORMAT JSONEachRow", sql),
                query.referrer.as_deref(),
            )
            .await?;

        let execution_time_ms = start.elapsed().as_millis() as u64;
        let result = parse_json_each_row(&response_text, &query.output_columns(), execution_time_ms)?;

        tracing::debug!(
            dataset = %query.dataset,
            rows = result.row_count,
            time_ms = execution_time_ms,
            "ClickHouse query executed"
        );

        Ok(result)
    }

    async fn health_check(&self) -> Result<(), QueryError> {
        self.execute_sql("SELECT 1", None).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "clickhouse"
    }
}

/// Parse a JSONEachRow body into a result with the expected column order
fn parse_json_each_row(
    body: &str,
    column_names: &[&str],
    execution_time_ms: u64,
) -> Result<QueryResult, QueryError> {
    let json_rows: Vec<HashMap<String, serde_json::Value>> = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                QueryError::Serialization(format!("failed to parse JSON row: {}", e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let columns: Vec<Column> = column_names
        .iter()
        .map(|name| {
            let data_type = json_rows
                .first()
                .and_then(|row| row.get(*name))
                .map(DataType::infer)
                .unwrap_or(DataType::Unknown);
            Column::new(*name, data_type, true)
        })
        .collect();

    // A JSON null is kept; an absent column means the response does not
    // match the query.
    let rows: Vec<Vec<serde_json::Value>> = json_rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            column_names
                .iter()
                .map(|name| {
                    row.get(*name).cloned().ok_or_else(|| {
                        QueryError::Serialization(format!(
                            "row {} is missing column '{}'",
                            i, name
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QueryResult::new(columns, rows, execution_time_ms))
}

/// URL encoding helper
mod urlencoding {
    pub fn encode(s: &str) -> String {
        let mut result = String::with_capacity(s.len() * 3);
        for c in s.chars() {
            match c {
                'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => {
                    result.push(c);
                }
                ' ' => result.push_str("%20"),
                _ => {
                    for byte in c.to_string().as_bytes() {
                        result.push_str(&format!("%{:02X}", byte));
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "clickhouse_test.rs"]
mod clickhouse_test;
