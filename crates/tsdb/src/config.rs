//! TSDB configuration
//!
//! TOML-based, every section optional:
//!
//! ```toml
//! [query]
//! backend = "clickhouse"
//! url = "http://localhost:8123"
//! database = "default"
//!
//! [tsdb]
//! default_limit = 10
//! referrer = "tsdb"
//! rollups = [
//!     { seconds = 10, samples = 360 },
//!     { seconds = 3600, samples = 168 },
//!     { seconds = 86400, samples = 90 },
//! ]
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tally_query::QueryConfig;

use crate::error::{Result, TsdbError};
use crate::rollup::{RollupSpec, validate_rollup};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event store connection
    pub query: QueryConfig,

    /// Query layer settings
    pub tsdb: TsdbConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid TOML or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| TsdbError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_str(&contents)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.tsdb.validate()
    }
}

impl FromStr for Config {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// Query layer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TsdbConfig {
    /// Children kept per parent by ranking queries when no limit is given
    pub default_limit: usize,

    /// Referrer attached to every store query
    pub referrer: String,

    /// Rollups available for bucketing, finest first
    pub rollups: Vec<RollupSpec>,
}

impl Default for TsdbConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            referrer: "tsdb".to_string(),
            rollups: vec![
                RollupSpec::new(10, 360),
                RollupSpec::new(3600, 24 * 7),
                RollupSpec::new(86_400, 90),
            ],
        }
    }
}

impl TsdbConfig {
    /// Check limits and the rollup table
    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 {
            return Err(TsdbError::Config(
                "tsdb.default_limit must be greater than 0".to_string(),
            ));
        }
        if self.rollups.is_empty() {
            return Err(TsdbError::Config(
                "tsdb.rollups must list at least one rollup".to_string(),
            ));
        }

        for rollup in &self.rollups {
            validate_rollup(rollup.seconds)
                .map_err(|e| TsdbError::Config(format!("tsdb.rollups: {}", e)))?;
            if rollup.samples <= 0 {
                return Err(TsdbError::Config(format!(
                    "tsdb.rollups: rollup {}s must keep at least one sample",
                    rollup.seconds
                )));
            }
        }
        for pair in self.rollups.windows(2) {
            if pair[1].seconds <= pair[0].seconds {
                return Err(TsdbError::Config(format!(
                    "tsdb.rollups must be strictly ascending, {}s follows {}s",
                    pair[1].seconds, pair[0].seconds
                )));
            }
        }

        Ok(())
    }
}
