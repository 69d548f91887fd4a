//! Tally TSDB
//!
//! Time-series queries over recorded events, built on top of `tally-query`.
//!
//! # Overview
//!
//! Answers questions about entities (projects, issues, releases) over time,
//! bucketed at a chosen rollup:
//!
//! - **Counts**: events per entity per bucket
//! - **Distinct counts**: unique users per entity, per bucket, in total or
//!   across a set of entities
//! - **Frequencies**: which children (issues of a project, releases of an
//!   issue) occur most, as rankings, totals or per-bucket series
//!
//! Results always contain every requested id and every bucket of the range;
//! anything the store has no data for is zero.
//!
//! # Usage
//!
//! ```ignore
//! use tally_tsdb::{QueryOptions, Tsdb, TsdbModel};
//!
//! let tsdb = Tsdb::from_config(&Config::from_file("tally.toml")?)?;
//!
//! // Hourly event counts for two issues
//! let options = QueryOptions::new().with_rollup(3600);
//! let series = tsdb.range(TsdbModel::Group, &[1, 2], start, end, &options).await?;
//!
//! // Top five issues of a project
//! let top = tsdb
//!     .most_frequent(TsdbModel::FrequentIssuesByProject, &[7], start, end, Some(5), &options)
//!     .await?;
//! ```

pub mod builder;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod model;
pub mod rollup;
pub mod rows;
pub mod zerofill;

#[cfg(test)]
mod model_test;
#[cfg(test)]
mod zerofill_test;

// Re-exports for convenience
pub use builder::{
    Aggregate, AggregationRequest, BuiltQuery, EntityKeys, EnvironmentFilter, QueryBuilder,
    QueryPlan,
};
pub use config::{Config, TsdbConfig};
pub use directory::{EntityDirectory, SeenWindow, StaticDirectory};
pub use engine::{QueryOptions, Tsdb};
pub use error::{Result, TsdbError};
pub use model::{ENVIRONMENT_COLUMN, EVENTS_DATASET, ModelDescriptor, Operation, TsdbModel};
pub use rollup::{DAY, RollupSpec, bucket_start, buckets, optimal_rollup};
pub use rows::{RawRow, RowShape};
pub use zerofill::{FrequencySeries, FrequencyTotals, RankedList, ResultSeries};
