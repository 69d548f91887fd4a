//! Time-series models
//!
//! A model names what is being measured. Each model this layer serves has a
//! [`ModelDescriptor`] saying where its data lives and how it aggregates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TsdbError};

/// Dataset holding recorded events
pub const EVENTS_DATASET: &str = "events";

/// Column holding the environment name of an event
pub const ENVIRONMENT_COLUMN: &str = "environment";

/// Every known time-series model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TsdbModel {
    /// Events per project
    Project,
    /// Events per issue
    Group,
    /// Events per release
    Release,
    /// Distinct users per issue
    UsersAffectedByGroup,
    /// Distinct users per project
    UsersAffectedByProject,
    /// Most frequent issues within a project
    FrequentIssuesByProject,
    /// Most frequent releases within an issue
    FrequentReleasesByGroup,
    /// Most frequent environments within an issue
    FrequentEnvironmentsByGroup,

    // Outcome counters, kept by the counter store rather than the event store
    /// Events received per project
    ProjectTotalReceived,
    /// Events rejected per project
    ProjectTotalRejected,
    /// Events blacklisted per project
    ProjectTotalBlacklisted,
    /// Events received per organization
    OrganizationTotalReceived,
    /// Events rejected per organization
    OrganizationTotalRejected,
    /// Events blacklisted per organization
    OrganizationTotalBlacklisted,
    /// Events received per key
    KeyTotalReceived,
    /// Events rejected per key
    KeyTotalRejected,
    /// Events blacklisted per key
    KeyTotalBlacklisted,
}

impl TsdbModel {
    /// All models, in declaration order
    pub const ALL: [TsdbModel; 17] = [
        Self::Project,
        Self::Group,
        Self::Release,
        Self::UsersAffectedByGroup,
        Self::UsersAffectedByProject,
        Self::FrequentIssuesByProject,
        Self::FrequentReleasesByGroup,
        Self::FrequentEnvironmentsByGroup,
        Self::ProjectTotalReceived,
        Self::ProjectTotalRejected,
        Self::ProjectTotalBlacklisted,
        Self::OrganizationTotalReceived,
        Self::OrganizationTotalRejected,
        Self::OrganizationTotalBlacklisted,
        Self::KeyTotalReceived,
        Self::KeyTotalRejected,
        Self::KeyTotalBlacklisted,
    ];

    /// Snake-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Group => "group",
            Self::Release => "release",
            Self::UsersAffectedByGroup => "users_affected_by_group",
            Self::UsersAffectedByProject => "users_affected_by_project",
            Self::FrequentIssuesByProject => "frequent_issues_by_project",
            Self::FrequentReleasesByGroup => "frequent_releases_by_group",
            Self::FrequentEnvironmentsByGroup => "frequent_environments_by_group",
            Self::ProjectTotalReceived => "project_total_received",
            Self::ProjectTotalRejected => "project_total_rejected",
            Self::ProjectTotalBlacklisted => "project_total_blacklisted",
            Self::OrganizationTotalReceived => "organization_total_received",
            Self::OrganizationTotalRejected => "organization_total_rejected",
            Self::OrganizationTotalBlacklisted => "organization_total_blacklisted",
            Self::KeyTotalReceived => "key_total_received",
            Self::KeyTotalRejected => "key_total_rejected",
            Self::KeyTotalBlacklisted => "key_total_blacklisted",
        }
    }

    /// Where this model's data lives and how it aggregates
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` for models not served from the event store.
    pub fn describe(self) -> Result<ModelDescriptor> {
        let (entity_column, operation) = match self {
            Self::Project => ("project_id", Operation::Count),
            Self::Group => ("group_id", Operation::Count),
            Self::Release => ("release_id", Operation::Count),
            Self::UsersAffectedByGroup => ("group_id", Operation::DistinctCount { column: "user_id" }),
            Self::UsersAffectedByProject => {
                ("project_id", Operation::DistinctCount { column: "user_id" })
            }
            Self::FrequentIssuesByProject => {
                ("project_id", Operation::TopK { child_column: "group_id" })
            }
            Self::FrequentReleasesByGroup => {
                ("group_id", Operation::TopK { child_column: "release_id" })
            }
            Self::FrequentEnvironmentsByGroup => {
                ("group_id", Operation::TopK { child_column: "environment_id" })
            }
            other => return Err(TsdbError::UnknownModel(other.as_str().to_string())),
        };

        Ok(ModelDescriptor {
            model: self,
            dataset: EVENTS_DATASET,
            entity_column,
            operation,
        })
    }
}

impl fmt::Display for TsdbModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TsdbModel {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| TsdbError::UnknownModel(s.to_string()))
    }
}

/// How a model aggregates events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Count events
    Count,
    /// Count distinct values of a column
    DistinctCount {
        /// Column whose distinct values are counted
        column: &'static str,
    },
    /// Count events per child entity, for ranking
    TopK {
        /// Column holding the child entity id
        child_column: &'static str,
    },
}

/// Storage location and aggregation of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// The described model
    pub model: TsdbModel,
    /// Dataset to read
    pub dataset: &'static str,
    /// Column holding the entity id
    pub entity_column: &'static str,
    /// Aggregation
    pub operation: Operation,
}

impl ModelDescriptor {
    /// Child column, for ranking models
    pub fn child_column(&self) -> Option<&'static str> {
        match self.operation {
            Operation::TopK { child_column } => Some(child_column),
            _ => None,
        }
    }

    /// Column counted distinctly, for distinct-count models
    pub fn distinct_column(&self) -> Option<&'static str> {
        match self.operation {
            Operation::DistinctCount { column } => Some(column),
            _ => None,
        }
    }
}
