//! Entity directory
//!
//! Lookups owned by the entity registry: environment names and the window in
//! which an entity has been seen.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::TsdbModel;

/// First and last time an entity was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeenWindow {
    /// First event
    pub first_seen: DateTime<Utc>,
    /// Last event
    pub last_seen: DateTime<Utc>,
}

impl SeenWindow {
    /// Create a seen window
    pub fn new(first_seen: DateTime<Utc>, last_seen: DateTime<Utc>) -> Self {
        Self {
            first_seen,
            last_seen,
        }
    }
}

/// Registry lookups needed to build queries
pub trait EntityDirectory: Send + Sync {
    /// Name of an environment, `None` if the id is unknown
    ///
    /// The empty name is the default environment.
    fn environment_name(&self, environment_id: u64) -> Option<String>;

    /// Seen window of an entity, if known
    fn seen_window(&self, _model: TsdbModel, _id: u64) -> Option<SeenWindow> {
        None
    }
}

/// Directory backed by in-memory maps
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    environments: HashMap<u64, String>,
    seen: HashMap<(TsdbModel, u64), SeenWindow>,
}

impl StaticDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an environment
    pub fn with_environment(mut self, id: u64, name: impl Into<String>) -> Self {
        self.environments.insert(id, name.into());
        self
    }

    /// Register the seen window of an entity
    pub fn with_seen_window(
        mut self,
        model: TsdbModel,
        id: u64,
        first_seen: DateTime<Utc>,
        last_seen: DateTime<Utc>,
    ) -> Self {
        self.seen
            .insert((model, id), SeenWindow::new(first_seen, last_seen));
        self
    }
}

impl EntityDirectory for StaticDirectory {
    fn environment_name(&self, environment_id: u64) -> Option<String> {
        self.environments.get(&environment_id).cloned()
    }

    fn seen_window(&self, model: TsdbModel, id: u64) -> Option<SeenWindow> {
        self.seen.get(&(model, id)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_static_directory_lookups() {
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let directory = StaticDirectory::new()
            .with_environment(1, "production")
            .with_environment(2, "")
            .with_seen_window(TsdbModel::Group, 7, first, last);

        assert_eq!(directory.environment_name(1).as_deref(), Some("production"));
        assert_eq!(directory.environment_name(2).as_deref(), Some(""));
        assert_eq!(directory.environment_name(3), None);

        assert_eq!(
            directory.seen_window(TsdbModel::Group, 7),
            Some(SeenWindow::new(first, last))
        );
        assert_eq!(directory.seen_window(TsdbModel::Project, 7), None);
    }
}
