//! Tests for the model registry

use std::str::FromStr;

use crate::error::TsdbError;
use crate::model::{EVENTS_DATASET, Operation, TsdbModel};

#[test]
fn test_describe_count_models() {
    let d = TsdbModel::Project.describe().unwrap();
    assert_eq!(d.dataset, EVENTS_DATASET);
    assert_eq!(d.entity_column, "project_id");
    assert_eq!(d.operation, Operation::Count);

    assert_eq!(TsdbModel::Group.describe().unwrap().entity_column, "group_id");
    assert_eq!(TsdbModel::Release.describe().unwrap().entity_column, "release_id");
}

#[test]
fn test_describe_distinct_models() {
    let d = TsdbModel::UsersAffectedByGroup.describe().unwrap();
    assert_eq!(d.entity_column, "group_id");
    assert_eq!(d.distinct_column(), Some("user_id"));
    assert_eq!(d.child_column(), None);

    let d = TsdbModel::UsersAffectedByProject.describe().unwrap();
    assert_eq!(d.entity_column, "project_id");
    assert_eq!(d.distinct_column(), Some("user_id"));
}

#[test]
fn test_describe_ranking_models() {
    let d = TsdbModel::FrequentIssuesByProject.describe().unwrap();
    assert_eq!(d.entity_column, "project_id");
    assert_eq!(d.child_column(), Some("group_id"));

    let d = TsdbModel::FrequentReleasesByGroup.describe().unwrap();
    assert_eq!(d.entity_column, "group_id");
    assert_eq!(d.child_column(), Some("release_id"));

    let d = TsdbModel::FrequentEnvironmentsByGroup.describe().unwrap();
    assert_eq!(d.child_column(), Some("environment_id"));
}

#[test]
fn test_counter_models_are_unknown() {
    for model in [
        TsdbModel::ProjectTotalReceived,
        TsdbModel::OrganizationTotalRejected,
        TsdbModel::KeyTotalBlacklisted,
    ] {
        let err = model.describe().unwrap_err();
        assert!(matches!(err, TsdbError::UnknownModel(ref name) if name == model.as_str()));
    }
}

#[test]
fn test_parse_model_names() {
    for model in TsdbModel::ALL {
        assert_eq!(TsdbModel::from_str(model.as_str()).unwrap(), model);
        assert_eq!(model.to_string(), model.as_str());
    }

    let err = TsdbModel::from_str("issues").unwrap_err();
    assert!(matches!(err, TsdbError::UnknownModel(_)));
}

#[test]
fn test_serde_names_match() {
    let json = serde_json::to_string(&TsdbModel::FrequentIssuesByProject).unwrap();
    assert_eq!(json, "\"frequent_issues_by_project\"");
}
