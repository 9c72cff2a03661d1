use std::{error::Error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema;

/// Entity types exposed through the multi-operation tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Issue,
    Board,
    Sprint,
    Project,
    Filter,
}

impl EntityKind {
    pub const ALL: &'static [Self] = &[
        Self::Issue,
        Self::Board,
        Self::Sprint,
        Self::Project,
        Self::Filter,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Board => "board",
            Self::Sprint => "sprint",
            Self::Project => "project",
            Self::Filter => "filter",
        }
    }

    /// Path to the status-like field used when aggregating lists of this kind.
    #[must_use]
    pub const fn status_path(self) -> &'static [&'static str] {
        match self {
            Self::Issue => &["fields", "status", "name"],
            Self::Sprint => &["state"],
            Self::Board => &["type"],
            Self::Project => &["projectTypeKey"],
            Self::Filter => &[],
        }
    }

    /// Expansion vocabulary of this kind.
    #[must_use]
    pub const fn expansions(self) -> &'static [&'static str] {
        match self {
            Self::Issue => schema::ISSUE_EXPANSIONS,
            Self::Sprint => schema::SPRINT_EXPANSIONS,
            Self::Board => schema::BOARD_EXPANSIONS,
            Self::Project => schema::PROJECT_EXPANSIONS,
            Self::Filter => schema::FILTER_EXPANSIONS,
        }
    }

    /// Field carrying the upstream identifier of an entity of this kind.
    #[must_use]
    pub const fn id_field(self) -> &'static str {
        match self {
            Self::Issue | Self::Project => "key",
            Self::Board | Self::Sprint | Self::Filter => "id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a lifecycle or type value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl Error for UnknownVariant {}

/// Sprint lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintState {
    Future,
    Active,
    Closed,
}

impl SprintState {
    pub const NAMES: &'static [&'static str] = &["future", "active", "closed"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Future => "future",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for SprintState {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "future" => Ok(Self::Future),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(UnknownVariant {
                kind: "sprint state",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SprintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agile board flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardType {
    Scrum,
    Kanban,
    Simple,
}

impl BoardType {
    pub const NAMES: &'static [&'static str] = &["scrum", "kanban", "simple"];
    pub const CREATABLE: &'static [&'static str] = &["scrum", "kanban"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scrum => "scrum",
            Self::Kanban => "kanban",
            Self::Simple => "simple",
        }
    }
}

impl FromStr for BoardType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scrum" => Ok(Self::Scrum),
            "kanban" => Ok(Self::Kanban),
            "simple" => Ok(Self::Simple),
            other => Err(UnknownVariant {
                kind: "board type",
                value: other.to_string(),
            }),
        }
    }
}

/// Caller-supplied custom field values, passed through uninterpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomFields(pub Map<String, Value>);

impl CustomFields {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fields for creating an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDraft {
    pub project_key: String,
    pub summary: String,
    pub issue_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    #[serde(default, skip_serializing_if = "CustomFields::is_empty")]
    pub custom_fields: CustomFields,
}

impl IssueDraft {
    /// Builds the upstream `{"fields": {...}}` payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        let mut fields = Map::new();
        fields.insert(
            "project".to_string(),
            serde_json::json!({ "key": self.project_key }),
        );
        fields.insert("summary".to_string(), Value::String(self.summary));
        fields.insert(
            "issuetype".to_string(),
            serde_json::json!({ "name": self.issue_type }),
        );
        let patch = IssuePatch {
            summary: None,
            description: self.description,
            priority: self.priority,
            assignee: self.assignee,
            labels: (!self.labels.is_empty()).then_some(self.labels),
            parent_key: self.parent_key,
            custom_fields: (!self.custom_fields.is_empty()).then_some(self.custom_fields),
        };
        patch.write_fields(&mut fields);
        serde_json::json!({ "fields": fields })
    }
}

/// Partial update of an issue. `None` leaves the upstream value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFields>,
}

impl IssuePatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
            && self.labels.is_none()
            && self.parent_key.is_none()
            && self.custom_fields.is_none()
    }

    /// Builds the upstream `{"fields": {...}}` payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        let mut fields = Map::new();
        self.write_fields(&mut fields);
        serde_json::json!({ "fields": fields })
    }

    fn write_fields(self, fields: &mut Map<String, Value>) {
        if let Some(summary) = self.summary {
            fields.insert("summary".to_string(), Value::String(summary));
        }
        if let Some(description) = self.description {
            fields.insert("description".to_string(), Value::String(description));
        }
        if let Some(priority) = self.priority {
            fields.insert("priority".to_string(), serde_json::json!({ "name": priority }));
        }
        if let Some(assignee) = self.assignee {
            fields.insert(
                "assignee".to_string(),
                serde_json::json!({ "accountId": assignee }),
            );
        }
        if let Some(labels) = self.labels {
            fields.insert("labels".to_string(), serde_json::json!(labels));
        }
        if let Some(parent_key) = self.parent_key {
            fields.insert("parent".to_string(), serde_json::json!({ "key": parent_key }));
        }
        if let Some(custom) = self.custom_fields {
            for (key, value) in custom.0 {
                fields.insert(key, value);
            }
        }
    }
}

/// Fields for creating a sprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintDraft {
    pub name: String,
    pub origin_board_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// Partial update of a sprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SprintState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// Fields for creating a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub board_type: BoardType,
    pub filter_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<BoardLocation>,
}

/// Project a board is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardLocation {
    #[serde(rename = "type")]
    pub location_type: String,
    pub project_key_or_id: String,
}

impl BoardLocation {
    #[must_use]
    pub fn project(project_key: impl Into<String>) -> Self {
        Self {
            location_type: "project".to_string(),
            project_key_or_id: project_key.into(),
        }
    }
}

/// Fields for creating a saved filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDraft {
    pub name: String,
    pub jql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favourite: Option<bool>,
}

/// Partial update of a saved filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favourite: Option<bool>,
}

/// Walks `path` through nested objects.
#[must_use]
pub fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.iter().try_fold(value, |current, key| current.get(key))
}

/// Renders a scalar identifier (string or number) as a string.
#[must_use]
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sprint_state_names_round_trip() {
        for name in SprintState::NAMES {
            let state: SprintState = name.parse().expect("declared state parses");
            assert_eq!(state.as_str(), *name);
        }
        let err = "open".parse::<SprintState>().expect_err("not a sprint state");
        assert_eq!(err.to_string(), "unknown sprint state: open");
    }

    #[test]
    fn issue_draft_payload_nests_fields() {
        let draft = IssueDraft {
            project_key: "PROJ".to_string(),
            summary: "Broken login".to_string(),
            issue_type: "Bug".to_string(),
            description: None,
            priority: Some("High".to_string()),
            assignee: None,
            labels: vec!["auth".to_string()],
            parent_key: None,
            custom_fields: CustomFields(
                [("customfield_10010".to_string(), json!(5))].into_iter().collect(),
            ),
        };

        let payload = draft.into_payload();

        assert_eq!(payload["fields"]["project"]["key"], "PROJ");
        assert_eq!(payload["fields"]["issuetype"]["name"], "Bug");
        assert_eq!(payload["fields"]["priority"]["name"], "High");
        assert_eq!(payload["fields"]["labels"], json!(["auth"]));
        assert_eq!(payload["fields"]["customfield_10010"], 5);
        assert!(payload["fields"].get("description").is_none());
    }

    #[test]
    fn sprint_patch_serializes_only_present_fields() {
        let patch = SprintPatch {
            state: Some(SprintState::Active),
            ..SprintPatch::default()
        };
        assert_eq!(serde_json::to_value(patch).unwrap(), json!({ "state": "active" }));
    }

    #[test]
    fn value_at_walks_nested_objects() {
        let issue = json!({ "fields": { "status": { "name": "In Progress" } } });
        assert_eq!(
            value_at(&issue, EntityKind::Issue.status_path()),
            Some(&json!("In Progress"))
        );
        assert_eq!(value_at(&issue, EntityKind::Filter.status_path()), None);
    }
}
