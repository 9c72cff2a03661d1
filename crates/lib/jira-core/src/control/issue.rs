//! `manage_jira_issue`.

use std::sync::LazyLock;

use jira_types::schema::{
    ACTION_COMMENT,
    ACTION_LINK,
    ACTION_TRANSITION,
    EXPAND_COMMENTS,
    TOOL_ISSUE,
};
use jira_types::{CustomFields, EntityKind, IssueDraft, IssuePatch, value_at};
use serde_json::{Map, Value, json};

use super::entity_id;
use crate::compose::{SuggestionRules, deleted};
use crate::descriptor::{FieldFormat, OperationKind, OperationSpec, ToolDescriptor};
use crate::engine::{EntityTool, Outcome};
use crate::error::ToolResult;
use crate::expand::ExpansionFetch;
use crate::normalize::RenameTable;
use crate::upstream::{RelatedRef, Upstream};
use crate::validate::ValidatedRequest;

const ISSUE_KEY: &str = "issueKey";
const MUTABLE_FIELDS: &[&str] = &[
    "summary",
    "description",
    "priority",
    "assignee",
    "labels",
    "parentKey",
    "customFields",
];

const RENAMES: RenameTable = RenameTable::new(&[
    ("issue_key", ISSUE_KEY),
    ("issueIdOrKey", ISSUE_KEY),
    ("project_key", "projectKey"),
    ("issue_type", "issueType"),
    ("transition_id", "transitionId"),
    ("linked_issue_key", "linkedIssueKey"),
    ("link_type", "linkType"),
    ("parent_key", "parentKey"),
    ("parent", "parentKey"),
    ("custom_fields", "customFields"),
]);

static DESCRIPTOR: LazyLock<ToolDescriptor> = LazyLock::new(|| {
    ToolDescriptor::build::<IssueOp>(
        TOOL_ISSUE,
        EntityKind::Issue,
        ISSUE_KEY,
        RENAMES,
    )
});

static SUGGESTIONS: SuggestionRules = SuggestionRules {
    state_path: &["fields", "status", "statusCategory", "key"],
    rows: &[
        ("new", &["transition to start work", "update assignee", "comment"]),
        ("indeterminate", &["transition to done", "comment", "link"]),
        ("done", &["comment", "link"]),
    ],
    default: &["comment", "update"],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueOp {
    Get,
    Create,
    Update,
    Delete,
    Transition,
    Comment,
    Link,
}

fn with_mutable_fields(spec: OperationSpec) -> OperationSpec {
    spec.optional("description", FieldFormat::Text)
        .optional("priority", FieldFormat::NonEmptyText)
        .optional("assignee", FieldFormat::Text)
        .optional("labels", FieldFormat::StringList)
        .optional("parentKey", FieldFormat::IssueKey)
        .optional("customFields", FieldFormat::Object)
}

impl OperationKind for IssueOp {
    const ALL: &'static [Self] = &[
        Self::Get,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Transition,
        Self::Comment,
        Self::Link,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Transition => "transition",
            Self::Comment => "comment",
            Self::Link => "link",
        }
    }

    fn spec(self) -> OperationSpec {
        match self {
            Self::Get => OperationSpec::single().required(ISSUE_KEY, FieldFormat::IssueKey),
            Self::Create => with_mutable_fields(
                OperationSpec::single()
                    .mutating()
                    .required("projectKey", FieldFormat::ProjectKey)
                    .required("summary", FieldFormat::NonEmptyText)
                    .required("issueType", FieldFormat::NonEmptyText),
            ),
            Self::Update => with_mutable_fields(
                OperationSpec::single()
                    .mutating()
                    .required(ISSUE_KEY, FieldFormat::IssueKey)
                    .optional("summary", FieldFormat::NonEmptyText),
            )
            .at_least_one_of(MUTABLE_FIELDS),
            Self::Delete => OperationSpec::ack()
                .mutating()
                .required(ISSUE_KEY, FieldFormat::IssueKey),
            Self::Transition => OperationSpec::single()
                .mutating()
                .required(ISSUE_KEY, FieldFormat::IssueKey)
                .required("transitionId", FieldFormat::NumericId)
                .optional("comment", FieldFormat::NonEmptyText),
            Self::Comment => OperationSpec::single()
                .mutating()
                .required(ISSUE_KEY, FieldFormat::IssueKey)
                .required("comment", FieldFormat::NonEmptyText)
                .with_default_expansions(&[EXPAND_COMMENTS]),
            Self::Link => OperationSpec::single()
                .mutating()
                .required(ISSUE_KEY, FieldFormat::IssueKey)
                .required("linkedIssueKey", FieldFormat::IssueKey)
                .required("linkType", FieldFormat::NonEmptyText)
                .optional("comment", FieldFormat::NonEmptyText),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IssueOperation {
    Get {
        key: String,
    },
    Create(IssueDraft),
    Update {
        key: String,
        patch: IssuePatch,
    },
    Delete {
        key: String,
    },
    Transition {
        key: String,
        transition_id: String,
        comment: Option<String>,
    },
    Comment {
        key: String,
        body: String,
    },
    Link {
        key: String,
        linked_key: String,
        link_type: String,
        comment: Option<String>,
    },
}

fn patch_from(request: &ValidatedRequest) -> IssuePatch {
    IssuePatch {
        summary: request.string("summary"),
        description: request.string("description"),
        priority: request.string("priority"),
        assignee: request.string("assignee"),
        labels: request.get("labels").map(|_| request.string_list("labels")),
        parent_key: request.string("parentKey"),
        custom_fields: request.object("customFields").map(CustomFields),
    }
}

pub struct IssueTool;

impl EntityTool for IssueTool {
    type Kind = IssueOp;
    type Operation = IssueOperation;

    fn descriptor() -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn suggestions() -> &'static SuggestionRules {
        &SUGGESTIONS
    }

    fn parse(kind: IssueOp, request: &ValidatedRequest) -> ToolResult<IssueOperation> {
        let key = || request.require_string(ISSUE_KEY);
        Ok(match kind {
            IssueOp::Get => IssueOperation::Get { key: key()? },
            IssueOp::Create => {
                let patch = patch_from(request);
                IssueOperation::Create(IssueDraft {
                    project_key: request.require_string("projectKey")?,
                    summary: request.require_string("summary")?,
                    issue_type: request.require_string("issueType")?,
                    description: patch.description,
                    priority: patch.priority,
                    assignee: patch.assignee,
                    labels: patch.labels.unwrap_or_default(),
                    parent_key: patch.parent_key,
                    custom_fields: patch.custom_fields.unwrap_or_default(),
                })
            }
            IssueOp::Update => IssueOperation::Update {
                key: key()?,
                patch: patch_from(request),
            },
            IssueOp::Delete => IssueOperation::Delete { key: key()? },
            IssueOp::Transition => IssueOperation::Transition {
                key: key()?,
                transition_id: request.require_id("transitionId")?.to_string(),
                comment: request.string("comment"),
            },
            IssueOp::Comment => IssueOperation::Comment {
                key: key()?,
                body: request.require_string("comment")?,
            },
            IssueOp::Link => IssueOperation::Link {
                key: key()?,
                linked_key: request.require_string("linkedIssueKey")?,
                link_type: request.require_string("linkType")?,
                comment: request.string("comment"),
            },
        })
    }

    async fn execute<U: Upstream>(upstream: &U, operation: IssueOperation) -> ToolResult<Outcome> {
        let kind = EntityKind::Issue;
        let outcome = match operation {
            IssueOperation::Get { key } => Outcome::Single(upstream.fetch(kind, &key).await?),
            IssueOperation::Create(draft) => {
                Outcome::Single(upstream.create(kind, draft.into_payload()).await?)
            }
            IssueOperation::Update { key, patch } => {
                Outcome::Single(upstream.mutate(kind, &key, patch.into_payload()).await?)
            }
            IssueOperation::Delete { key } => {
                upstream.delete(kind, &key).await?;
                Outcome::Ack(deleted(&key))
            }
            IssueOperation::Transition {
                key,
                transition_id,
                comment,
            } => {
                let mut payload = json!({ "transition": { "id": transition_id } });
                if let Some(comment) = comment {
                    payload["comment"] = Value::String(comment);
                }
                upstream
                    .perform_action(kind, &key, ACTION_TRANSITION, payload)
                    .await?;
                Outcome::Single(upstream.fetch(kind, &key).await?)
            }
            IssueOperation::Comment { key, body } => {
                upstream
                    .perform_action(kind, &key, ACTION_COMMENT, json!({ "body": body }))
                    .await?;
                Outcome::Single(upstream.fetch(kind, &key).await?)
            }
            IssueOperation::Link {
                key,
                linked_key,
                link_type,
                comment,
            } => {
                let mut payload = json!({
                    "type": { "name": link_type },
                    "inwardIssue": { "key": key },
                    "outwardIssue": { "key": linked_key },
                });
                if let Some(comment) = comment {
                    payload["comment"] = json!({ "body": comment });
                }
                upstream.perform_action(kind, &key, ACTION_LINK, payload).await?;
                Outcome::Single(upstream.fetch(kind, &key).await?)
            }
        };
        Ok(outcome)
    }

    fn expansion(token: &'static str, entity: &Value) -> Option<ExpansionFetch> {
        let key = entity_id(entity, "key")?;
        Some(ExpansionFetch::Related(RelatedRef::new(
            EntityKind::Issue,
            key,
            token,
        )))
    }

    fn related(entity: &Value) -> Option<Value> {
        let key_at = |value: &Value, path: &[&str]| {
            value_at(value, path).and_then(Value::as_str).map(str::to_string)
        };
        let mut related = Map::new();
        if let Some(project) = key_at(entity, &["fields", "project", "key"]) {
            related.insert("project".to_string(), json!(project));
        }
        if let Some(parent) = key_at(entity, &["fields", "parent", "key"]) {
            related.insert("parent".to_string(), json!(parent));
        }
        let linked: Vec<String> = value_at(entity, &["fields", "issuelinks"])
            .and_then(Value::as_array)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| {
                        key_at(link, &["outwardIssue", "key"])
                            .or_else(|| key_at(link, &["inwardIssue", "key"]))
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !linked.is_empty() {
            related.insert("linked_issues".to_string(), json!(linked));
        }
        let subtasks: Vec<String> = value_at(entity, &["fields", "subtasks"])
            .and_then(Value::as_array)
            .map(|tasks| tasks.iter().filter_map(|task| key_at(task, &["key"])).collect())
            .unwrap_or_default();
        if !subtasks.is_empty() {
            related.insert("subtasks".to_string(), json!(subtasks));
        }
        (!related.is_empty()).then_some(Value::Object(related))
    }
}

#[cfg(test)]
mod tests {
    use jira_types::schema::ISSUE_EXPANSIONS;

    use super::*;

    #[test]
    fn related_collects_cross_references() {
        let issue = json!({
            "key": "PROJ-2",
            "fields": {
                "project": { "key": "PROJ" },
                "parent": { "key": "PROJ-1" },
                "issuelinks": [{ "outwardIssue": { "key": "PROJ-9" } }],
                "subtasks": [{ "key": "PROJ-3" }]
            }
        });
        let related = IssueTool::related(&issue).expect("issue has references");
        assert_eq!(related["project"], "PROJ");
        assert_eq!(related["parent"], "PROJ-1");
        assert_eq!(related["linked_issues"], json!(["PROJ-9"]));
        assert_eq!(related["subtasks"], json!(["PROJ-3"]));
    }

    #[test]
    fn bare_issue_has_no_related_section() {
        assert_eq!(IssueTool::related(&json!({ "key": "PROJ-1", "fields": {} })), None);
    }

    #[test]
    fn every_token_has_a_fetch() {
        let issue = json!({ "key": "PROJ-1" });
        for token in ISSUE_EXPANSIONS {
            assert!(IssueTool::expansion(*token, &issue).is_some(), "{token} has no fetch");
        }
    }
}
