//! `manage_jira_project`.
//!
//! Project administration (`create`, `update`, `delete`) is declared and
//! validated but not implemented.

use std::sync::LazyLock;

use jira_types::schema::{
    EXPAND_BOARDS,
    EXPAND_COMPONENTS,
    EXPAND_RECENT_ISSUES,
    EXPAND_VERSIONS,
    FILTER_JQL,
    FILTER_PROJECT_KEY,
    FILTER_QUERY,
    TOOL_PROJECT,
    project_recent_issues_jql,
};
use jira_types::EntityKind;
use serde_json::Value;

use super::entity_id;
use crate::compose::SuggestionRules;
use crate::descriptor::{FieldFormat, OperationKind, OperationSpec, ToolDescriptor};
use crate::engine::{EntityTool, Outcome};
use crate::error::{ToolError, ToolResult};
use crate::expand::ExpansionFetch;
use crate::normalize::RenameTable;
use crate::upstream::{ListQuery, Page, RelatedRef, Upstream};
use crate::validate::ValidatedRequest;

const PROJECT_KEY: &str = "projectKey";
const PROJECT_TYPES: &[&str] = &["software", "business", "service_desk"];
const RECENT_ISSUES_PAGE: Page = Page::new(0, 5);

const RENAMES: RenameTable = RenameTable::new(&[
    ("project_key", PROJECT_KEY),
    ("projectIdOrKey", PROJECT_KEY),
    ("project_type_key", "projectTypeKey"),
    ("lead_account_id", "leadAccountId"),
]);

static DESCRIPTOR: LazyLock<ToolDescriptor> = LazyLock::new(|| {
    ToolDescriptor::build::<ProjectOp>(
        TOOL_PROJECT,
        EntityKind::Project,
        PROJECT_KEY,
        RENAMES,
    )
});

static SUGGESTIONS: SuggestionRules = SuggestionRules {
    state_path: &["projectTypeKey"],
    rows: &[],
    default: &["expand boards", "expand recent_issues"],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOp {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl OperationKind for ProjectOp {
    const ALL: &'static [Self] = &[
        Self::Get,
        Self::List,
        Self::Create,
        Self::Update,
        Self::Delete,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn spec(self) -> OperationSpec {
        match self {
            Self::Get => OperationSpec::single().required(PROJECT_KEY, FieldFormat::ProjectKey),
            Self::List => OperationSpec::list().optional("query", FieldFormat::Text),
            Self::Create => OperationSpec::single()
                .mutating()
                .required(PROJECT_KEY, FieldFormat::ProjectKey)
                .required("name", FieldFormat::NonEmptyText)
                .required("projectTypeKey", FieldFormat::OneOf(PROJECT_TYPES))
                .required("leadAccountId", FieldFormat::NonEmptyText)
                .optional("description", FieldFormat::Text),
            Self::Update => OperationSpec::single()
                .mutating()
                .required(PROJECT_KEY, FieldFormat::ProjectKey)
                .optional("name", FieldFormat::NonEmptyText)
                .optional("description", FieldFormat::Text)
                .optional("leadAccountId", FieldFormat::NonEmptyText)
                .at_least_one_of(&["name", "description", "leadAccountId"]),
            Self::Delete => OperationSpec::ack()
                .mutating()
                .required(PROJECT_KEY, FieldFormat::ProjectKey),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectOperation {
    Get { key: String },
    List { query: Option<String>, page: Page },
    /// Declared but unimplemented administration operation.
    Unimplemented(ProjectOp),
}

pub struct ProjectTool;

impl EntityTool for ProjectTool {
    type Kind = ProjectOp;
    type Operation = ProjectOperation;

    fn descriptor() -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn suggestions() -> &'static SuggestionRules {
        &SUGGESTIONS
    }

    fn parse(kind: ProjectOp, request: &ValidatedRequest) -> ToolResult<ProjectOperation> {
        Ok(match kind {
            ProjectOp::Get => ProjectOperation::Get {
                key: request.require_string(PROJECT_KEY)?,
            },
            ProjectOp::List => ProjectOperation::List {
                query: request.string("query"),
                page: request.page(),
            },
            ProjectOp::Create | ProjectOp::Update | ProjectOp::Delete => {
                ProjectOperation::Unimplemented(kind)
            }
        })
    }

    async fn execute<U: Upstream>(upstream: &U, operation: ProjectOperation) -> ToolResult<Outcome> {
        let kind = EntityKind::Project;
        match operation {
            ProjectOperation::Get { key } => Ok(Outcome::Single(upstream.fetch(kind, &key).await?)),
            ProjectOperation::List { query, page } => {
                let filter = ListQuery::new(page).with_optional_filter(FILTER_QUERY, query);
                let listed = upstream.list(kind, &filter).await?;
                Ok(Outcome::List {
                    kind,
                    items: listed.items,
                    page,
                    total: listed.total,
                })
            }
            ProjectOperation::Unimplemented(op) => Err(ToolError::NotYetImplemented {
                tool: TOOL_PROJECT,
                operation: op.name().to_string(),
            }),
        }
    }

    fn expansion(token: &'static str, entity: &Value) -> Option<ExpansionFetch> {
        let key = entity_id(entity, "key")?;
        match token {
            EXPAND_BOARDS => Some(ExpansionFetch::List {
                kind: EntityKind::Board,
                query: ListQuery::new(Page::default()).with_filter(FILTER_PROJECT_KEY, key),
            }),
            EXPAND_RECENT_ISSUES => Some(ExpansionFetch::List {
                kind: EntityKind::Issue,
                query: ListQuery::new(RECENT_ISSUES_PAGE)
                    .with_filter(FILTER_JQL, project_recent_issues_jql(&key)),
            }),
            EXPAND_COMPONENTS | EXPAND_VERSIONS => Some(ExpansionFetch::Related(RelatedRef::new(
                EntityKind::Project,
                key,
                token,
            ))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::engine::invoke;
    use crate::error::ErrorKind;
    use crate::upstream::MemoryUpstream;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn administration_is_validated_then_refused() {
        let upstream = MemoryUpstream::sample();
        let missing = invoke::<ProjectTool, _>(
            &upstream,
            args(json!({ "operation": "create", "projectKey": "NEW" })),
        )
        .await
        .expect_err("create without a name is invalid");
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredField);

        let refused = invoke::<ProjectTool, _>(
            &upstream,
            args(json!({
                "operation": "create",
                "projectKey": "NEW",
                "name": "New project",
                "projectTypeKey": "software",
                "leadAccountId": "abc123"
            })),
        )
        .await
        .expect_err("project creation is not available");
        assert_eq!(refused.kind(), ErrorKind::NotYetImplemented);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn boards_and_recent_issues_expand_by_project_key() {
        let upstream = MemoryUpstream::sample();
        let envelope = invoke::<ProjectTool, _>(
            &upstream,
            args(json!({ "operation": "get", "project_key": "PROJ",
                         "expand": ["boards", "recent_issues"] })),
        )
        .await
        .expect("project fetch succeeds");

        assert_eq!(envelope.data["boards"]["total"], json!(2));
        let recent = envelope.data["recent_issues"]["items"]
            .as_array()
            .expect("recent issues listed");
        assert_eq!(recent.len(), 4);
    }
}
