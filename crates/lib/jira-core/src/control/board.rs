//! `manage_jira_board`.

use std::sync::LazyLock;

use jira_types::schema::{
    EXPAND_CONFIGURATION,
    FILTER_NAME,
    FILTER_PROJECT_KEY,
    FILTER_TYPE,
    TOOL_BOARD,
};
use jira_types::{BoardDraft, BoardLocation, BoardType, EntityKind, value_at};
use serde_json::{Value, json};

use super::entity_id;
use crate::compose::{SuggestionRules, deleted};
use crate::descriptor::{FieldFormat, OperationKind, OperationSpec, ToolDescriptor};
use crate::engine::{EntityTool, Outcome};
use crate::error::{ToolError, ToolResult};
use crate::expand::ExpansionFetch;
use crate::normalize::RenameTable;
use crate::upstream::{ListQuery, Page, RelatedRef, Upstream};
use crate::validate::ValidatedRequest;

const BOARD_ID: &str = "boardId";

const RENAMES: RenameTable = RenameTable::new(&[
    ("board_id", BOARD_ID),
    ("project_key", "projectKey"),
    ("projectKeyOrId", "projectKey"),
    ("filter_id", "filterId"),
    ("board_type", "type"),
    ("boardType", "type"),
]);

static DESCRIPTOR: LazyLock<ToolDescriptor> = LazyLock::new(|| {
    ToolDescriptor::build::<BoardOp>(
        TOOL_BOARD,
        EntityKind::Board,
        BOARD_ID,
        RENAMES,
    )
});

static SUGGESTIONS: SuggestionRules = SuggestionRules {
    state_path: &["type"],
    rows: &[
        ("scrum", &["expand sprints", "create sprint (manage_jira_sprint)"]),
        ("kanban", &["expand issues", "get_configuration"]),
    ],
    default: &["get_configuration"],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardOp {
    Get,
    List,
    Create,
    Delete,
    GetConfiguration,
}

impl OperationKind for BoardOp {
    const ALL: &'static [Self] = &[
        Self::Get,
        Self::List,
        Self::Create,
        Self::Delete,
        Self::GetConfiguration,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::GetConfiguration => "get_configuration",
        }
    }

    fn spec(self) -> OperationSpec {
        match self {
            Self::Get => OperationSpec::single().required(BOARD_ID, FieldFormat::NumericId),
            Self::List => OperationSpec::list()
                .optional("projectKey", FieldFormat::ProjectKey)
                .optional("type", FieldFormat::OneOf(BoardType::NAMES))
                .optional("name", FieldFormat::NonEmptyText),
            Self::Create => OperationSpec::single()
                .mutating()
                .required("name", FieldFormat::NonEmptyText)
                .required("type", FieldFormat::OneOf(BoardType::CREATABLE))
                .required("filterId", FieldFormat::NumericId)
                .optional("projectKey", FieldFormat::ProjectKey),
            Self::Delete => OperationSpec::ack()
                .mutating()
                .required(BOARD_ID, FieldFormat::NumericId),
            Self::GetConfiguration => OperationSpec::single()
                .required(BOARD_ID, FieldFormat::NumericId)
                .with_default_expansions(&[EXPAND_CONFIGURATION]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardOperation {
    Get {
        id: u64,
    },
    List {
        project_key: Option<String>,
        board_type: Option<String>,
        name: Option<String>,
        page: Page,
    },
    Create(BoardDraft),
    Delete {
        id: u64,
    },
    GetConfiguration {
        id: u64,
    },
}

pub struct BoardTool;

impl EntityTool for BoardTool {
    type Kind = BoardOp;
    type Operation = BoardOperation;

    fn descriptor() -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn suggestions() -> &'static SuggestionRules {
        &SUGGESTIONS
    }

    fn parse(kind: BoardOp, request: &ValidatedRequest) -> ToolResult<BoardOperation> {
        let id = || request.require_id(BOARD_ID);
        Ok(match kind {
            BoardOp::Get => BoardOperation::Get { id: id()? },
            BoardOp::List => BoardOperation::List {
                project_key: request.string("projectKey"),
                board_type: request.string("type"),
                name: request.string("name"),
                page: request.page(),
            },
            BoardOp::Create => {
                let board_type = request
                    .str("type")
                    .and_then(|value| value.parse::<BoardType>().ok())
                    .ok_or_else(|| ToolError::InvalidFieldFormat {
                        operation: request.operation.to_string(),
                        field: "type".to_string(),
                        expected: FieldFormat::OneOf(BoardType::CREATABLE).example(),
                    })?;
                BoardOperation::Create(BoardDraft {
                    name: request.require_string("name")?,
                    board_type,
                    filter_id: request.require_id("filterId")?,
                    location: request.string("projectKey").map(BoardLocation::project),
                })
            }
            BoardOp::Delete => BoardOperation::Delete { id: id()? },
            BoardOp::GetConfiguration => BoardOperation::GetConfiguration { id: id()? },
        })
    }

    async fn execute<U: Upstream>(upstream: &U, operation: BoardOperation) -> ToolResult<Outcome> {
        let kind = EntityKind::Board;
        let outcome = match operation {
            BoardOperation::Get { id } | BoardOperation::GetConfiguration { id } => {
                Outcome::Single(upstream.fetch(kind, &id.to_string()).await?)
            }
            BoardOperation::List {
                project_key,
                board_type,
                name,
                page,
            } => {
                let query = ListQuery::new(page)
                    .with_optional_filter(FILTER_PROJECT_KEY, project_key)
                    .with_optional_filter(FILTER_TYPE, board_type)
                    .with_optional_filter(FILTER_NAME, name);
                let listed = upstream.list(kind, &query).await?;
                Outcome::List {
                    kind,
                    items: listed.items,
                    page,
                    total: listed.total,
                }
            }
            BoardOperation::Create(draft) => Outcome::Single(upstream.create(kind, json!(draft)).await?),
            BoardOperation::Delete { id } => {
                let id = id.to_string();
                upstream.delete(kind, &id).await?;
                Outcome::Ack(deleted(&id))
            }
        };
        Ok(outcome)
    }

    fn expansion(token: &'static str, entity: &Value) -> Option<ExpansionFetch> {
        let id = entity_id(entity, "id")?;
        Some(ExpansionFetch::Related(RelatedRef::new(
            EntityKind::Board,
            id,
            token,
        )))
    }

    fn related(entity: &Value) -> Option<Value> {
        value_at(entity, &["location", "projectKey"])
            .and_then(Value::as_str)
            .map(|project| json!({ "project": project }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_points_at_location_project() {
        let board = json!({ "id": 1, "location": { "projectKey": "PROJ" } });
        assert_eq!(BoardTool::related(&board), Some(json!({ "project": "PROJ" })));
        assert_eq!(BoardTool::related(&json!({ "id": 1 })), None);
    }

    #[test]
    fn simple_boards_cannot_be_created() {
        let spec = BoardOp::Create.spec();
        let rule = spec.rule("type").expect("type is declared");
        assert!(rule.format.check(&json!("scrum")));
        assert!(!rule.format.check(&json!("simple")));
    }
}
