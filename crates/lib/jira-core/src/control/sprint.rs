//! `manage_jira_sprint`.
//!
//! Sprints follow `future -> active -> closed`. `update` and `manage_issues`
//! read the sprint's state before touching it; a closed sprint is read-only.

use std::sync::LazyLock;

use jira_types::schema::{
    ACTION_ADD_ISSUES,
    ACTION_REMOVE_ISSUES,
    EXPAND_BOARD,
    EXPAND_ISSUES,
    EXPAND_REPORT,
    FILTER_BOARD_ID,
    FILTER_STATE,
    TOOL_SPRINT,
};
use jira_types::{EntityKind, SprintDraft, SprintPatch, SprintState};
use serde_json::{Value, json};

use super::entity_id;
use crate::compose::{SuggestionRules, deleted};
use crate::descriptor::{FieldFormat, OperationKind, OperationSpec, StateMachine, ToolDescriptor};
use crate::engine::{EntityTool, Outcome};
use crate::error::{ToolError, ToolResult};
use crate::expand::ExpansionFetch;
use crate::normalize::RenameTable;
use crate::upstream::{ListQuery, Page, RelatedRef, Upstream};
use crate::validate::ValidatedRequest;

const SPRINT_ID: &str = "sprintId";
const MUTABLE_FIELDS: &[&str] = &["name", "goal", "state", "startDate", "endDate"];

const RENAMES: RenameTable = RenameTable::new(&[
    ("sprint_id", SPRINT_ID),
    ("board_id", "boardId"),
    ("originBoardId", "boardId"),
    ("start_date", "startDate"),
    ("end_date", "endDate"),
    ("issues_to_add", "add"),
    ("issues_to_remove", "remove"),
]);

const LIFECYCLE: StateMachine = StateMachine {
    field: "state",
    transitions: &[("future", "active"), ("active", "closed")],
    terminal: &["closed"],
    guarded: &["update", "manage_issues"],
    target_field: Some("state"),
};

static DESCRIPTOR: LazyLock<ToolDescriptor> = LazyLock::new(|| {
    ToolDescriptor::build::<SprintOp>(
        TOOL_SPRINT,
        EntityKind::Sprint,
        SPRINT_ID,
        RENAMES,
    )
    .with_state_machine(LIFECYCLE)
});

static SUGGESTIONS: SuggestionRules = SuggestionRules {
    state_path: &["state"],
    rows: &[
        ("future", &["start", "manage_issues"]),
        ("active", &["complete", "manage_issues"]),
        ("closed", &["view report"]),
    ],
    default: &[],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprintOp {
    Get,
    List,
    Create,
    Update,
    Delete,
    ManageIssues,
}

impl OperationKind for SprintOp {
    const ALL: &'static [Self] = &[
        Self::Get,
        Self::List,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::ManageIssues,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ManageIssues => "manage_issues",
        }
    }

    fn spec(self) -> OperationSpec {
        let state = FieldFormat::OneOf(SprintState::NAMES);
        match self {
            Self::Get => OperationSpec::single().required(SPRINT_ID, FieldFormat::NumericId),
            Self::List => OperationSpec::list()
                .required("boardId", FieldFormat::NumericId)
                .optional("state", state),
            Self::Create => OperationSpec::single()
                .mutating()
                .required("boardId", FieldFormat::NumericId)
                .required("name", FieldFormat::NonEmptyText)
                .optional("goal", FieldFormat::Text)
                .optional("startDate", FieldFormat::DateTime)
                .optional("endDate", FieldFormat::DateTime)
                .ordered("startDate", "endDate"),
            Self::Update => OperationSpec::single()
                .mutating()
                .required(SPRINT_ID, FieldFormat::NumericId)
                .optional("name", FieldFormat::NonEmptyText)
                .optional("goal", FieldFormat::Text)
                .optional("state", state)
                .optional("startDate", FieldFormat::DateTime)
                .optional("endDate", FieldFormat::DateTime)
                .at_least_one_of(MUTABLE_FIELDS)
                .ordered("startDate", "endDate"),
            Self::Delete => OperationSpec::ack()
                .mutating()
                .required(SPRINT_ID, FieldFormat::NumericId),
            Self::ManageIssues => OperationSpec::single()
                .mutating()
                .required(SPRINT_ID, FieldFormat::NumericId)
                .optional("add", FieldFormat::IssueKeyList)
                .optional("remove", FieldFormat::IssueKeyList)
                .at_least_one_of(&["add", "remove"])
                .with_default_expansions(&[EXPAND_ISSUES]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SprintOperation {
    Get {
        id: u64,
    },
    List {
        board_id: u64,
        state: Option<SprintState>,
        page: Page,
    },
    Create(SprintDraft),
    Update {
        id: u64,
        patch: SprintPatch,
    },
    Delete {
        id: u64,
    },
    ManageIssues {
        id: u64,
        add: Vec<String>,
        remove: Vec<String>,
    },
}

fn parse_state(request: &ValidatedRequest) -> ToolResult<Option<SprintState>> {
    request
        .str("state")
        .map(str::parse::<SprintState>)
        .transpose()
        .map_err(|_| ToolError::InvalidFieldFormat {
            operation: request.operation.to_string(),
            field: "state".to_string(),
            expected: FieldFormat::OneOf(SprintState::NAMES).example(),
        })
}

pub struct SprintTool;

impl EntityTool for SprintTool {
    type Kind = SprintOp;
    type Operation = SprintOperation;

    fn descriptor() -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn suggestions() -> &'static SuggestionRules {
        &SUGGESTIONS
    }

    fn parse(kind: SprintOp, request: &ValidatedRequest) -> ToolResult<SprintOperation> {
        let id = || request.require_id(SPRINT_ID);
        Ok(match kind {
            SprintOp::Get => SprintOperation::Get { id: id()? },
            SprintOp::List => SprintOperation::List {
                board_id: request.require_id("boardId")?,
                state: parse_state(request)?,
                page: request.page(),
            },
            SprintOp::Create => SprintOperation::Create(SprintDraft {
                name: request.require_string("name")?,
                origin_board_id: request.require_id("boardId")?,
                goal: request.string("goal"),
                start_date: request.string("startDate"),
                end_date: request.string("endDate"),
            }),
            SprintOp::Update => SprintOperation::Update {
                id: id()?,
                patch: SprintPatch {
                    name: request.string("name"),
                    goal: request.string("goal"),
                    state: parse_state(request)?,
                    start_date: request.string("startDate"),
                    end_date: request.string("endDate"),
                },
            },
            SprintOp::Delete => SprintOperation::Delete { id: id()? },
            SprintOp::ManageIssues => SprintOperation::ManageIssues {
                id: id()?,
                add: request.string_list("add"),
                remove: request.string_list("remove"),
            },
        })
    }

    async fn execute<U: Upstream>(upstream: &U, operation: SprintOperation) -> ToolResult<Outcome> {
        let kind = EntityKind::Sprint;
        let outcome = match operation {
            SprintOperation::Get { id } => {
                Outcome::Single(upstream.fetch(kind, &id.to_string()).await?)
            }
            SprintOperation::List {
                board_id,
                state,
                page,
            } => {
                let query = ListQuery::new(page)
                    .with_filter(FILTER_BOARD_ID, board_id)
                    .with_optional_filter(FILTER_STATE, state.map(SprintState::as_str));
                let listed = upstream.list(kind, &query).await?;
                Outcome::List {
                    kind,
                    items: listed.items,
                    page,
                    total: listed.total,
                }
            }
            SprintOperation::Create(draft) => {
                Outcome::Single(upstream.create(kind, json!(draft)).await?)
            }
            SprintOperation::Update { id, patch } => {
                Outcome::Single(upstream.mutate(kind, &id.to_string(), json!(patch)).await?)
            }
            SprintOperation::Delete { id } => {
                let id = id.to_string();
                upstream.delete(kind, &id).await?;
                Outcome::Ack(deleted(&id))
            }
            SprintOperation::ManageIssues { id, add, remove } => {
                let id = id.to_string();
                if !add.is_empty() {
                    upstream
                        .perform_action(kind, &id, ACTION_ADD_ISSUES, json!({ "issues": add }))
                        .await?;
                }
                if !remove.is_empty() {
                    upstream
                        .perform_action(kind, &id, ACTION_REMOVE_ISSUES, json!({ "issues": remove }))
                        .await?;
                }
                Outcome::Single(upstream.fetch(kind, &id).await?)
            }
        };
        Ok(outcome)
    }

    fn expansion(token: &'static str, entity: &Value) -> Option<ExpansionFetch> {
        let id = entity_id(entity, "id")?;
        let board = entity_id(entity, "originBoardId");
        match token {
            EXPAND_ISSUES => Some(ExpansionFetch::Related(RelatedRef::new(
                EntityKind::Sprint,
                id,
                token,
            ))),
            EXPAND_REPORT => board.map(|board| {
                ExpansionFetch::Related(
                    RelatedRef::new(EntityKind::Sprint, id, token).with_scope(board),
                )
            }),
            EXPAND_BOARD => board.map(|board| ExpansionFetch::Entity {
                kind: EntityKind::Board,
                id: board,
            }),
            _ => None,
        }
    }

    fn related(entity: &Value) -> Option<Value> {
        entity
            .get("originBoardId")
            .filter(|board| !board.is_null())
            .map(|board| json!({ "board": board }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_needs_origin_board() {
        let with_board = json!({ "id": 12, "originBoardId": 1 });
        let Some(ExpansionFetch::Related(target)) = SprintTool::expansion(EXPAND_REPORT, &with_board)
        else {
            panic!("report resolves through a relation");
        };
        assert_eq!(target.scope.as_deref(), Some("1"));

        assert!(SprintTool::expansion(EXPAND_REPORT, &json!({ "id": 12 })).is_none());
    }

    #[test]
    fn board_expansion_fetches_the_board() {
        let sprint = json!({ "id": 12, "originBoardId": 3 });
        assert_eq!(
            SprintTool::expansion(EXPAND_BOARD, &sprint),
            Some(ExpansionFetch::Entity {
                kind: EntityKind::Board,
                id: "3".to_string()
            })
        );
        assert_eq!(SprintTool::related(&sprint), Some(json!({ "board": 3 })));
    }

    #[test]
    fn lifecycle_allows_only_forward_moves() {
        let allowed = [
            ("future", "future"),
            ("future", "active"),
            ("active", "active"),
            ("active", "closed"),
        ];
        for from in SprintState::NAMES {
            for to in SprintState::NAMES {
                assert_eq!(
                    LIFECYCLE.check(from, Some(to)).is_ok(),
                    allowed.contains(&(*from, *to)),
                    "{from} -> {to}"
                );
            }
        }
    }
}
