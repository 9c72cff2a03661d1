//! `manage_jira_filter`.

use std::sync::LazyLock;

use jira_types::schema::{
    EXPAND_ISSUE_COUNT,
    EXPAND_PERMISSIONS,
    FILTER_JQL,
    FILTER_NAME,
    TOOL_FILTER,
};
use jira_types::{EntityKind, FilterDraft, FilterPatch};
use serde_json::{Value, json};
use tracing::debug;

use super::entity_id;
use crate::compose::{SuggestionRules, deleted};
use crate::descriptor::{FieldFormat, OperationKind, OperationSpec, ToolDescriptor};
use crate::engine::{EntityTool, Outcome};
use crate::error::ToolResult;
use crate::expand::ExpansionFetch;
use crate::normalize::RenameTable;
use crate::upstream::{ListQuery, Page, RelatedRef, Upstream, UpstreamError};
use crate::validate::ValidatedRequest;

const FILTER_ID: &str = "filterId";

const RENAMES: RenameTable = RenameTable::new(&[
    ("filter_id", FILTER_ID),
    ("favorite", "favourite"),
]);

static DESCRIPTOR: LazyLock<ToolDescriptor> = LazyLock::new(|| {
    ToolDescriptor::build::<FilterOp>(
        TOOL_FILTER,
        EntityKind::Filter,
        FILTER_ID,
        RENAMES,
    )
});

static SUGGESTIONS: SuggestionRules = SuggestionRules {
    state_path: &[],
    rows: &[],
    default: &["execute_filter", "expand issue_count"],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Get,
    List,
    Create,
    Update,
    Delete,
    ExecuteFilter,
    ExecuteJql,
}

impl OperationKind for FilterOp {
    const ALL: &'static [Self] = &[
        Self::Get,
        Self::List,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::ExecuteFilter,
        Self::ExecuteJql,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ExecuteFilter => "execute_filter",
            Self::ExecuteJql => "execute_jql",
        }
    }

    fn spec(self) -> OperationSpec {
        match self {
            Self::Get => OperationSpec::single().required(FILTER_ID, FieldFormat::NumericId),
            Self::List => OperationSpec::list().optional("name", FieldFormat::NonEmptyText),
            Self::Create => OperationSpec::single()
                .mutating()
                .required("name", FieldFormat::NonEmptyText)
                .required("jql", FieldFormat::NonEmptyText)
                .optional("description", FieldFormat::Text)
                .optional("favourite", FieldFormat::Boolean),
            Self::Update => OperationSpec::single()
                .mutating()
                .required(FILTER_ID, FieldFormat::NumericId)
                .optional("name", FieldFormat::NonEmptyText)
                .optional("jql", FieldFormat::NonEmptyText)
                .optional("description", FieldFormat::Text)
                .optional("favourite", FieldFormat::Boolean)
                .at_least_one_of(&["name", "jql", "description", "favourite"]),
            Self::Delete => OperationSpec::ack()
                .mutating()
                .required(FILTER_ID, FieldFormat::NumericId),
            Self::ExecuteFilter => OperationSpec::list()
                .listing(EntityKind::Issue)
                .required(FILTER_ID, FieldFormat::NumericId),
            Self::ExecuteJql => OperationSpec::list()
                .listing(EntityKind::Issue)
                .required("jql", FieldFormat::NonEmptyText),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOperation {
    Get { id: u64 },
    List { name: Option<String>, page: Page },
    Create(FilterDraft),
    Update { id: u64, patch: FilterPatch },
    Delete { id: u64 },
    ExecuteFilter { id: u64, page: Page },
    ExecuteJql { jql: String, page: Page },
}

async fn search<U: Upstream>(upstream: &U, jql: String, page: Page) -> ToolResult<Outcome> {
    let kind = EntityKind::Issue;
    let query = ListQuery::new(page).with_filter(FILTER_JQL, jql);
    let listed = upstream.list(kind, &query).await?;
    Ok(Outcome::List {
        kind,
        items: listed.items,
        page,
        total: listed.total,
    })
}

pub struct FilterTool;

impl EntityTool for FilterTool {
    type Kind = FilterOp;
    type Operation = FilterOperation;

    fn descriptor() -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn suggestions() -> &'static SuggestionRules {
        &SUGGESTIONS
    }

    fn parse(kind: FilterOp, request: &ValidatedRequest) -> ToolResult<FilterOperation> {
        let id = || request.require_id(FILTER_ID);
        Ok(match kind {
            FilterOp::Get => FilterOperation::Get { id: id()? },
            FilterOp::List => FilterOperation::List {
                name: request.string("name"),
                page: request.page(),
            },
            FilterOp::Create => FilterOperation::Create(FilterDraft {
                name: request.require_string("name")?,
                jql: request.require_string("jql")?,
                description: request.string("description"),
                favourite: request.bool("favourite"),
            }),
            FilterOp::Update => FilterOperation::Update {
                id: id()?,
                patch: FilterPatch {
                    name: request.string("name"),
                    jql: request.string("jql"),
                    description: request.string("description"),
                    favourite: request.bool("favourite"),
                },
            },
            FilterOp::Delete => FilterOperation::Delete { id: id()? },
            FilterOp::ExecuteFilter => FilterOperation::ExecuteFilter {
                id: id()?,
                page: request.page(),
            },
            FilterOp::ExecuteJql => FilterOperation::ExecuteJql {
                jql: request.require_string("jql")?,
                page: request.page(),
            },
        })
    }

    async fn execute<U: Upstream>(upstream: &U, operation: FilterOperation) -> ToolResult<Outcome> {
        let kind = EntityKind::Filter;
        match operation {
            FilterOperation::Get { id } => {
                Ok(Outcome::Single(upstream.fetch(kind, &id.to_string()).await?))
            }
            FilterOperation::List { name, page } => {
                let query = ListQuery::new(page).with_optional_filter(FILTER_NAME, name);
                let listed = upstream.list(kind, &query).await?;
                Ok(Outcome::List {
                    kind,
                    items: listed.items,
                    page,
                    total: listed.total,
                })
            }
            FilterOperation::Create(draft) => {
                Ok(Outcome::Single(upstream.create(kind, json!(draft)).await?))
            }
            FilterOperation::Update { id, patch } => Ok(Outcome::Single(
                upstream.mutate(kind, &id.to_string(), json!(patch)).await?,
            )),
            FilterOperation::Delete { id } => {
                let id = id.to_string();
                upstream.delete(kind, &id).await?;
                Ok(Outcome::Ack(deleted(&id)))
            }
            FilterOperation::ExecuteFilter { id, page } => {
                let filter = upstream.fetch(kind, &id.to_string()).await?;
                let jql = filter
                    .get("jql")
                    .and_then(Value::as_str)
                    .ok_or_else(|| UpstreamError::Decode(format!("filter {id} carries no jql")))?
                    .to_string();
                debug!(filter = id, jql = %jql, "executing saved filter");
                search(upstream, jql, page).await
            }
            FilterOperation::ExecuteJql { jql, page } => search(upstream, jql, page).await,
        }
    }

    fn expansion(token: &'static str, entity: &Value) -> Option<ExpansionFetch> {
        match token {
            EXPAND_PERMISSIONS => entity_id(entity, "id").map(|id| {
                ExpansionFetch::Related(RelatedRef::new(EntityKind::Filter, id, token))
            }),
            EXPAND_ISSUE_COUNT => entity_id(entity, "jql").map(|jql| ExpansionFetch::Count {
                kind: EntityKind::Issue,
                query: ListQuery::new(Page::new(0, 1)).with_filter(FILTER_JQL, jql),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::engine::invoke;
    use crate::upstream::MemoryUpstream;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn execute_filter_runs_the_saved_query() {
        let upstream = MemoryUpstream::sample();
        let envelope = invoke::<FilterTool, _>(
            &upstream,
            args(json!({ "operation": "execute_filter", "filter_id": "10000" })),
        )
        .await
        .expect("saved filter executes");

        let data = envelope.data.as_array().expect("list data");
        assert_eq!(data.len(), 4);
        let counts = envelope
            .summary
            .status_counts
            .expect("issue pages carry status counts");
        assert_eq!(counts.get("To Do"), Some(&2));
    }

    #[tokio::test]
    async fn issue_count_uses_the_filter_query() {
        let upstream = MemoryUpstream::sample();
        let envelope = invoke::<FilterTool, _>(
            &upstream,
            args(json!({ "operation": "get", "filterId": 10001, "expand": "issue_count" })),
        )
        .await
        .expect("filter fetch succeeds");
        assert_eq!(envelope.data["issue_count"], json!(1));
    }

    #[test]
    fn favorite_spelling_is_an_alias() {
        let normalized = FilterTool::descriptor()
            .renames
            .normalize(args(json!({ "favorite": true })));
        assert_eq!(normalized.get("favourite"), Some(&json!(true)));
    }
}
