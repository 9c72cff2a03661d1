//! Best-effort expansion resolution.
//!
//! Each requested token maps to exactly one secondary upstream call. Calls
//! run concurrently; a failing call is logged and its token omitted, the
//! primary entity is always returned.

use futures::future::join_all;
use jira_types::EntityKind;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::upstream::{ListQuery, RelatedRef, Upstream, UpstreamResult};

/// Secondary fetch backing one expansion token.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpansionFetch {
    /// Another entity, attached as-is.
    Entity { kind: EntityKind, id: String },
    /// A relation of the primary entity.
    Related(RelatedRef),
    /// A list call, attached as `{items, total}`.
    List { kind: EntityKind, query: ListQuery },
    /// A list call, attached as its total only.
    Count { kind: EntityKind, query: ListQuery },
}

impl ExpansionFetch {
    async fn run<U: Upstream>(self, upstream: &U) -> UpstreamResult<Value> {
        match self {
            Self::Entity { kind, id } => upstream.fetch(kind, &id).await,
            Self::Related(target) => upstream.fetch_related(&target).await,
            Self::List { kind, query } => {
                let page = upstream.list(kind, &query).await?;
                Ok(json!({ "items": page.items, "total": page.total }))
            }
            Self::Count { kind, query } => {
                let page = upstream.list(kind, &query).await?;
                Ok(json!(page.total))
            }
        }
    }
}

/// Attaches every resolvable expansion to `entity`.
///
/// `plan` pairs each token with its fetch. Tokens whose fetch fails are left
/// out. Returns the tokens actually attached, in plan order.
pub async fn resolve<U: Upstream>(
    upstream: &U,
    entity: &mut Value,
    plan: Vec<(&'static str, ExpansionFetch)>,
) -> Vec<String> {
    if plan.is_empty() {
        return Vec::new();
    }
    let outcomes = join_all(plan.into_iter().map(|(token, fetch)| async move {
        (token, fetch.run(upstream).await)
    }))
    .await;

    let mut resolved = Vec::with_capacity(outcomes.len());
    for (token, outcome) in outcomes {
        match outcome {
            Ok(payload) => {
                if let Some(object) = entity.as_object_mut() {
                    object.insert(token.to_string(), payload);
                    resolved.push(token.to_string());
                }
            }
            Err(err) => {
                warn!(expansion = token, error = %err, "expansion omitted");
            }
        }
    }
    debug!(resolved = ?resolved, "expansions resolved");
    resolved
}
