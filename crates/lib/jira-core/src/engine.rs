//! Generic tool engine.
//!
//! One pipeline serves every entity tool: normalize, validate, parse into the
//! tool's typed operation, guard the state machine, execute, resolve
//! expansions, compose the envelope. Tools only supply a descriptor and
//! their operation bodies.

use std::future::Future;

use futures::future::join_all;
use jira_types::{EntityKind, scalar_string, value_at};
use serde_json::Value;
use tracing::{Instrument, Span, debug, field, info_span};
use uuid::Uuid;

use crate::compose::{Envelope, SuggestionRules, compose_ack, compose_list, compose_single};
use crate::descriptor::{OperationKind, ResponseShape, ToolDescriptor};
use crate::error::{ToolError, ToolResult};
use crate::expand::{self, ExpansionFetch};
use crate::normalize::ArgBag;
use crate::upstream::{Page, Upstream};
use crate::validate::{ValidatedRequest, validate};

/// What an operation body produced, before composition.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// One entity; expansions are resolved against it.
    Single(Value),
    /// One page of entities of `kind`. Requested expansions are resolved
    /// per item when `kind` is the tool's own entity.
    List {
        kind: EntityKind,
        items: Vec<Value>,
        page: Page,
        total: u64,
    },
    /// Acknowledgement without an entity body.
    Ack(Value),
}

impl Outcome {
    #[must_use]
    pub const fn shape(&self) -> ResponseShape {
        match self {
            Self::Single(_) => ResponseShape::Single,
            Self::List { .. } => ResponseShape::List,
            Self::Ack(_) => ResponseShape::Ack,
        }
    }
}

/// An entity tool plugged into the engine.
pub trait EntityTool: Send + Sync + 'static {
    type Kind: OperationKind;
    /// Typed operation, one variant per declared operation.
    type Operation: Send;

    fn descriptor() -> &'static ToolDescriptor;

    fn suggestions() -> &'static SuggestionRules;

    /// Builds the typed operation from validated arguments.
    ///
    /// # Errors
    /// Returns a validation error for values the descriptor cannot express.
    fn parse(kind: Self::Kind, request: &ValidatedRequest) -> ToolResult<Self::Operation>;

    fn execute<U: Upstream>(
        upstream: &U,
        operation: Self::Operation,
    ) -> impl Future<Output = ToolResult<Outcome>> + Send;

    /// Secondary fetch backing `token` for `entity`, if the entity carries
    /// what the fetch needs.
    fn expansion(token: &'static str, entity: &Value) -> Option<ExpansionFetch>;

    /// Cross-references surfaced under `_metadata.related`.
    fn related(_entity: &Value) -> Option<Value> {
        None
    }
}

/// Runs one tool invocation end to end.
///
/// # Errors
/// Returns the first validation, state, upstream or not-implemented error.
/// Expansion failures are never returned.
pub async fn invoke<T: EntityTool, U: Upstream>(upstream: &U, raw: ArgBag) -> ToolResult<Envelope> {
    let descriptor = T::descriptor();
    let span = info_span!(
        "tool_call",
        tool = descriptor.tool,
        operation = field::Empty,
        call_id = %Uuid::new_v4()
    );
    run::<T, U>(upstream, raw).instrument(span).await
}

async fn run<T: EntityTool, U: Upstream>(upstream: &U, raw: ArgBag) -> ToolResult<Envelope> {
    let descriptor = T::descriptor();
    let canonical = descriptor.renames.normalize(raw);
    let request = validate(descriptor, canonical)?;
    Span::current().record("operation", request.operation);

    let (kind, spec) = T::Kind::from_name(request.operation)
        .zip(descriptor.operation(request.operation))
        .ok_or_else(|| ToolError::InvalidOperation {
            tool: descriptor.tool,
            operation: Some(request.operation.to_string()),
            allowed: descriptor.operation_names(),
        })?;
    let operation = T::parse(kind, &request)?;

    guard_state(upstream, descriptor, &request).await?;

    debug!("dispatching");
    let outcome = T::execute(upstream, operation).await?;
    let produced = outcome.shape();
    if produced != spec.shape {
        return Err(ToolError::UnexpectedOutcome {
            tool: descriptor.tool,
            operation: request.operation.to_string(),
            declared: spec.shape,
            produced,
        });
    }

    let envelope = match outcome {
        Outcome::Single(mut entity) => {
            let requested = request.expand.iter().map(String::as_str);
            let tokens = requested.chain(spec.default_expansions.iter().copied());
            let plan = expansion_plan::<T>(descriptor, tokens, &entity);
            let resolved = expand::resolve(upstream, &mut entity, plan).await;
            let related = T::related(&entity);
            compose_single(entity, descriptor.expansions, &resolved, related, T::suggestions())
        }
        Outcome::List {
            kind,
            mut items,
            page,
            total,
        } => {
            if kind == descriptor.entity {
                let resolved =
                    expand_items::<T, U>(upstream, descriptor, &request.expand, &mut items).await;
                compose_list(kind, items, page, total, &resolved, T::suggestions())
            } else {
                compose_list(kind, items, page, total, &[], &SuggestionRules::NONE)
            }
        }
        Outcome::Ack(data) => compose_ack(data, descriptor.expansions),
    };
    debug!("composed");
    Ok(envelope)
}

/// Reads the current state once and refuses guarded operations the state
/// machine does not allow. Runs before any mutating call.
async fn guard_state<U: Upstream>(
    upstream: &U,
    descriptor: &ToolDescriptor,
    request: &ValidatedRequest,
) -> ToolResult<()> {
    let Some(machine) = descriptor.state_machine else {
        return Ok(());
    };
    if !machine.guards(request.operation) {
        return Ok(());
    }
    let Some(id) = request.get(descriptor.id_field).and_then(scalar_string) else {
        return Ok(());
    };

    let current = upstream.fetch(descriptor.entity, &id).await?;
    let Some(state) = value_at(&current, &[machine.field]).and_then(Value::as_str) else {
        debug!(id = %id, "entity carries no state; guard skipped");
        return Ok(());
    };
    let target = machine.target_field.and_then(|field| request.str(field));

    machine
        .check(state, target)
        .map_err(|violation| ToolError::IllegalStateTransition {
            entity: descriptor.entity,
            id,
            operation: request.operation.to_string(),
            state: violation.state,
            target: violation.target,
        })
}

/// Fetch plan for `tokens` against one entity, skipping duplicates and
/// tokens the entity cannot back.
fn expansion_plan<'t, T: EntityTool>(
    descriptor: &ToolDescriptor,
    tokens: impl Iterator<Item = &'t str>,
    entity: &Value,
) -> Vec<(&'static str, ExpansionFetch)> {
    let mut plan: Vec<(&'static str, ExpansionFetch)> = Vec::new();
    for token in tokens {
        let Some(token) = descriptor.expansions.iter().copied().find(|t| *t == token) else {
            continue;
        };
        if plan.iter().any(|(planned, _)| *planned == token) {
            continue;
        }
        match T::expansion(token, entity) {
            Some(fetch) => plan.push((token, fetch)),
            None => debug!(expansion = token, "entity lacks data for expansion"),
        }
    }
    plan
}

/// Resolves the requested tokens on every item of a page. Returns the
/// tokens attached to all items.
async fn expand_items<T: EntityTool, U: Upstream>(
    upstream: &U,
    descriptor: &ToolDescriptor,
    tokens: &[String],
    items: &mut [Value],
) -> Vec<String> {
    if tokens.is_empty() || items.is_empty() {
        return Vec::new();
    }
    let per_item = join_all(items.iter_mut().map(|item| {
        let plan = expansion_plan::<T>(descriptor, tokens.iter().map(String::as_str), item);
        expand::resolve(upstream, item, plan)
    }))
    .await;
    tokens
        .iter()
        .filter(|token| per_item.iter().all(|resolved| resolved.contains(*token)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use serde_json::json;

    use super::*;
    use crate::descriptor::OperationSpec;
    use crate::error::ErrorKind;
    use crate::normalize::RenameTable;
    use crate::upstream::MemoryUpstream;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TallyOp {
        Tally,
    }

    impl OperationKind for TallyOp {
        const ALL: &'static [Self] = &[Self::Tally];

        fn name(self) -> &'static str {
            "tally"
        }

        fn spec(self) -> OperationSpec {
            OperationSpec::list()
        }
    }

    static DESCRIPTOR: LazyLock<ToolDescriptor> = LazyLock::new(|| {
        ToolDescriptor::build::<TallyOp>("tally_boards", EntityKind::Board, "boardId", RenameTable::new(&[]))
    });
    static NO_SUGGESTIONS: SuggestionRules = SuggestionRules::NONE;

    /// Declares a list operation but answers with one entity.
    struct TallyTool;

    impl EntityTool for TallyTool {
        type Kind = TallyOp;
        type Operation = ();

        fn descriptor() -> &'static ToolDescriptor {
            &DESCRIPTOR
        }

        fn suggestions() -> &'static SuggestionRules {
            &NO_SUGGESTIONS
        }

        fn parse(_kind: TallyOp, _request: &ValidatedRequest) -> ToolResult<()> {
            Ok(())
        }

        async fn execute<U: Upstream>(_upstream: &U, _operation: ()) -> ToolResult<Outcome> {
            Ok(Outcome::Single(json!({ "boards": 3 })))
        }

        fn expansion(_token: &'static str, _entity: &Value) -> Option<ExpansionFetch> {
            None
        }
    }

    #[tokio::test]
    async fn outcome_must_match_the_declared_shape() {
        let mut args = ArgBag::new();
        args.insert("operation".to_string(), json!("tally"));

        let err = invoke::<TallyTool, _>(&MemoryUpstream::new(), args)
            .await
            .expect_err("a single entity is not a page");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.operation(), Some("tally"));
        assert!(err.to_string().contains("declared list but produced single"));
    }
}
