//! Response composition.
//!
//! Every tool answers with the same three-part envelope:
//! `{data, _metadata, _summary}`.

use std::collections::BTreeMap;

use jira_types::{EntityKind, scalar_string, value_at};
use serde::Serialize;
use serde_json::{Value, json};

use crate::upstream::Page;

/// Uniform tool response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub data: Value,
    #[serde(rename = "_metadata")]
    pub metadata: Metadata,
    #[serde(rename = "_summary")]
    pub summary: Summary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub available_expansions: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub start_at: u64,
    pub max_results: u64,
    pub total: u64,
    pub has_more: bool,
}

impl Pagination {
    #[must_use]
    pub const fn new(page: Page, returned: u64, total: u64) -> Self {
        Self {
            start_at: page.start_at,
            max_results: page.max_results,
            total,
            has_more: page.start_at + returned < total,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_counts: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<Vec<String>>,
}

/// Per-entity suggested-action table keyed on a state-like field.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionRules {
    pub state_path: &'static [&'static str],
    pub rows: &'static [(&'static str, &'static [&'static str])],
    pub default: &'static [&'static str],
}

impl SuggestionRules {
    /// Suggests nothing.
    pub const NONE: Self = Self {
        state_path: &[],
        rows: &[],
        default: &[],
    };

    #[must_use]
    pub fn suggest(&self, entity: &Value) -> Vec<String> {
        let state = value_at(entity, self.state_path).and_then(Value::as_str);
        let actions = state
            .and_then(|state| {
                self.rows
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(state))
                    .map(|(_, actions)| *actions)
            })
            .unwrap_or(self.default);
        actions.iter().map(|action| (*action).to_string()).collect()
    }
}

/// Declared vocabulary minus resolved tokens, in vocabulary order.
#[must_use]
pub fn available_expansions(
    vocabulary: &'static [&'static str],
    resolved: &[String],
) -> Vec<&'static str> {
    let mut available: Vec<&'static str> = Vec::with_capacity(vocabulary.len());
    for token in vocabulary {
        if resolved.iter().any(|done| done == token) || available.contains(token) {
            continue;
        }
        available.push(token);
    }
    available
}

/// Counts list items by the kind's status-like field. `None` when no item
/// carries the field.
#[must_use]
pub fn status_counts(kind: EntityKind, items: &[Value]) -> Option<BTreeMap<String, u64>> {
    let mut counts = BTreeMap::new();
    for item in items {
        if let Some(status) = value_at(item, kind.status_path()).and_then(scalar_string) {
            *counts.entry(status).or_insert(0) += 1;
        }
    }
    (!counts.is_empty()).then_some(counts)
}

fn non_empty(actions: Vec<String>) -> Option<Vec<String>> {
    (!actions.is_empty()).then_some(actions)
}

#[must_use]
pub fn compose_single(
    entity: Value,
    vocabulary: &'static [&'static str],
    resolved: &[String],
    related: Option<Value>,
    rules: &SuggestionRules,
) -> Envelope {
    let suggested = rules.suggest(&entity);
    Envelope {
        data: entity,
        metadata: Metadata {
            available_expansions: available_expansions(vocabulary, resolved),
            pagination: None,
            related,
        },
        summary: Summary {
            status_counts: None,
            suggested_actions: non_empty(suggested),
        },
    }
}

/// Composes one page of `kind` entities. `resolved` holds the tokens
/// attached to every item; the advertised vocabulary is the listed kind's.
#[must_use]
pub fn compose_list(
    kind: EntityKind,
    items: Vec<Value>,
    page: Page,
    total: u64,
    resolved: &[String],
    rules: &SuggestionRules,
) -> Envelope {
    let pagination = Pagination::new(page, items.len() as u64, total);
    let mut suggested: Vec<String> = rules.default.iter().map(|a| (*a).to_string()).collect();
    if pagination.has_more {
        suggested.push(format!(
            "fetch next page (startAt={})",
            page.start_at + items.len() as u64
        ));
    }
    Envelope {
        metadata: Metadata {
            available_expansions: available_expansions(kind.expansions(), resolved),
            pagination: Some(pagination),
            related: None,
        },
        summary: Summary {
            status_counts: status_counts(kind, &items),
            suggested_actions: non_empty(suggested),
        },
        data: Value::Array(items),
    }
}

#[must_use]
pub fn compose_ack(data: Value, vocabulary: &'static [&'static str]) -> Envelope {
    Envelope {
        data,
        metadata: Metadata {
            available_expansions: available_expansions(vocabulary, &[]),
            pagination: None,
            related: None,
        },
        summary: Summary::default(),
    }
}

/// Acknowledgement body for deletions.
#[must_use]
pub fn deleted(id: &str) -> Value {
    json!({ "id": id, "deleted": true })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCAB: &[&str] = &["issues", "report", "board"];
    const RULES: SuggestionRules = SuggestionRules {
        state_path: &["state"],
        rows: &[
            ("future", &["start", "manage_issues"]),
            ("active", &["complete"]),
            ("closed", &["view report"]),
        ],
        default: &["get"],
    };

    #[test]
    fn available_excludes_resolved() {
        let available = available_expansions(VOCAB, &["report".to_string()]);
        assert_eq!(available, vec!["issues", "board"]);
    }

    #[test]
    fn suggestions_follow_state() {
        let envelope = compose_single(json!({ "id": 1, "state": "future" }), VOCAB, &[], None, &RULES);
        assert_eq!(
            envelope.summary.suggested_actions,
            Some(vec!["start".to_string(), "manage_issues".to_string()])
        );
        let closed = compose_single(json!({ "state": "CLOSED" }), VOCAB, &[], None, &RULES);
        assert_eq!(closed.summary.suggested_actions, Some(vec!["view report".to_string()]));
    }

    #[test]
    fn list_pagination_reports_more() {
        let items = vec![json!({ "state": "active" }), json!({ "state": "future" })];
        let envelope = compose_list(EntityKind::Sprint, items, Page::new(0, 2), 5, &[], &RULES);
        let pagination = envelope.metadata.pagination.expect("list carries pagination");
        assert!(pagination.has_more);
        assert_eq!(pagination.total, 5);
        let counts = envelope.summary.status_counts.expect("sprints carry a state");
        assert_eq!(counts.get("active"), Some(&1));
    }

    #[test]
    fn last_page_has_no_more() {
        let items = vec![json!({}), json!({})];
        let envelope = compose_list(EntityKind::Filter, items, Page::new(3, 2), 5, &[], &RULES);
        let pagination = envelope.metadata.pagination.expect("list carries pagination");
        assert!(!pagination.has_more);
        assert_eq!(envelope.summary.status_counts, None);
    }

    #[test]
    fn list_advertises_the_listed_kind_vocabulary() {
        let items = vec![json!({ "key": "PROJ-1" })];
        let issues = compose_list(
            EntityKind::Issue,
            items.clone(),
            Page::new(0, 1),
            1,
            &[],
            &SuggestionRules::NONE,
        );
        assert_eq!(issues.metadata.available_expansions, EntityKind::Issue.expansions());
        assert_eq!(issues.summary.suggested_actions, None);

        let boards = compose_list(
            EntityKind::Board,
            items,
            Page::new(0, 1),
            1,
            &["sprints".to_string()],
            &RULES,
        );
        assert_eq!(boards.metadata.available_expansions, vec!["issues", "configuration"]);
    }

    #[test]
    fn envelope_serializes_underscored_sections() {
        let envelope = compose_ack(deleted("10"), VOCAB);
        let value = serde_json::to_value(envelope).expect("envelope serializes");
        assert_eq!(value["data"]["deleted"], true);
        assert_eq!(value["_metadata"]["available_expansions"], json!(VOCAB));
        assert!(value["_metadata"].get("pagination").is_none());
        assert!(value["_summary"].as_object().is_some_and(serde_json::Map::is_empty));
    }
}
