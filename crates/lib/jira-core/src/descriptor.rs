//! Static operation descriptors.
//!
//! Each tool declares its operations, their field rules, its expansion
//! vocabulary, and optional state-machine rules. Descriptors are built once
//! and never mutated afterwards.

use std::fmt;
use std::sync::LazyLock;

use chrono::DateTime;
use jira_types::EntityKind;
use regex::Regex;
use serde_json::{Value, json};

use crate::normalize::RenameTable;

static ISSUE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][A-Z0-9_]+-[1-9][0-9]*$").expect("valid issue key pattern")
});
static PROJECT_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{1,9}$").expect("valid project key pattern"));

/// Shape check applied to a single field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    IssueKey,
    ProjectKey,
    NumericId,
    NonNegativeInt,
    PositiveInt,
    NonEmptyText,
    Text,
    Boolean,
    DateTime,
    OneOf(&'static [&'static str]),
    StringList,
    IssueKeyList,
    Object,
}

impl FieldFormat {
    #[must_use]
    pub fn check(self, value: &Value) -> bool {
        match self {
            Self::IssueKey => value.as_str().is_some_and(|key| ISSUE_KEY_RE.is_match(key)),
            Self::ProjectKey => value.as_str().is_some_and(|key| PROJECT_KEY_RE.is_match(key)),
            Self::NumericId => parse_id(value).is_some_and(|id| id > 0),
            Self::NonNegativeInt => value.as_u64().is_some(),
            Self::PositiveInt => value.as_u64().is_some_and(|number| number > 0),
            Self::NonEmptyText => value.as_str().is_some_and(|text| !text.trim().is_empty()),
            Self::Text => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::DateTime => value
                .as_str()
                .is_some_and(|text| DateTime::parse_from_rfc3339(text).is_ok()),
            Self::OneOf(choices) => value.as_str().is_some_and(|text| choices.contains(&text)),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::IssueKeyList => value
                .as_array()
                .is_some_and(|items| items.iter().all(|item| Self::IssueKey.check(item))),
            Self::Object => value.is_object(),
        }
    }

    /// True when `value` passes `check` but asks for nothing, such as an
    /// empty key list. Such values do not satisfy `AtLeastOneOf`.
    #[must_use]
    pub fn is_vacant(self, value: &Value) -> bool {
        matches!(self, Self::IssueKeyList) && value.as_array().is_some_and(Vec::is_empty)
    }

    /// Human-readable example of a valid value.
    #[must_use]
    pub fn example(self) -> String {
        match self {
            Self::IssueKey => "\"PROJ-123\"".to_string(),
            Self::ProjectKey => "\"PROJ\"".to_string(),
            Self::NumericId => "456".to_string(),
            Self::NonNegativeInt => "0".to_string(),
            Self::PositiveInt => "50".to_string(),
            Self::NonEmptyText => "\"non-empty text\"".to_string(),
            Self::Text => "\"text\"".to_string(),
            Self::Boolean => "true".to_string(),
            Self::DateTime => "\"2026-01-15T09:00:00Z\"".to_string(),
            Self::OneOf(choices) => format!("one of {}", choices.join(" | ")),
            Self::StringList => "[\"label\"]".to_string(),
            Self::IssueKeyList => "[\"PROJ-1\", \"PROJ-2\"]".to_string(),
            Self::Object => "{\"customfield_10010\": 5}".to_string(),
        }
    }

    /// Minimal value that passes `check`.
    #[must_use]
    pub fn sample(self) -> Value {
        match self {
            Self::IssueKey => json!("PROJ-123"),
            Self::ProjectKey => json!("PROJ"),
            Self::NumericId => json!(456),
            Self::NonNegativeInt => json!(0),
            Self::PositiveInt => json!(50),
            Self::NonEmptyText | Self::Text => json!("sample"),
            Self::Boolean => json!(true),
            Self::DateTime => json!("2026-01-15T09:00:00Z"),
            Self::OneOf(choices) => choices.first().map_or(Value::Null, |first| json!(first)),
            Self::StringList => json!(["sample"]),
            Self::IssueKeyList => json!(["PROJ-1"]),
            Self::Object => json!({}),
        }
    }
}

/// Parses a positive identifier given as a number or a digit string.
#[must_use]
pub fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            text.parse().ok()
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub format: FieldFormat,
}

/// Rule spanning several fields of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossFieldRule {
    /// At least one of the fields must be present.
    AtLeastOneOf(&'static [&'static str]),
    /// When both are present, `earlier` must sort before `later`.
    Ordered {
        earlier: &'static str,
        later: &'static str,
    },
}

/// Whether an operation yields one entity, a page of entities, or an
/// acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Single,
    List,
    Ack,
}

impl ResponseShape {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::List => "list",
            Self::Ack => "ack",
        }
    }
}

impl fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub name: &'static str,
    pub shape: ResponseShape,
    pub mutating: bool,
    pub required: Vec<FieldRule>,
    pub optional: Vec<FieldRule>,
    pub cross_field: Vec<CrossFieldRule>,
    /// Expansions attached even when the caller does not ask for them.
    pub default_expansions: &'static [&'static str],
    /// Kind of the listed items when it differs from the tool's entity.
    pub lists: Option<EntityKind>,
}

impl OperationSpec {
    #[must_use]
    pub const fn new(shape: ResponseShape) -> Self {
        Self {
            name: "",
            shape,
            mutating: false,
            required: Vec::new(),
            optional: Vec::new(),
            cross_field: Vec::new(),
            default_expansions: &[],
            lists: None,
        }
    }

    #[must_use]
    pub const fn single() -> Self {
        Self::new(ResponseShape::Single)
    }

    /// List operation with the standard `startAt`/`maxResults` window.
    #[must_use]
    pub fn list() -> Self {
        Self::new(ResponseShape::List)
            .optional(jira_types::schema::FIELD_START_AT, FieldFormat::NonNegativeInt)
            .optional(jira_types::schema::FIELD_MAX_RESULTS, FieldFormat::PositiveInt)
    }

    #[must_use]
    pub const fn ack() -> Self {
        Self::new(ResponseShape::Ack)
    }

    #[must_use]
    pub const fn mutating(mut self) -> Self {
        self.mutating = true;
        self
    }

    #[must_use]
    pub fn required(mut self, name: &'static str, format: FieldFormat) -> Self {
        self.required.push(FieldRule { name, format });
        self
    }

    #[must_use]
    pub fn optional(mut self, name: &'static str, format: FieldFormat) -> Self {
        self.optional.push(FieldRule { name, format });
        self
    }

    #[must_use]
    pub fn at_least_one_of(mut self, fields: &'static [&'static str]) -> Self {
        self.cross_field.push(CrossFieldRule::AtLeastOneOf(fields));
        self
    }

    #[must_use]
    pub fn ordered(mut self, earlier: &'static str, later: &'static str) -> Self {
        self.cross_field
            .push(CrossFieldRule::Ordered { earlier, later });
        self
    }

    #[must_use]
    pub const fn with_default_expansions(mut self, tokens: &'static [&'static str]) -> Self {
        self.default_expansions = tokens;
        self
    }

    /// Marks a list operation whose items are of another kind.
    #[must_use]
    pub const fn listing(mut self, kind: EntityKind) -> Self {
        self.lists = Some(kind);
        self
    }

    /// Rule declared for `field`, required or optional.
    #[must_use]
    pub fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .find(|rule| rule.name == field)
    }
}

/// Enumerated operations of one tool.
///
/// `spec` is an exhaustive match, so every declared operation carries exactly
/// one field specification.
pub trait OperationKind: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn name(self) -> &'static str;

    fn spec(self) -> OperationSpec;

    #[must_use]
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

/// Lifecycle rules for entities with a state field.
#[derive(Debug, Clone, Copy)]
pub struct StateMachine {
    pub field: &'static str,
    pub transitions: &'static [(&'static str, &'static str)],
    pub terminal: &'static [&'static str],
    /// Operations that must read the current state before mutating.
    pub guarded: &'static [&'static str],
    /// Argument that requests a target state, if any.
    pub target_field: Option<&'static str>,
}

/// Why a guarded operation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateViolation {
    pub state: String,
    pub target: Option<String>,
}

impl StateMachine {
    #[must_use]
    pub fn guards(&self, operation: &str) -> bool {
        self.guarded.contains(&operation)
    }

    /// Checks a guarded operation against the current state.
    ///
    /// # Errors
    /// Returns `StateViolation` when the entity is terminal or the requested
    /// target does not follow a declared edge.
    pub fn check(&self, current: &str, target: Option<&str>) -> Result<(), StateViolation> {
        let violation = || StateViolation {
            state: current.to_string(),
            target: target.map(str::to_string),
        };
        if self.terminal.contains(&current) {
            return Err(violation());
        }
        match target {
            None => Ok(()),
            Some(target) if target == current => Ok(()),
            Some(target) if self.transitions.contains(&(current, target)) => Ok(()),
            Some(_) => Err(violation()),
        }
    }
}

/// Static description of one multi-operation tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub tool: &'static str,
    pub entity: EntityKind,
    /// Canonical argument carrying the entity identifier.
    pub id_field: &'static str,
    pub renames: RenameTable,
    pub operations: Vec<OperationSpec>,
    pub expansions: &'static [&'static str],
    pub state_machine: Option<StateMachine>,
}

impl ToolDescriptor {
    /// Builds a descriptor from every variant of `K`. The expansion
    /// vocabulary is the entity's.
    #[must_use]
    pub fn build<K: OperationKind>(
        tool: &'static str,
        entity: EntityKind,
        id_field: &'static str,
        renames: RenameTable,
    ) -> Self {
        let operations = K::ALL
            .iter()
            .map(|kind| {
                let mut spec = kind.spec();
                spec.name = kind.name();
                spec
            })
            .collect();
        Self {
            tool,
            entity,
            id_field,
            renames,
            operations,
            expansions: entity.expansions(),
            state_machine: None,
        }
    }

    #[must_use]
    pub const fn with_state_machine(mut self, machine: StateMachine) -> Self {
        self.state_machine = Some(machine);
        self
    }

    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.iter().find(|spec| spec.name == name)
    }

    /// Kind of the entities `spec` returns in `data`.
    #[must_use]
    pub fn listed_kind(&self, spec: &OperationSpec) -> EntityKind {
        spec.lists.unwrap_or(self.entity)
    }

    /// Tokens `spec` accepts in `expand`. Operations listing another kind
    /// accept none.
    #[must_use]
    pub fn operation_expansions(&self, spec: &OperationSpec) -> &'static [&'static str] {
        if self.listed_kind(spec) == self.entity {
            self.expansions
        } else {
            &[]
        }
    }

    #[must_use]
    pub fn operation_names(&self) -> Vec<&'static str> {
        self.operations.iter().map(|spec| spec.name).collect()
    }

    /// JSON overview used by the help surface.
    #[must_use]
    pub fn summary(&self) -> Value {
        let operations: Vec<Value> = self
            .operations
            .iter()
            .map(|spec| {
                let fields = |rules: &[FieldRule]| -> Vec<Value> {
                    rules
                        .iter()
                        .map(|rule| json!({ "name": rule.name, "example": rule.format.example() }))
                        .collect()
                };
                json!({
                    "operation": spec.name,
                    "mutating": spec.mutating,
                    "required": fields(&spec.required),
                    "optional": fields(&spec.optional),
                })
            })
            .collect();
        let aliases: Vec<Value> = self
            .renames
            .entries()
            .iter()
            .map(|(alternate, canonical)| json!({ "alias": alternate, "canonical": canonical }))
            .collect();
        json!({
            "tool": self.tool,
            "entity": self.entity,
            "operations": operations,
            "expansions": self.expansions,
            "aliases": aliases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPRINT_MACHINE: StateMachine = StateMachine {
        field: "state",
        transitions: &[("future", "active"), ("active", "closed")],
        terminal: &["closed"],
        guarded: &["update", "manage_issues"],
        target_field: Some("state"),
    };

    #[test]
    fn formats_accept_their_samples() {
        let formats = [
            FieldFormat::IssueKey,
            FieldFormat::ProjectKey,
            FieldFormat::NumericId,
            FieldFormat::NonNegativeInt,
            FieldFormat::PositiveInt,
            FieldFormat::NonEmptyText,
            FieldFormat::Text,
            FieldFormat::Boolean,
            FieldFormat::DateTime,
            FieldFormat::OneOf(&["scrum", "kanban"]),
            FieldFormat::StringList,
            FieldFormat::IssueKeyList,
            FieldFormat::Object,
        ];
        for format in formats {
            assert!(format.check(&format.sample()), "{format:?} rejects its sample");
        }
    }

    #[test]
    fn issue_keys_are_checked() {
        assert!(FieldFormat::IssueKey.check(&json!("PROJ-123")));
        assert!(FieldFormat::IssueKey.check(&json!("AB_2-9")));
        assert!(!FieldFormat::IssueKey.check(&json!("proj-123")));
        assert!(!FieldFormat::IssueKey.check(&json!("PROJ-0")));
        assert!(!FieldFormat::IssueKey.check(&json!(123)));
    }

    #[test]
    fn numeric_ids_accept_digit_strings() {
        assert!(FieldFormat::NumericId.check(&json!(456)));
        assert!(FieldFormat::NumericId.check(&json!("456")));
        assert!(!FieldFormat::NumericId.check(&json!("45a")));
        assert!(!FieldFormat::NumericId.check(&json!(0)));
        assert!(!FieldFormat::NumericId.check(&json!(-3)));
    }

    #[test]
    fn empty_key_lists_are_well_formed_but_vacant() {
        assert!(FieldFormat::IssueKeyList.check(&json!([])));
        assert!(FieldFormat::IssueKeyList.is_vacant(&json!([])));
        assert!(!FieldFormat::IssueKeyList.is_vacant(&json!(["PROJ-1"])));
        assert!(!FieldFormat::IssueKeyList.check(&json!(["proj-1"])));
        assert!(!FieldFormat::StringList.is_vacant(&json!([])));
    }

    #[test]
    fn terminal_state_refuses_guarded_operations() {
        assert!(SPRINT_MACHINE.check("closed", None).is_err());
        assert!(SPRINT_MACHINE.check("closed", Some("active")).is_err());
    }

    #[test]
    fn declared_edges_and_noops_are_allowed() {
        assert!(SPRINT_MACHINE.check("future", Some("active")).is_ok());
        assert!(SPRINT_MACHINE.check("active", Some("closed")).is_ok());
        assert!(SPRINT_MACHINE.check("active", Some("active")).is_ok());
        assert!(SPRINT_MACHINE.check("future", None).is_ok());
    }

    #[test]
    fn undeclared_edges_are_refused() {
        let violation = SPRINT_MACHINE
            .check("future", Some("closed"))
            .expect_err("future -> closed skips active");
        assert_eq!(violation.state, "future");
        assert_eq!(violation.target.as_deref(), Some("closed"));
        assert!(SPRINT_MACHINE.check("active", Some("future")).is_err());
    }
}
