//! Operation validation.
//!
//! Pure and synchronous: checks a canonical argument bag against a tool
//! descriptor and never touches the upstream service.

use jira_types::schema::{
    DEFAULT_MAX_RESULTS,
    DEFAULT_START_AT,
    FIELD_EXPAND,
    FIELD_MAX_RESULTS,
    FIELD_OPERATION,
    FIELD_START_AT,
    MAX_RESULTS_CAP,
};
use serde_json::{Map, Value};

use crate::descriptor::{CrossFieldRule, FieldFormat, OperationSpec, ToolDescriptor, parse_id};
use crate::error::{ToolError, ToolResult};
use crate::normalize::ArgBag;
use crate::upstream::Page;

/// Canonical arguments that passed every descriptor check.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub operation: &'static str,
    pub args: ArgBag,
    /// Requested expansion tokens, deduplicated in request order.
    pub expand: Vec<String>,
}

/// Validates `args` against `descriptor`.
///
/// Steps run in order: operation name, required fields, optional fields,
/// cross-field rules, expansion tokens. The first failure is returned.
///
/// # Errors
/// Returns the validation kinds of `ToolError`.
pub fn validate(descriptor: &ToolDescriptor, args: ArgBag) -> ToolResult<ValidatedRequest> {
    let spec = resolve_operation(descriptor, &args)?;

    for rule in &spec.required {
        match present(&args, rule.name) {
            None => {
                return Err(ToolError::MissingRequiredField {
                    operation: spec.name.to_string(),
                    field: rule.name.to_string(),
                    expected: rule.format.example(),
                });
            }
            Some(value) => check_format(spec, rule.name, rule.format, value)?,
        }
    }

    for rule in &spec.optional {
        if let Some(value) = present(&args, rule.name) {
            check_format(spec, rule.name, rule.format, value)?;
        }
    }

    for rule in &spec.cross_field {
        check_cross_field(spec, *rule, &args)?;
    }

    let expand = parse_expand(descriptor, spec, &args)?;

    Ok(ValidatedRequest {
        operation: spec.name,
        args,
        expand,
    })
}

fn resolve_operation<'d>(
    descriptor: &'d ToolDescriptor,
    args: &ArgBag,
) -> ToolResult<&'d OperationSpec> {
    let requested = args.get(FIELD_OPERATION).and_then(Value::as_str);
    requested
        .and_then(|name| descriptor.operation(name))
        .ok_or_else(|| ToolError::InvalidOperation {
            tool: descriptor.tool,
            operation: args.get(FIELD_OPERATION).map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }),
            allowed: descriptor.operation_names(),
        })
}

fn present<'a>(args: &'a ArgBag, field: &str) -> Option<&'a Value> {
    args.get(field).filter(|value| !value.is_null())
}

fn check_format(
    spec: &OperationSpec,
    field: &str,
    format: FieldFormat,
    value: &Value,
) -> ToolResult<()> {
    if format.check(value) {
        Ok(())
    } else {
        Err(ToolError::InvalidFieldFormat {
            operation: spec.name.to_string(),
            field: field.to_string(),
            expected: format.example(),
        })
    }
}

fn check_cross_field(spec: &OperationSpec, rule: CrossFieldRule, args: &ArgBag) -> ToolResult<()> {
    match rule {
        CrossFieldRule::AtLeastOneOf(fields) => {
            let supplied = |field: &&str| {
                present(args, field).is_some_and(|value| {
                    spec.rule(field)
                        .is_none_or(|rule| !rule.format.is_vacant(value))
                })
            };
            if fields.iter().any(supplied) {
                return Ok(());
            }
            Err(ToolError::MissingRequiredField {
                operation: spec.name.to_string(),
                field: fields.join("|"),
                expected: format!("at least one of: {}", fields.join(", ")),
            })
        }
        CrossFieldRule::Ordered { earlier, later } => {
            let first = present(args, earlier).and_then(Value::as_str);
            let second = present(args, later).and_then(Value::as_str);
            let (Some(first), Some(second)) = (first, second) else {
                return Ok(());
            };
            let parse = |text: &str| chrono::DateTime::parse_from_rfc3339(text).ok();
            match (parse(first), parse(second)) {
                (Some(start), Some(end)) if start >= end => Err(ToolError::InvalidFieldFormat {
                    operation: spec.name.to_string(),
                    field: later.to_string(),
                    expected: format!("a timestamp after {earlier} ({first})"),
                }),
                _ => Ok(()),
            }
        }
    }
}

fn parse_expand(
    descriptor: &ToolDescriptor,
    spec: &OperationSpec,
    args: &ArgBag,
) -> ToolResult<Vec<String>> {
    let vocabulary = descriptor.operation_expansions(spec);
    let tokens: Vec<&str> = match present(args, FIELD_EXPAND) {
        None => Vec::new(),
        Some(Value::String(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect(),
        Some(Value::Array(items)) => {
            let mut tokens = Vec::with_capacity(items.len());
            for item in items {
                let Some(token) = item.as_str() else {
                    return Err(ToolError::InvalidFieldFormat {
                        operation: spec.name.to_string(),
                        field: FIELD_EXPAND.to_string(),
                        expected: format!("array of strings from: {}", vocabulary.join(", ")),
                    });
                };
                tokens.push(token);
            }
            tokens
        }
        Some(_) => {
            return Err(ToolError::InvalidFieldFormat {
                operation: spec.name.to_string(),
                field: FIELD_EXPAND.to_string(),
                expected: format!("array of strings from: {}", vocabulary.join(", ")),
            });
        }
    };

    let mut expand: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !vocabulary.contains(&token) {
            return Err(ToolError::InvalidExpansion {
                entity: descriptor.entity,
                token: token.to_string(),
                allowed: vocabulary.to_vec(),
            });
        }
        if !expand.iter().any(|existing| existing == token) {
            expand.push(token.to_string());
        }
    }
    Ok(expand)
}

impl ValidatedRequest {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        present(&self.args, field)
    }

    #[must_use]
    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    #[must_use]
    pub fn string(&self, field: &str) -> Option<String> {
        self.str(field).map(str::to_string)
    }

    /// Reads a field the descriptor declared as required.
    ///
    /// # Errors
    /// Returns `MissingRequiredField` if the field is absent or not text.
    pub fn require_string(&self, field: &str) -> ToolResult<String> {
        self.string(field).ok_or_else(|| self.missing(field, "\"text\""))
    }

    #[must_use]
    pub fn id(&self, field: &str) -> Option<u64> {
        self.get(field).and_then(parse_id)
    }

    /// Reads a numeric identifier the descriptor declared as required.
    ///
    /// # Errors
    /// Returns `MissingRequiredField` if the field is absent or not numeric.
    pub fn require_id(&self, field: &str) -> ToolResult<u64> {
        self.id(field).ok_or_else(|| self.missing(field, "456"))
    }

    #[must_use]
    pub fn bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn string_list(&self, field: &str) -> Vec<String> {
        self.get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn object(&self, field: &str) -> Option<Map<String, Value>> {
        self.get(field).and_then(Value::as_object).cloned()
    }

    /// Page window from `startAt`/`maxResults`, defaulted and capped.
    #[must_use]
    pub fn page(&self) -> Page {
        let start_at = self
            .get(FIELD_START_AT)
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_START_AT);
        let max_results = self
            .get(FIELD_MAX_RESULTS)
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .min(MAX_RESULTS_CAP);
        Page::new(start_at, max_results)
    }

    fn missing(&self, field: &str, expected: &str) -> ToolError {
        ToolError::MissingRequiredField {
            operation: self.operation.to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{OperationKind, OperationSpec, ToolDescriptor};
    use crate::error::ErrorKind;
    use crate::normalize::RenameTable;
    use jira_types::EntityKind;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum DemoOp {
        Get,
        Update,
        Plan,
        Move,
        Search,
    }

    impl OperationKind for DemoOp {
        const ALL: &'static [Self] = &[Self::Get, Self::Update, Self::Plan, Self::Move, Self::Search];

        fn name(self) -> &'static str {
            match self {
                Self::Get => "get",
                Self::Update => "update",
                Self::Plan => "plan",
                Self::Move => "move",
                Self::Search => "search",
            }
        }

        fn spec(self) -> OperationSpec {
            match self {
                Self::Get => OperationSpec::single().required("sprintId", FieldFormat::NumericId),
                Self::Update => OperationSpec::single()
                    .mutating()
                    .required("sprintId", FieldFormat::NumericId)
                    .optional("name", FieldFormat::NonEmptyText)
                    .optional("goal", FieldFormat::Text)
                    .at_least_one_of(&["name", "goal"]),
                Self::Plan => OperationSpec::single()
                    .optional("startDate", FieldFormat::DateTime)
                    .optional("endDate", FieldFormat::DateTime)
                    .ordered("startDate", "endDate"),
                Self::Move => OperationSpec::single()
                    .required("sprintId", FieldFormat::NumericId)
                    .optional("add", FieldFormat::IssueKeyList)
                    .optional("remove", FieldFormat::IssueKeyList)
                    .at_least_one_of(&["add", "remove"]),
                Self::Search => OperationSpec::list().listing(EntityKind::Issue),
            }
        }
    }

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::build::<DemoOp>(
            "demo_tool",
            EntityKind::Sprint,
            "sprintId",
            RenameTable::new(&[]),
        )
    }

    fn bag(value: Value) -> ArgBag {
        match value {
            Value::Object(map) => map,
            _ => ArgBag::new(),
        }
    }

    #[test]
    fn unknown_operation_lists_allowed_names() {
        let err = validate(&descriptor(), bag(json!({ "operation": "explode" })))
            .expect_err("operation is not declared");
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(err.to_string().contains("get, update, plan"));
    }

    #[test]
    fn missing_operation_is_invalid_operation() {
        let err = validate(&descriptor(), bag(json!({ "sprintId": 1 }))).expect_err("no operation");
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(err.operation(), None);
    }

    #[test]
    fn null_required_field_counts_as_missing() {
        let err = validate(&descriptor(), bag(json!({ "operation": "get", "sprintId": null })))
            .expect_err("sprintId is null");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
        assert_eq!(err.field(), Some("sprintId"));
    }

    #[test]
    fn malformed_field_reports_example() {
        let err = validate(&descriptor(), bag(json!({ "operation": "get", "sprintId": "abc" })))
            .expect_err("sprintId is not numeric");
        assert_eq!(err.kind(), ErrorKind::InvalidFieldFormat);
        assert_eq!(err.expected(), Some("456"));
    }

    #[test]
    fn mutation_needs_a_mutable_field() {
        let err = validate(&descriptor(), bag(json!({ "operation": "update", "sprintId": 4 })))
            .expect_err("nothing to update");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
        assert_eq!(err.field(), Some("name|goal"));
    }

    #[test]
    fn ordered_dates_are_enforced() {
        let err = validate(
            &descriptor(),
            bag(json!({
                "operation": "plan",
                "startDate": "2026-02-01T00:00:00Z",
                "endDate": "2026-01-01T00:00:00Z"
            })),
        )
        .expect_err("end precedes start");
        assert_eq!(err.field(), Some("endDate"));
    }

    #[test]
    fn expansions_accept_arrays_and_comma_lists() {
        let from_array = validate(
            &descriptor(),
            bag(json!({ "operation": "get", "sprintId": 1, "expand": ["report", "issues", "report"] })),
        )
        .expect("valid expansions");
        assert_eq!(from_array.expand, vec!["report", "issues"]);

        let from_string = validate(
            &descriptor(),
            bag(json!({ "operation": "get", "sprintId": 1, "expand": "issues, report" })),
        )
        .expect("valid expansions");
        assert_eq!(from_string.expand, vec!["issues", "report"]);
    }

    #[test]
    fn unknown_expansion_is_named() {
        let err = validate(
            &descriptor(),
            bag(json!({ "operation": "get", "sprintId": 1, "expand": ["issues", "bogus"] })),
        )
        .expect_err("bogus is not declared");
        assert_eq!(err.kind(), ErrorKind::InvalidExpansion);
        assert!(err.to_string().contains("'bogus'"));
    }

    #[test]
    fn page_defaults_and_caps() {
        let request = validate(
            &descriptor(),
            bag(json!({ "operation": "get", "sprintId": 1, "maxResults": 5000 })),
        )
        .expect("valid request");
        assert_eq!(request.page(), Page::new(0, 100));
    }

    #[test]
    fn empty_key_list_beside_a_filled_one_is_accepted() {
        let request = validate(
            &descriptor(),
            bag(json!({ "operation": "move", "sprintId": 12, "add": [], "remove": ["PROJ-2"] })),
        )
        .expect("remove satisfies the rule");
        assert_eq!(request.string_list("add"), Vec::<String>::new());
    }

    #[test]
    fn empty_key_lists_alone_name_the_rule() {
        let err = validate(
            &descriptor(),
            bag(json!({ "operation": "move", "sprintId": 12, "add": [] })),
        )
        .expect_err("nothing to move");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
        assert_eq!(err.field(), Some("add|remove"));
    }

    #[test]
    fn foreign_listings_take_no_expansions() {
        let err = validate(
            &descriptor(),
            bag(json!({ "operation": "search", "expand": ["issues"] })),
        )
        .expect_err("search lists issues, not sprints");
        assert_eq!(err.kind(), ErrorKind::InvalidExpansion);
        assert!(err.to_string().contains("accepts no expansions"));
    }
}
