use jira_core::compose::Pagination;
use jira_core::control::{JiraControlPlane, descriptors};
use jira_core::descriptor::{CrossFieldRule, OperationSpec, ToolDescriptor};
use jira_core::upstream::{CallMethod, MemoryUpstream, Page, UpstreamError};
use jira_core::validate::validate;
use jira_core::{ArgBag, ErrorKind};
use jira_types::EntityKind;
use proptest::prelude::*;
use serde_json::{Value, json};

fn args(value: Value) -> ArgBag {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an argument object, got {other}"),
    }
}

fn sandbox() -> JiraControlPlane<MemoryUpstream> {
    JiraControlPlane::new(MemoryUpstream::sample())
}

/// Smallest argument bag that satisfies every rule of `spec`.
fn minimal_args(spec: &OperationSpec) -> ArgBag {
    let mut bag = ArgBag::new();
    bag.insert("operation".to_string(), json!(spec.name));
    for rule in &spec.required {
        bag.insert(rule.name.to_string(), rule.format.sample());
    }
    for cross in &spec.cross_field {
        if let CrossFieldRule::AtLeastOneOf(fields) = cross {
            let first = fields[0];
            let rule = spec
                .rule(first)
                .unwrap_or_else(|| panic!("{}: {first} is declared", spec.name));
            bag.insert(first.to_string(), rule.format.sample());
        }
    }
    bag
}

fn every_operation() -> Vec<(&'static ToolDescriptor, &'static OperationSpec)> {
    descriptors()
        .into_iter()
        .flat_map(|descriptor| descriptor.operations.iter().map(move |spec| (descriptor, spec)))
        .collect()
}

#[tokio::test]
async fn future_sprint_can_be_started() {
    let control = sandbox();
    let envelope = control
        .manage_sprint(args(json!({ "operation": "update", "sprintId": 13, "state": "active" })))
        .await
        .expect("future -> active is allowed");

    assert_eq!(envelope.data["state"], json!("active"));
    assert_eq!(
        envelope.summary.suggested_actions,
        Some(vec!["complete".to_string(), "manage_issues".to_string()])
    );
}

#[tokio::test]
async fn closed_sprint_refuses_issue_changes_before_any_mutation() {
    let control = sandbox();
    let err = control
        .manage_sprint(args(json!({
            "operation": "manage_issues",
            "sprint_id": 11,
            "issues_to_add": ["PROJ-4"]
        })))
        .await
        .expect_err("closed sprints are read-only");

    assert_eq!(err.kind(), ErrorKind::IllegalStateTransition);
    assert!(control.upstream().mutating_calls().is_empty());
}

#[tokio::test]
async fn closed_sprint_cannot_reopen() {
    let control = sandbox();
    let err = control
        .manage_sprint(args(json!({ "operation": "update", "sprintId": 11, "state": "active" })))
        .await
        .expect_err("closed -> active is not an edge");
    assert_eq!(err.kind(), ErrorKind::IllegalStateTransition);
    assert_eq!(
        control.upstream().entity(EntityKind::Sprint, "11").map(|sprint| sprint["state"].clone()),
        Some(json!("closed"))
    );
}

#[tokio::test]
async fn unknown_expansion_fails_before_any_upstream_call() {
    let control = sandbox();
    let err = control
        .manage_issue(args(json!({
            "operation": "get",
            "issueKey": "PROJ-1",
            "expand": ["comments", "bogus"]
        })))
        .await
        .expect_err("bogus is not an issue expansion");

    assert_eq!(err.kind(), ErrorKind::InvalidExpansion);
    assert!(err.to_string().contains("bogus"));
    assert!(control.upstream().calls().is_empty());
}

#[tokio::test]
async fn board_list_reports_pagination() {
    let upstream = (1..=5).fold(MemoryUpstream::new(), |upstream, id| {
        upstream.with_entity(
            EntityKind::Board,
            json!({ "id": id, "name": format!("Board {id}"), "type": "kanban" }),
        )
    });
    let control = JiraControlPlane::new(upstream);
    let envelope = control
        .manage_board(args(json!({ "operation": "list", "startAt": 0, "maxResults": 2 })))
        .await
        .expect("boards list");

    assert_eq!(envelope.data.as_array().map(Vec::len), Some(2));
    let pagination = serde_json::to_value(envelope.metadata.pagination).expect("serializes");
    assert_eq!(
        pagination,
        json!({ "startAt": 0, "maxResults": 2, "total": 5, "hasMore": true })
    );
    assert_eq!(
        envelope.summary.status_counts.and_then(|counts| counts.get("kanban").copied()),
        Some(2)
    );
}

#[tokio::test]
async fn last_page_has_no_more() {
    let control = sandbox();
    let envelope = control
        .manage_board(args(json!({ "operation": "list", "startAt": 2, "maxResults": 2 })))
        .await
        .expect("boards list");
    assert_eq!(
        envelope.metadata.pagination,
        Some(Pagination::new(Page::new(2, 2), 1, 3))
    );
    assert!(envelope.metadata.pagination.is_some_and(|page| !page.has_more));
}

#[tokio::test]
async fn max_results_is_capped() {
    let control = sandbox();
    let envelope = control
        .manage_board(args(json!({ "operation": "list", "maxResults": 5000 })))
        .await
        .expect("boards list");
    assert_eq!(envelope.metadata.pagination.map(|page| page.max_results), Some(100));
}

#[tokio::test]
async fn execute_jql_pages_through_matching_issues() {
    let control = sandbox();
    let envelope = control
        .manage_filter(args(json!({
            "operation": "execute_jql",
            "jql": "project = PROJ ORDER BY created DESC",
            "maxResults": 2
        })))
        .await
        .expect("jql search");

    assert_eq!(envelope.data.as_array().map(Vec::len), Some(2));
    assert_eq!(
        envelope.metadata.pagination,
        Some(Pagination::new(Page::new(0, 2), 2, 4))
    );

    let err = control
        .manage_filter(args(json!({ "operation": "execute_jql", "jql": "labels = urgent" })))
        .await
        .expect_err("unsupported clause");
    assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
}

#[tokio::test]
async fn list_expansions_attach_to_every_item() {
    let control = sandbox();
    let envelope = control
        .manage_board(args(json!({ "operation": "list", "expand": ["sprints"] })))
        .await
        .expect("boards list");

    let boards = envelope.data.as_array().expect("list data");
    assert_eq!(boards.len(), 3);
    assert_eq!(boards[0]["sprints"]["total"], json!(3));
    assert!(boards.iter().all(|board| board.get("sprints").is_some()));
    assert_eq!(envelope.metadata.available_expansions, vec!["issues", "configuration"]);
}

#[tokio::test]
async fn list_expansion_missing_on_one_item_stays_advertised() {
    let control = sandbox();
    control
        .upstream()
        .fail_related(EntityKind::Board, "2", "sprints");
    let envelope = control
        .manage_board(args(json!({ "operation": "list", "expand": "sprints" })))
        .await
        .expect("boards list");

    let boards = envelope.data.as_array().expect("list data");
    assert!(boards[1].get("sprints").is_none());
    assert!(boards[0].get("sprints").is_some());
    assert_eq!(
        envelope.metadata.available_expansions,
        vec!["sprints", "issues", "configuration"]
    );
}

#[tokio::test]
async fn filter_results_describe_issues_not_filters() {
    let control = sandbox();
    let envelope = control
        .manage_filter(args(json!({ "operation": "execute_filter", "filterId": 10000 })))
        .await
        .expect("saved filter executes");

    assert_eq!(envelope.data[0]["key"], json!("PROJ-1"));
    assert_eq!(
        envelope.metadata.available_expansions,
        EntityKind::Issue.expansions().to_vec()
    );
    assert_eq!(envelope.summary.suggested_actions, None);

    let err = control
        .manage_filter(args(json!({
            "operation": "execute_filter",
            "filterId": 10000,
            "expand": ["issue_count"]
        })))
        .await
        .expect_err("filter tokens do not apply to issue pages");
    assert_eq!(err.kind(), ErrorKind::InvalidExpansion);
}

#[tokio::test]
async fn failing_expansion_is_omitted_but_still_advertised() {
    let control = sandbox();
    control
        .upstream()
        .fail_related(EntityKind::Issue, "PROJ-2", "comments");

    let envelope = control
        .manage_issue(args(json!({
            "operation": "get",
            "issueKey": "PROJ-2",
            "expand": "comments,transitions"
        })))
        .await
        .expect("primary entity survives a failed expansion");

    assert_eq!(envelope.data["key"], json!("PROJ-2"));
    assert!(envelope.data.get("comments").is_none());
    assert!(envelope.data.get("transitions").is_some());
    assert!(envelope.metadata.available_expansions.contains(&"comments"));
    assert!(!envelope.metadata.available_expansions.contains(&"transitions"));
}

#[tokio::test]
async fn project_administration_is_not_implemented() {
    let control = sandbox();
    let err = control
        .manage_project(args(json!({
            "operation": "delete",
            "projectKey": "OPS"
        })))
        .await
        .expect_err("project deletion is refused");

    assert_eq!(err.kind(), ErrorKind::NotYetImplemented);
    assert_eq!(err.operation(), Some("delete"));
    assert!(control.upstream().calls().is_empty());
}

#[tokio::test]
async fn upstream_not_found_is_surfaced() {
    let control = sandbox();
    let err = control
        .manage_sprint(args(json!({ "operation": "get", "sprintId": 999 })))
        .await
        .expect_err("sprint 999 does not exist");

    assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    assert!(matches!(err.upstream(), Some(UpstreamError::NotFound(_))));
}

#[tokio::test]
async fn aliases_produce_the_same_response() {
    let control = sandbox();
    let canonical = control
        .manage_issue(args(json!({ "operation": "get", "issueKey": "PROJ-3" })))
        .await
        .expect("canonical spelling");
    let snake = control
        .manage_issue(args(json!({ "operation": "get", "issue_key": "PROJ-3" })))
        .await
        .expect("snake_case spelling");
    let rest = control
        .manage_issue(args(json!({ "operation": "get", "issueIdOrKey": "PROJ-3" })))
        .await
        .expect("REST spelling");

    assert_eq!(canonical, snake);
    assert_eq!(canonical, rest);
}

#[tokio::test]
async fn issue_transition_moves_status_and_reports_it() {
    let control = sandbox();
    let envelope = control
        .manage_issue(args(json!({
            "operation": "transition",
            "issueKey": "PROJ-3",
            "transitionId": "21",
            "comment": "picking this up"
        })))
        .await
        .expect("transition applies");

    assert_eq!(envelope.data["fields"]["status"]["name"], json!("In Progress"));
    let actions: Vec<(CallMethod, Option<String>)> = control
        .upstream()
        .mutating_calls()
        .into_iter()
        .map(|call| (call.method, call.detail))
        .collect();
    assert_eq!(actions, vec![(CallMethod::Action, Some("transition".to_string()))]);
}

#[tokio::test]
async fn manage_issues_accepts_an_empty_add_list() {
    let control = sandbox();
    let envelope = control
        .manage_sprint(args(json!({
            "operation": "manage_issues",
            "sprintId": 12,
            "add": [],
            "remove": ["PROJ-2"]
        })))
        .await
        .expect("remove alone is enough");

    let mutations = control.upstream().mutating_calls();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].detail.as_deref(), Some("remove_issues"));
    let keys: Vec<&str> = envelope.data["issues"]["items"]
        .as_array()
        .expect("sprint issues attached")
        .iter()
        .filter_map(|issue| issue["key"].as_str())
        .collect();
    assert_eq!(keys, ["PROJ-3"]);

    let err = control
        .manage_sprint(args(json!({ "operation": "manage_issues", "sprintId": 12, "add": [] })))
        .await
        .expect_err("nothing to change");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
    assert_eq!(err.field(), Some("add|remove"));
}

#[tokio::test]
async fn manage_issues_attaches_sprint_issues_by_default() {
    let control = sandbox();
    let envelope = control
        .manage_sprint(args(json!({ "operation": "manage_issues", "sprintId": 12, "add": ["PROJ-4"] })))
        .await
        .expect("active sprints accept issues");

    let keys: Vec<&str> = envelope.data["issues"]["items"]
        .as_array()
        .expect("issues expansion attached")
        .iter()
        .filter_map(|issue| issue["key"].as_str())
        .collect();
    assert!(keys.contains(&"PROJ-4"));
}

#[test]
fn minimal_payloads_pass_validation() {
    for (descriptor, spec) in every_operation() {
        let bag = minimal_args(spec);
        if let Err(err) = validate(descriptor, bag) {
            panic!("{} {} rejected its minimal payload: {err}", descriptor.tool, spec.name);
        }
    }
}

#[test]
fn omitting_a_required_field_names_it() {
    for (descriptor, spec) in every_operation() {
        for rule in &spec.required {
            let mut bag = minimal_args(spec);
            bag.remove(rule.name);
            let err = validate(descriptor, bag)
                .expect_err("payload without a required field is rejected");
            assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
            assert_eq!(err.field(), Some(rule.name), "{} {}", descriptor.tool, spec.name);
        }
    }
}

#[test]
fn unknown_expansion_is_rejected_by_every_tool() {
    for (descriptor, spec) in every_operation() {
        let mut bag = minimal_args(spec);
        bag.insert("expand".to_string(), json!(["not_a_real_expansion"]));
        let err = validate(descriptor, bag).expect_err("token is unknown");
        assert_eq!(err.kind(), ErrorKind::InvalidExpansion, "{} {}", descriptor.tool, spec.name);
    }
}

#[test]
fn unknown_operation_lists_the_allowed_ones() {
    for descriptor in descriptors() {
        let err = validate(descriptor, args(json!({ "operation": "explode" })))
            .expect_err("operation is unknown");
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let message = err.to_string();
        for name in descriptor.operation_names() {
            assert!(message.contains(name), "{} missing {name}", descriptor.tool);
        }
    }
}

#[test]
fn rename_tables_are_closed() {
    for descriptor in descriptors() {
        assert!(descriptor.renames.is_closed(), "{}", descriptor.tool);
    }
}

proptest! {
    #[test]
    fn normalization_is_idempotent(
        keys in proptest::collection::vec("[a-zA-Z_]{1,16}", 0..8),
        tool in 0usize..5,
    ) {
        let descriptor = descriptors()[tool];
        let bag: ArgBag = keys
            .iter()
            .enumerate()
            .map(|(index, key)| (key.clone(), json!(index)))
            .collect();
        let once = descriptor.renames.normalize(bag);
        let twice = descriptor.renames.normalize(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn aliases_always_land_on_their_canonical_name(tool in 0usize..5, value in any::<u32>()) {
        let descriptor = descriptors()[tool];
        for (alias, canonical) in descriptor.renames.entries() {
            let mut bag = ArgBag::new();
            bag.insert((*alias).to_string(), json!(value));
            let normalized = descriptor.renames.normalize(bag);
            prop_assert_eq!(normalized.get(*canonical), Some(&json!(value)));
            prop_assert!(normalized.get(*alias).is_none());
        }
    }
}
