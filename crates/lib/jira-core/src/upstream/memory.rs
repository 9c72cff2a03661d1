//! In-process sandbox upstream.
//!
//! Holds entities in memory, derives the common relations from them, records
//! every call, and can be told to fail individual relation fetches.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::{Future, ready};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use jira_types::schema::{
    ACTION_ADD_ISSUES,
    ACTION_COMMENT,
    ACTION_LINK,
    ACTION_REMOVE_ISSUES,
    ACTION_TRANSITION,
    EXPAND_ATTACHMENTS,
    EXPAND_COMMENTS,
    EXPAND_COMPONENTS,
    EXPAND_CONFIGURATION,
    EXPAND_HISTORY,
    EXPAND_ISSUES,
    EXPAND_PERMISSIONS,
    EXPAND_RELATED_ISSUES,
    EXPAND_REPORT,
    EXPAND_SPRINTS,
    EXPAND_TRANSITIONS,
    EXPAND_VERSIONS,
    FILTER_BOARD_ID,
    FILTER_JQL,
    FILTER_NAME,
    FILTER_PROJECT_KEY,
    FILTER_QUERY,
    FILTER_STATE,
    FILTER_TYPE,
};
use jira_types::{EntityKind, scalar_string, value_at};
use regex::Regex;
use serde_json::{Map, Value, json};

use super::{ListPage, ListQuery, RelatedRef, Upstream, UpstreamError, UpstreamResult};

static JQL_AND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").expect("valid JQL conjunction pattern"));
static JQL_ORDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*order\s+by\s+.*$").expect("valid JQL ordering pattern"));

/// Workflow used for issues without stored transitions.
const WORKFLOW: &[(&str, &str, &str)] = &[
    ("11", "To Do", "new"),
    ("21", "In Progress", "indeterminate"),
    ("31", "Done", "done"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallMethod {
    Fetch,
    FetchRelated,
    List,
    Create,
    Mutate,
    Delete,
    Action,
}

impl CallMethod {
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(self, Self::Create | Self::Mutate | Self::Delete | Self::Action)
    }
}

/// One recorded upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamCall {
    pub method: CallMethod,
    pub kind: EntityKind,
    pub id: Option<String>,
    /// Relation or action name.
    pub detail: Option<String>,
}

type RelationKey = (EntityKind, String, String);

#[derive(Debug, Default)]
struct MemoryState {
    entities: BTreeMap<EntityKind, Vec<Value>>,
    related: HashMap<RelationKey, Value>,
    failing: HashSet<RelationKey>,
    calls: Vec<UpstreamCall>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct MemoryUpstream {
    state: Mutex<MemoryState>,
}

impl MemoryUpstream {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 20_000,
                ..MemoryState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_entity(self, kind: EntityKind, entity: Value) -> Self {
        self.insert(kind, entity);
        self
    }

    pub fn insert(&self, kind: EntityKind, entity: Value) {
        self.lock().entities.entry(kind).or_default().push(entity);
    }

    #[must_use]
    pub fn with_related(self, kind: EntityKind, id: &str, relation: &str, payload: Value) -> Self {
        self.set_related(kind, id, relation, payload);
        self
    }

    pub fn set_related(&self, kind: EntityKind, id: &str, relation: &str, payload: Value) {
        self.lock()
            .related
            .insert((kind, id.to_string(), relation.to_string()), payload);
    }

    /// Makes every later fetch of this relation fail with a network error.
    pub fn fail_related(&self, kind: EntityKind, id: &str, relation: &str) {
        self.lock()
            .failing
            .insert((kind, id.to_string(), relation.to_string()));
    }

    /// Current copy of a stored entity.
    #[must_use]
    pub fn entity(&self, kind: EntityKind, id: &str) -> Option<Value> {
        self.lock().find(kind, id).cloned()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<UpstreamCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn mutating_calls(&self) -> Vec<UpstreamCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method.is_mutating())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Demo dataset served by the daemon's sandbox mode.
    #[must_use]
    pub fn sample() -> Self {
        let upstream = Self::new()
            .with_entity(
                EntityKind::Project,
                json!({
                    "id": "10000",
                    "key": "PROJ",
                    "name": "Demo Project",
                    "projectTypeKey": "software",
                    "lead": { "displayName": "Avery Admin" }
                }),
            )
            .with_entity(
                EntityKind::Project,
                json!({
                    "id": "10001",
                    "key": "OPS",
                    "name": "Operations",
                    "projectTypeKey": "service_desk"
                }),
            )
            .with_entity(
                EntityKind::Board,
                json!({
                    "id": 1,
                    "name": "PROJ delivery",
                    "type": "scrum",
                    "filterId": 10000,
                    "location": { "projectKey": "PROJ" }
                }),
            )
            .with_entity(
                EntityKind::Board,
                json!({
                    "id": 2,
                    "name": "PROJ flow",
                    "type": "kanban",
                    "filterId": 10000,
                    "location": { "projectKey": "PROJ" }
                }),
            )
            .with_entity(
                EntityKind::Board,
                json!({
                    "id": 3,
                    "name": "OPS queue",
                    "type": "kanban",
                    "filterId": 10001,
                    "location": { "projectKey": "OPS" }
                }),
            )
            .with_entity(
                EntityKind::Sprint,
                json!({ "id": 11, "name": "Sprint 1", "state": "closed", "originBoardId": 1,
                        "goal": "Ship login" }),
            )
            .with_entity(
                EntityKind::Sprint,
                json!({ "id": 12, "name": "Sprint 2", "state": "active", "originBoardId": 1,
                        "goal": "Harden auth" }),
            )
            .with_entity(
                EntityKind::Sprint,
                json!({ "id": 13, "name": "Sprint 3", "state": "future", "originBoardId": 1 }),
            )
            .with_entity(
                EntityKind::Filter,
                json!({ "id": "10000", "name": "PROJ board filter",
                        "jql": "project = PROJ ORDER BY Rank ASC", "favourite": true }),
            )
            .with_entity(
                EntityKind::Filter,
                json!({ "id": "10001", "name": "OPS queue filter", "jql": "project = OPS" }),
            )
            .with_related(
                EntityKind::Project,
                "PROJ",
                EXPAND_COMPONENTS,
                json!([{ "id": "100", "name": "auth" }, { "id": "101", "name": "billing" }]),
            )
            .with_related(
                EntityKind::Project,
                "PROJ",
                EXPAND_VERSIONS,
                json!([{ "id": "200", "name": "1.0", "released": true }]),
            );

        let issues = [
            ("PROJ-1", "Login page", "Story", WORKFLOW[2], Some(11)),
            ("PROJ-2", "Password reset", "Story", WORKFLOW[1], Some(12)),
            ("PROJ-3", "Session timeout bug", "Bug", WORKFLOW[0], Some(12)),
            ("PROJ-4", "Billing export", "Task", WORKFLOW[0], None),
            ("OPS-1", "Rotate certificates", "Task", WORKFLOW[1], None),
        ];
        for (index, (key, summary, issue_type, (_, status, category), sprint)) in
            issues.into_iter().enumerate()
        {
            let project = key.split('-').next().unwrap_or_default();
            let mut fields = json!({
                "summary": summary,
                "issuetype": { "name": issue_type },
                "project": { "key": project },
                "status": { "name": status, "statusCategory": { "key": category } },
                "labels": [],
            });
            if let (Some(sprint), Some(object)) = (sprint, fields.as_object_mut()) {
                object.insert("sprint".to_string(), json!({ "id": sprint }));
            }
            upstream.insert(
                EntityKind::Issue,
                json!({ "id": (10_100 + index).to_string(), "key": key, "fields": fields }),
            );
        }
        upstream
    }

    fn record(&self, method: CallMethod, kind: EntityKind, id: Option<&str>, detail: Option<&str>) {
        self.lock().calls.push(UpstreamCall {
            method,
            kind,
            id: id.map(str::to_string),
            detail: detail.map(str::to_string),
        });
    }

    fn fetch_now(&self, kind: EntityKind, id: &str) -> UpstreamResult<Value> {
        self.record(CallMethod::Fetch, kind, Some(id), None);
        self.lock()
            .find(kind, id)
            .cloned()
            .ok_or_else(|| not_found(kind, id))
    }

    fn fetch_related_now(&self, target: &RelatedRef) -> UpstreamResult<Value> {
        self.record(
            CallMethod::FetchRelated,
            target.kind,
            Some(&target.id),
            Some(target.relation),
        );
        let state = self.lock();
        let key = (target.kind, target.id.clone(), target.relation.to_string());
        if state.failing.contains(&key) {
            return Err(UpstreamError::Network(format!("injected failure for {target}")));
        }
        if let Some(stored) = state.related.get(&key) {
            return Ok(stored.clone());
        }
        state.derive_related(target)
    }

    fn list_now(&self, kind: EntityKind, query: &ListQuery) -> UpstreamResult<ListPage> {
        self.record(CallMethod::List, kind, None, None);
        let state = self.lock();
        let matcher = ListMatcher::new(kind, query)?;
        let matched: Vec<&Value> = state
            .all(kind)
            .iter()
            .filter(|item| matcher.matches(item))
            .collect();
        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(usize::try_from(query.page.start_at).unwrap_or(usize::MAX))
            .take(usize::try_from(query.page.max_results).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(ListPage { items, total })
    }

    fn create_now(&self, kind: EntityKind, payload: Value) -> UpstreamResult<Value> {
        self.record(CallMethod::Create, kind, None, None);
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        let Value::Object(mut entity) = payload else {
            return Err(UpstreamError::rejected("payload must be an object"));
        };
        match kind {
            EntityKind::Issue => {
                let project = entity
                    .get("fields")
                    .and_then(|fields| value_at(fields, &["project", "key"]))
                    .and_then(Value::as_str)
                    .ok_or_else(|| UpstreamError::rejected("fields.project.key is required"))?
                    .to_string();
                let number = state.next_issue_number(&project);
                entity.insert("id".to_string(), json!(id.to_string()));
                entity.insert("key".to_string(), json!(format!("{project}-{number}")));
                if let Some(fields) = entity.get_mut("fields").and_then(Value::as_object_mut) {
                    let (_, name, category) = WORKFLOW[0];
                    fields.entry("status").or_insert_with(|| {
                        json!({ "name": name, "statusCategory": { "key": category } })
                    });
                }
            }
            EntityKind::Sprint => {
                entity.insert("id".to_string(), json!(id));
                entity.insert("state".to_string(), json!("future"));
            }
            EntityKind::Board => {
                entity.insert("id".to_string(), json!(id));
                let project = entity
                    .remove("location")
                    .as_ref()
                    .and_then(|location| location.get("projectKeyOrId"))
                    .and_then(scalar_string);
                if let Some(project) = project {
                    entity.insert("location".to_string(), json!({ "projectKey": project }));
                }
            }
            EntityKind::Filter => {
                entity.insert("id".to_string(), json!(id.to_string()));
            }
            EntityKind::Project => {
                entity
                    .entry("id")
                    .or_insert_with(|| json!(id.to_string()));
            }
        }
        let entity = Value::Object(entity);
        state.entities.entry(kind).or_default().push(entity.clone());
        Ok(entity)
    }

    fn mutate_now(&self, kind: EntityKind, id: &str, patch: Value) -> UpstreamResult<Value> {
        self.record(CallMethod::Mutate, kind, Some(id), None);
        let mut state = self.lock();
        let entity = state.find_mut(kind, id).ok_or_else(|| not_found(kind, id))?;
        merge(entity, patch);
        Ok(entity.clone())
    }

    fn delete_now(&self, kind: EntityKind, id: &str) -> UpstreamResult<()> {
        self.record(CallMethod::Delete, kind, Some(id), None);
        let mut state = self.lock();
        let items = state.entities.entry(kind).or_default();
        let before = items.len();
        items.retain(|item| !matches_id(kind, item, id));
        if items.len() == before {
            return Err(not_found(kind, id));
        }
        Ok(())
    }

    fn perform_action_now(
        &self,
        kind: EntityKind,
        id: &str,
        action: &str,
        payload: &Value,
    ) -> UpstreamResult<()> {
        self.record(CallMethod::Action, kind, Some(id), Some(action));
        let mut state = self.lock();
        if state.find(kind, id).is_none() {
            return Err(not_found(kind, id));
        }
        match (kind, action) {
            (EntityKind::Issue, ACTION_TRANSITION) => state.transition_issue(id, payload),
            (EntityKind::Issue, ACTION_COMMENT) => {
                let body = payload.get("body").cloned().unwrap_or(Value::Null);
                state.append_comment(id, body);
                Ok(())
            }
            (EntityKind::Issue, ACTION_LINK) => state.link_issues(payload),
            (EntityKind::Sprint, ACTION_ADD_ISSUES) => {
                let sprint = json!({ "id": parse_number(id) });
                state.assign_sprint(payload, Some(&sprint), None)
            }
            (EntityKind::Sprint, ACTION_REMOVE_ISSUES) => state.assign_sprint(payload, None, Some(id)),
            _ => Err(UpstreamError::rejected(format!(
                "{kind} does not support action '{action}'"
            ))),
        }
    }
}

impl MemoryState {
    fn all(&self, kind: EntityKind) -> &[Value] {
        self.entities.get(&kind).map_or(&[], Vec::as_slice)
    }

    fn find(&self, kind: EntityKind, id: &str) -> Option<&Value> {
        self.all(kind).iter().find(|item| matches_id(kind, item, id))
    }

    fn find_mut(&mut self, kind: EntityKind, id: &str) -> Option<&mut Value> {
        self.entities
            .get_mut(&kind)?
            .iter_mut()
            .find(|item| matches_id(kind, item, id))
    }

    fn next_issue_number(&self, project: &str) -> u64 {
        let prefix = format!("{project}-");
        self.all(EntityKind::Issue)
            .iter()
            .filter_map(|issue| issue.get("key").and_then(Value::as_str))
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|number| number.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }

    fn issues_in_sprints(&self, sprint_ids: &[String]) -> Vec<Value> {
        self.all(EntityKind::Issue)
            .iter()
            .filter(|issue| {
                value_at(issue, &["fields", "sprint", "id"])
                    .and_then(scalar_string)
                    .is_some_and(|sprint| sprint_ids.contains(&sprint))
            })
            .cloned()
            .collect()
    }

    fn sprints_of_board(&self, board_id: &str) -> Vec<Value> {
        self.all(EntityKind::Sprint)
            .iter()
            .filter(|sprint| {
                sprint
                    .get("originBoardId")
                    .and_then(scalar_string)
                    .is_some_and(|origin| origin == board_id)
            })
            .cloned()
            .collect()
    }

    fn derive_related(&self, target: &RelatedRef) -> UpstreamResult<Value> {
        let entity = self
            .find(target.kind, &target.id)
            .ok_or_else(|| not_found(target.kind, &target.id))?;
        let missing = || {
            UpstreamError::NotFound(format!("{} of {} {}", target.relation, target.kind, target.id))
        };
        match (target.kind, target.relation) {
            (EntityKind::Issue, EXPAND_COMMENTS) => Ok(json!({ "comments": [], "total": 0 })),
            (EntityKind::Issue, EXPAND_TRANSITIONS) => Ok(json!({ "transitions": workflow_transitions() })),
            (EntityKind::Issue, EXPAND_ATTACHMENTS) => Ok(value_at(entity, &["fields", "attachment"])
                .cloned()
                .unwrap_or_else(|| json!([]))),
            (EntityKind::Issue, EXPAND_RELATED_ISSUES) => {
                let pick = |name: &str, empty: Value| {
                    value_at(entity, &["fields", name]).cloned().unwrap_or(empty)
                };
                Ok(json!({
                    "parent": pick("parent", Value::Null),
                    "subtasks": pick("subtasks", json!([])),
                    "issuelinks": pick("issuelinks", json!([])),
                }))
            }
            (EntityKind::Issue, EXPAND_HISTORY) => Ok(json!({ "values": [], "total": 0 })),
            (EntityKind::Sprint, EXPAND_ISSUES) => {
                Ok(items_and_total(self.issues_in_sprints(&[target.id.clone()])))
            }
            (EntityKind::Sprint, EXPAND_REPORT) => {
                let issues = self.issues_in_sprints(&[target.id.clone()]);
                let (completed, incomplete): (Vec<Value>, Vec<Value>) =
                    issues.into_iter().partition(|issue| {
                        value_at(issue, &["fields", "status", "statusCategory", "key"])
                            .and_then(Value::as_str)
                            == Some("done")
                    });
                Ok(json!({
                    "sprint": entity,
                    "completedIssues": completed,
                    "issuesNotCompletedInCurrentSprint": incomplete,
                }))
            }
            (EntityKind::Board, EXPAND_SPRINTS) => Ok(items_and_total(self.sprints_of_board(&target.id))),
            (EntityKind::Board, EXPAND_ISSUES) => {
                let sprint_ids: Vec<String> = self
                    .sprints_of_board(&target.id)
                    .iter()
                    .filter_map(|sprint| sprint.get("id").and_then(scalar_string))
                    .collect();
                Ok(items_and_total(self.issues_in_sprints(&sprint_ids)))
            }
            (EntityKind::Board, EXPAND_CONFIGURATION) => Ok(json!({
                "id": entity.get("id"),
                "name": entity.get("name"),
                "filter": { "id": entity.get("filterId") },
                "columnConfig": {
                    "columns": WORKFLOW
                        .iter()
                        .map(|(_, name, _)| json!({ "name": name }))
                        .collect::<Vec<_>>()
                },
            })),
            (EntityKind::Project, EXPAND_COMPONENTS | EXPAND_VERSIONS)
            | (EntityKind::Filter, EXPAND_PERMISSIONS) => Ok(json!([])),
            _ => Err(missing()),
        }
    }

    fn transition_issue(&mut self, key: &str, payload: &Value) -> UpstreamResult<()> {
        let requested = value_at(payload, &["transition", "id"])
            .and_then(scalar_string)
            .ok_or_else(|| UpstreamError::rejected("transition.id is required"))?;
        let (_, name, category) = WORKFLOW
            .iter()
            .find(|(id, _, _)| *id == requested)
            .ok_or_else(|| UpstreamError::rejected(format!("transition {requested} is not available")))?;
        if let Some(fields) = self
            .find_mut(EntityKind::Issue, key)
            .and_then(|issue| issue.get_mut("fields"))
            .and_then(Value::as_object_mut)
        {
            fields.insert(
                "status".to_string(),
                json!({ "name": name, "statusCategory": { "key": category } }),
            );
        }
        if let Some(body) = payload.get("comment").cloned() {
            self.append_comment(key, body);
        }
        Ok(())
    }

    fn append_comment(&mut self, key: &str, body: Value) {
        let relation = (EntityKind::Issue, key.to_string(), EXPAND_COMMENTS.to_string());
        let entry = self
            .related
            .entry(relation)
            .or_insert_with(|| json!({ "comments": [], "total": 0 }));
        if let Value::Array(seeded) = entry {
            let comments = std::mem::take(seeded);
            let total = comments.len();
            *entry = json!({ "comments": comments, "total": total });
        }
        if let Some(comments) = entry.get_mut("comments").and_then(Value::as_array_mut) {
            let id = (comments.len() + 1).to_string();
            comments.push(json!({ "id": id, "body": body }));
            let total = comments.len();
            entry["total"] = json!(total);
        }
    }

    fn link_issues(&mut self, payload: &Value) -> UpstreamResult<()> {
        let inward = value_at(payload, &["inwardIssue", "key"]).and_then(Value::as_str);
        let outward = value_at(payload, &["outwardIssue", "key"]).and_then(Value::as_str);
        let (Some(inward), Some(outward)) = (inward.map(str::to_string), outward.map(str::to_string))
        else {
            return Err(UpstreamError::rejected("inwardIssue and outwardIssue are required"));
        };
        if self.find(EntityKind::Issue, &outward).is_none() {
            return Err(not_found(EntityKind::Issue, &outward));
        }
        let link_type = payload.get("type").cloned().unwrap_or(Value::Null);
        if let Some(fields) = self
            .find_mut(EntityKind::Issue, &inward)
            .and_then(|issue| issue.get_mut("fields"))
            .and_then(Value::as_object_mut)
        {
            let links = fields.entry("issuelinks").or_insert_with(|| json!([]));
            if let Some(links) = links.as_array_mut() {
                links.push(json!({ "type": link_type, "outwardIssue": { "key": outward } }));
            }
        }
        if let Some(body) = value_at(payload, &["comment", "body"]).cloned() {
            self.append_comment(&inward, body);
        }
        Ok(())
    }

    fn assign_sprint(
        &mut self,
        payload: &Value,
        sprint: Option<&Value>,
        only_from: Option<&str>,
    ) -> UpstreamResult<()> {
        let keys: Vec<String> = payload
            .get("issues")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(scalar_string).collect())
            .unwrap_or_default();
        if let Some(missing) = keys.iter().find(|key| self.find(EntityKind::Issue, key).is_none()) {
            return Err(not_found(EntityKind::Issue, missing));
        }
        for key in &keys {
            let Some(fields) = self
                .find_mut(EntityKind::Issue, key)
                .and_then(|issue| issue.get_mut("fields"))
                .and_then(Value::as_object_mut)
            else {
                continue;
            };
            match sprint {
                Some(sprint) => {
                    fields.insert("sprint".to_string(), sprint.clone());
                }
                None => {
                    let current = fields
                        .get("sprint")
                        .and_then(|sprint| sprint.get("id"))
                        .and_then(scalar_string);
                    if only_from.is_none() || current.as_deref() == only_from {
                        fields.remove("sprint");
                    }
                }
            }
        }
        Ok(())
    }
}

/// One `path = value` condition of a list filter.
struct Clause {
    paths: Vec<&'static [&'static str]>,
    accepted: Vec<String>,
    partial: bool,
}

impl Clause {
    fn exact(path: &'static [&'static str], accepted: Vec<String>) -> Self {
        Self {
            paths: vec![path],
            accepted,
            partial: false,
        }
    }

    fn matches(&self, item: &Value) -> bool {
        self.paths.iter().any(|path| {
            value_at(item, path)
                .and_then(scalar_string)
                .is_some_and(|found| {
                    self.accepted.iter().any(|accepted| {
                        if self.partial {
                            found.to_lowercase().contains(&accepted.to_lowercase())
                        } else {
                            found.eq_ignore_ascii_case(accepted)
                        }
                    })
                })
        })
    }
}

/// Filter predicate for one list call.
struct ListMatcher {
    clauses: Vec<Clause>,
}

impl ListMatcher {
    fn new(kind: EntityKind, query: &ListQuery) -> UpstreamResult<Self> {
        const NAME: &[&str] = &["name"];
        const KEY: &[&str] = &["key"];

        let mut clauses = Vec::new();
        let text = |key: &str| query.filter_string(key);
        let partial = |paths: Vec<&'static [&'static str]>, value| Clause {
            paths,
            accepted: vec![value],
            partial: true,
        };
        match kind {
            EntityKind::Sprint => {
                if let Some(board) = text(FILTER_BOARD_ID) {
                    clauses.push(Clause::exact(&["originBoardId"], vec![board]));
                }
                if let Some(states) = text(FILTER_STATE) {
                    let states = states.split(',').map(|s| s.trim().to_string()).collect();
                    clauses.push(Clause::exact(&["state"], states));
                }
            }
            EntityKind::Board => {
                if let Some(project) = text(FILTER_PROJECT_KEY) {
                    clauses.push(Clause::exact(&["location", "projectKey"], vec![project]));
                }
                if let Some(board_type) = text(FILTER_TYPE) {
                    clauses.push(Clause::exact(&["type"], vec![board_type]));
                }
                if let Some(name) = text(FILTER_NAME) {
                    clauses.push(partial(vec![NAME], name));
                }
            }
            EntityKind::Project => {
                if let Some(query) = text(FILTER_QUERY) {
                    clauses.push(partial(vec![NAME, KEY], query));
                }
            }
            EntityKind::Filter => {
                if let Some(name) = text(FILTER_NAME) {
                    clauses.push(partial(vec![NAME], name));
                }
            }
            EntityKind::Issue => {
                if let Some(jql) = text(FILTER_JQL) {
                    clauses.extend(parse_jql(&jql)?);
                }
            }
        }
        Ok(Self { clauses })
    }

    fn matches(&self, item: &Value) -> bool {
        self.clauses.iter().all(|clause| clause.matches(item))
    }
}

/// Understands `field = value` clauses joined by AND, which covers the
/// queries the tools themselves issue.
fn parse_jql(jql: &str) -> UpstreamResult<Vec<Clause>> {
    let stripped = JQL_ORDER_RE.replace(jql.trim(), "");
    if stripped.trim().is_empty() {
        return Ok(Vec::new());
    }
    JQL_AND_RE
        .split(stripped.trim())
        .map(|clause| {
            let (field, value) = clause
                .split_once('=')
                .ok_or_else(|| UpstreamError::rejected(format!("unsupported JQL clause: {clause}")))?;
            let value = value.trim().trim_matches('"').to_string();
            let path: &'static [&'static str] = match field.trim().to_lowercase().as_str() {
                "project" => &["fields", "project", "key"],
                "sprint" => &["fields", "sprint", "id"],
                "status" => &["fields", "status", "name"],
                "assignee" => &["fields", "assignee", "accountId"],
                "issuetype" | "type" => &["fields", "issuetype", "name"],
                "key" | "issuekey" => &["key"],
                other => {
                    return Err(UpstreamError::rejected(format!("unsupported JQL field: {other}")));
                }
            };
            Ok(Clause::exact(path, vec![value]))
        })
        .collect()
}

fn matches_id(kind: EntityKind, item: &Value, id: &str) -> bool {
    let by_field = |field: &str| item.get(field).and_then(scalar_string).is_some_and(|v| v == id);
    by_field(kind.id_field()) || by_field("id")
}

fn not_found(kind: EntityKind, id: &str) -> UpstreamError {
    UpstreamError::NotFound(format!("{kind} {id}"))
}

fn parse_number(id: &str) -> Value {
    id.parse::<u64>().map_or_else(|_| json!(id), |number| json!(number))
}

fn items_and_total(items: Vec<Value>) -> Value {
    let total = items.len();
    json!({ "items": items, "total": total })
}

fn workflow_transitions() -> Vec<Value> {
    WORKFLOW
        .iter()
        .map(|(id, name, category)| {
            json!({
                "id": id,
                "name": name,
                "to": { "name": name, "statusCategory": { "key": category } }
            })
        })
        .collect()
}

/// Shallow merge, one level deeper for an issue's `fields`.
fn merge(entity: &mut Value, patch: Value) {
    let (Some(target), Value::Object(patch)) = (entity.as_object_mut(), patch) else {
        return;
    };
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) if key == "fields" => {
                merge_map(existing, nested);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn merge_map(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

impl Upstream for MemoryUpstream {
    fn fetch(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> impl Future<Output = UpstreamResult<Value>> + Send {
        ready(self.fetch_now(kind, id))
    }

    fn fetch_related(
        &self,
        target: &RelatedRef,
    ) -> impl Future<Output = UpstreamResult<Value>> + Send {
        ready(self.fetch_related_now(target))
    }

    fn list(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> impl Future<Output = UpstreamResult<ListPage>> + Send {
        ready(self.list_now(kind, query))
    }

    fn create(
        &self,
        kind: EntityKind,
        payload: Value,
    ) -> impl Future<Output = UpstreamResult<Value>> + Send {
        ready(self.create_now(kind, payload))
    }

    fn mutate(
        &self,
        kind: EntityKind,
        id: &str,
        patch: Value,
    ) -> impl Future<Output = UpstreamResult<Value>> + Send {
        ready(self.mutate_now(kind, id, patch))
    }

    fn delete(&self, kind: EntityKind, id: &str) -> impl Future<Output = UpstreamResult<()>> + Send {
        ready(self.delete_now(kind, id))
    }

    fn perform_action(
        &self,
        kind: EntityKind,
        id: &str,
        action: &str,
        payload: Value,
    ) -> impl Future<Output = UpstreamResult<()>> + Send {
        ready(self.perform_action_now(kind, id, action, &payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::Page;

    #[test]
    fn calls_are_recorded_in_order() {
        let upstream = MemoryUpstream::sample();
        let _ = upstream.fetch_now(EntityKind::Sprint, "12");
        let _ = upstream.perform_action_now(
            EntityKind::Sprint,
            "12",
            ACTION_ADD_ISSUES,
            &json!({ "issues": ["PROJ-4"] }),
        );

        let calls = upstream.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, CallMethod::Fetch);
        assert_eq!(upstream.mutating_calls().len(), 1);
        assert_eq!(
            upstream
                .entity(EntityKind::Issue, "PROJ-4")
                .and_then(|issue| value_at(&issue, &["fields", "sprint", "id"]).cloned()),
            Some(json!(12))
        );
    }

    #[test]
    fn jql_filters_by_project_and_sprint() {
        let upstream = MemoryUpstream::sample();
        let query = ListQuery::new(Page::default())
            .with_filter(FILTER_JQL, "project = PROJ AND sprint = 12 ORDER BY rank");
        let page = upstream.list_now(EntityKind::Issue, &query).expect("list succeeds");
        assert_eq!(page.total, 2);
    }

    #[test]
    fn unsupported_jql_is_rejected() {
        let upstream = MemoryUpstream::sample();
        let query = ListQuery::new(Page::default()).with_filter(FILTER_JQL, "text ~ login");
        let err = upstream.list_now(EntityKind::Issue, &query).expect_err("~ is unsupported");
        assert_eq!(err.class(), "rejected");
    }

    #[test]
    fn transition_moves_status() {
        let upstream = MemoryUpstream::sample();
        upstream
            .perform_action_now(
                EntityKind::Issue,
                "PROJ-3",
                ACTION_TRANSITION,
                &json!({ "transition": { "id": "31" } }),
            )
            .expect("transition succeeds");
        let issue = upstream.entity(EntityKind::Issue, "PROJ-3").expect("issue exists");
        assert_eq!(issue["fields"]["status"]["name"], "Done");
    }

    #[test]
    fn created_issue_gets_next_key() {
        let upstream = MemoryUpstream::sample();
        let created = upstream
            .create_now(
                EntityKind::Issue,
                json!({ "fields": { "project": { "key": "PROJ" }, "summary": "New" } }),
            )
            .expect("create succeeds");
        assert_eq!(created["key"], "PROJ-5");
        assert_eq!(created["fields"]["status"]["name"], "To Do");
    }

    #[test]
    fn injected_failure_wins_over_stored_payload() {
        let upstream = MemoryUpstream::sample();
        let target = RelatedRef::new(EntityKind::Project, "PROJ", EXPAND_COMPONENTS);
        assert!(upstream.fetch_related_now(&target).is_ok());
        upstream.fail_related(EntityKind::Project, "PROJ", EXPAND_COMPONENTS);
        let err = upstream.fetch_related_now(&target).expect_err("failure injected");
        assert_eq!(err.class(), "network");
    }

    #[test]
    fn comment_appends_to_a_seeded_comment_array() {
        let upstream = MemoryUpstream::sample().with_related(
            EntityKind::Issue,
            "PROJ-1",
            EXPAND_COMMENTS,
            json!([{ "id": "1", "body": "first" }]),
        );
        upstream
            .perform_action_now(
                EntityKind::Issue,
                "PROJ-1",
                ACTION_COMMENT,
                &json!({ "body": "second" }),
            )
            .expect("comment succeeds");

        let comments = upstream
            .fetch_related_now(&RelatedRef::new(EntityKind::Issue, "PROJ-1", EXPAND_COMMENTS))
            .expect("comments fetch");
        assert_eq!(comments["total"], json!(2));
        assert_eq!(comments["comments"][0]["body"], "first");
        assert_eq!(comments["comments"][1]["body"], "second");
    }
}
