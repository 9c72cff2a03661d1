//! Jira Cloud REST upstream.
//!
//! Platform entities (issues, projects, filters) go through REST v3, agile
//! entities (boards, sprints) through Agile 1.0. Every response status is
//! classified into an [`UpstreamError`]; nothing is retried.

use std::time::Duration;

use jira_types::EntityKind;
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
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

use super::{ListPage, ListQuery, RelatedRef, Upstream, UpstreamError, UpstreamResult};

const PLATFORM: &str = "/rest/api/3";
const AGILE: &str = "/rest/agile/1.0";
const GREENHOPPER: &str = "/rest/greenhopper/1.0";

/// Connection settings for [`JiraRestClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestClientConfig {
    /// Site root, e.g. `https://example.atlassian.net`.
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub timeout: Duration,
}

impl RestClientConfig {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            email: email.into(),
            api_token: api_token.into(),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct JiraRestClient {
    http: Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl JiraRestClient {
    /// Builds the HTTP client.
    ///
    /// # Errors
    /// Returns `UpstreamError::Network` if the TLS backend cannot be
    /// initialised.
    pub fn new(config: RestClientConfig) -> UpstreamResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email,
            api_token: config.api_token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .basic_auth(&self.email, Some(&self.api_token))
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> UpstreamResult<Option<Value>> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        debug!(resource, status = status.as_u16(), "upstream response");
        if status.is_success() {
            let bytes = response.bytes().await.map_err(map_reqwest_error)?;
            if bytes.is_empty() {
                return Ok(None);
            }
            return serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|err| UpstreamError::Decode(err.to_string()));
        }
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, retry_after, resource, &body))
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> UpstreamResult<Value> {
        let request = self.request(Method::GET, path).query(query);
        self.send(request, path).await.map(Option::unwrap_or_default)
    }

    async fn send_json(&self, method: Method, path: &str, body: &Value) -> UpstreamResult<Value> {
        let request = self.request(method, path).json(body);
        self.send(request, path).await.map(Option::unwrap_or_default)
    }

    async fn fetch_entity(&self, kind: EntityKind, id: &str) -> UpstreamResult<Value> {
        self.get(&entity_path(kind, id), &[]).await
    }

    async fn fetch_related_entity(&self, target: &RelatedRef) -> UpstreamResult<Value> {
        let base = entity_path(target.kind, &target.id);
        match (target.kind, target.relation) {
            (EntityKind::Issue, EXPAND_COMMENTS) => self.get(&format!("{base}/comment"), &[]).await,
            (EntityKind::Issue, EXPAND_TRANSITIONS) => {
                self.get(&format!("{base}/transitions"), &[]).await
            }
            (EntityKind::Issue, EXPAND_HISTORY) => self.get(&format!("{base}/changelog"), &[]).await,
            (EntityKind::Issue, EXPAND_ATTACHMENTS) => {
                let issue = self.get(&base, &[("fields", "attachment".to_string())]).await?;
                Ok(issue
                    .pointer("/fields/attachment")
                    .cloned()
                    .unwrap_or_else(|| json!([])))
            }
            (EntityKind::Issue, EXPAND_RELATED_ISSUES) => {
                let issue = self
                    .get(&base, &[("fields", "issuelinks,subtasks,parent".to_string())])
                    .await?;
                let pick = |name: &str, empty: Value| {
                    issue
                        .get("fields")
                        .and_then(|fields| fields.get(name))
                        .cloned()
                        .unwrap_or(empty)
                };
                Ok(json!({
                    "parent": pick("parent", Value::Null),
                    "subtasks": pick("subtasks", json!([])),
                    "issuelinks": pick("issuelinks", json!([])),
                }))
            }
            (EntityKind::Sprint | EntityKind::Board, EXPAND_ISSUES) => {
                let page = self.get(&format!("{base}/issue"), &[]).await?;
                Ok(items_and_total(&page, "issues"))
            }
            (EntityKind::Sprint, EXPAND_REPORT) => {
                let board = target.scope.as_deref().ok_or_else(|| {
                    UpstreamError::rejected(format!("{target} needs the sprint's board"))
                })?;
                self.get(
                    &format!("{GREENHOPPER}/rapid/charts/sprintreport"),
                    &[
                        ("rapidViewId", board.to_string()),
                        ("sprintId", target.id.clone()),
                    ],
                )
                .await
            }
            (EntityKind::Board, EXPAND_SPRINTS) => {
                let page = self.get(&format!("{base}/sprint"), &[]).await?;
                Ok(items_and_total(&page, "values"))
            }
            (EntityKind::Board, EXPAND_CONFIGURATION) => {
                self.get(&format!("{base}/configuration"), &[]).await
            }
            (EntityKind::Project, EXPAND_COMPONENTS) => {
                self.get(&format!("{base}/components"), &[]).await
            }
            (EntityKind::Project, EXPAND_VERSIONS) => self.get(&format!("{base}/versions"), &[]).await,
            (EntityKind::Filter, EXPAND_PERMISSIONS) => {
                self.get(&format!("{base}/permission"), &[]).await
            }
            _ => Err(UpstreamError::NotFound(format!("relation {target}"))),
        }
    }

    async fn list_entities(&self, kind: EntityKind, query: &ListQuery) -> UpstreamResult<ListPage> {
        let mut params = vec![
            ("startAt", query.page.start_at.to_string()),
            ("maxResults", query.page.max_results.to_string()),
        ];
        let mut push = |name: &'static str, key: &str| {
            if let Some(value) = query.filter_string(key) {
                params.push((name, value));
            }
        };
        let (path, items_key) = match kind {
            EntityKind::Issue => {
                push("jql", FILTER_JQL);
                (format!("{PLATFORM}/search"), "issues")
            }
            EntityKind::Sprint => {
                push("state", FILTER_STATE);
                let board = query.filter_string(FILTER_BOARD_ID).ok_or_else(|| {
                    UpstreamError::rejected("listing sprints requires a board id")
                })?;
                (format!("{AGILE}/board/{board}/sprint"), "values")
            }
            EntityKind::Board => {
                push("projectKeyOrId", FILTER_PROJECT_KEY);
                push("type", FILTER_TYPE);
                push("name", FILTER_NAME);
                (format!("{AGILE}/board"), "values")
            }
            EntityKind::Project => {
                push("query", FILTER_QUERY);
                (format!("{PLATFORM}/project/search"), "values")
            }
            EntityKind::Filter => {
                push("filterName", FILTER_NAME);
                (format!("{PLATFORM}/filter/search"), "values")
            }
        };
        let page = self.get(&path, &params).await?;
        Ok(list_page(&page, items_key, query.page.start_at))
    }

    async fn create_entity(&self, kind: EntityKind, payload: Value) -> UpstreamResult<Value> {
        let path = collection_path(kind);
        match kind {
            EntityKind::Issue => {
                let created = self
                    .send_json(Method::POST, &path, &with_adf_description(payload))
                    .await?;
                let key = created
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| UpstreamError::Decode("created issue has no key".to_string()))?;
                self.fetch_entity(kind, key).await
            }
            _ => self.send_json(Method::POST, &path, &payload).await,
        }
    }

    async fn mutate_entity(&self, kind: EntityKind, id: &str, patch: Value) -> UpstreamResult<Value> {
        let path = entity_path(kind, id);
        match kind {
            EntityKind::Issue => {
                self.send_json(Method::PUT, &path, &with_adf_description(patch))
                    .await?;
                self.fetch_entity(kind, id).await
            }
            // Agile sprint endpoint treats POST as a partial update.
            EntityKind::Sprint => self.send_json(Method::POST, &path, &patch).await,
            EntityKind::Filter | EntityKind::Project => {
                self.send_json(Method::PUT, &path, &patch).await
            }
            EntityKind::Board => Err(UpstreamError::rejected("boards cannot be updated")),
        }
    }

    async fn delete_entity(&self, kind: EntityKind, id: &str) -> UpstreamResult<()> {
        let path = entity_path(kind, id);
        self.send(self.request(Method::DELETE, &path), &path).await?;
        Ok(())
    }

    async fn action(&self, kind: EntityKind, id: &str, action: &str, payload: Value) -> UpstreamResult<()> {
        let base = entity_path(kind, id);
        let (path, body) = match (kind, action) {
            (EntityKind::Issue, ACTION_TRANSITION) => {
                (format!("{base}/transitions"), transition_body(payload))
            }
            (EntityKind::Issue, ACTION_COMMENT) => {
                let text = payload.get("body").cloned().unwrap_or(Value::Null);
                (format!("{base}/comment"), json!({ "body": adf(&text) }))
            }
            (EntityKind::Issue, ACTION_LINK) => {
                let mut body = payload;
                if let Some(comment) = body.pointer_mut("/comment/body") {
                    *comment = adf(comment);
                }
                (format!("{PLATFORM}/issueLink"), body)
            }
            (EntityKind::Sprint, ACTION_ADD_ISSUES) => (format!("{base}/issue"), payload),
            (EntityKind::Sprint, ACTION_REMOVE_ISSUES) => (format!("{AGILE}/backlog/issue"), payload),
            _ => {
                return Err(UpstreamError::rejected(format!(
                    "{kind} does not support action '{action}'"
                )));
            }
        };
        self.send_json(Method::POST, &path, &body).await?;
        Ok(())
    }
}

fn collection_path(kind: EntityKind) -> String {
    match kind {
        EntityKind::Issue => format!("{PLATFORM}/issue"),
        EntityKind::Project => format!("{PLATFORM}/project"),
        EntityKind::Filter => format!("{PLATFORM}/filter"),
        EntityKind::Board => format!("{AGILE}/board"),
        EntityKind::Sprint => format!("{AGILE}/sprint"),
    }
}

fn entity_path(kind: EntityKind, id: &str) -> String {
    format!("{}/{id}", collection_path(kind))
}

fn map_reqwest_error(err: reqwest::Error) -> UpstreamError {
    if err.is_decode() {
        UpstreamError::Decode(err.to_string())
    } else if err.is_timeout() {
        UpstreamError::Network(format!("request timed out: {err}"))
    } else {
        UpstreamError::Network(err.to_string())
    }
}

/// Maps a non-success status onto the upstream error classes.
fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    resource: &str,
    body: &str,
) -> UpstreamError {
    let message = error_message(body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    match status {
        StatusCode::NOT_FOUND => UpstreamError::NotFound(format!("{resource}: {message}")),
        StatusCode::UNAUTHORIZED => UpstreamError::Unauthorized(message),
        StatusCode::FORBIDDEN => UpstreamError::PermissionDenied(message),
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited { retry_after },
        _ => UpstreamError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

/// Joins Jira's `errorMessages` and `errors` into one line.
fn error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let mut parts: Vec<String> = parsed
        .get("errorMessages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if let Some(errors) = parsed.get("errors").and_then(Value::as_object) {
        for (field, message) in errors {
            if let Some(message) = message.as_str() {
                parts.push(format!("{field}: {message}"));
            }
        }
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

fn items_and_total(page: &Value, items_key: &str) -> Value {
    let listed = list_page(page, items_key, 0);
    json!({ "items": listed.items, "total": listed.total })
}

/// Reads one page. Agile endpoints may omit `total`; it is then estimated
/// from `isLast`.
fn list_page(page: &Value, items_key: &str, start_at: u64) -> ListPage {
    let items = page
        .get(items_key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let total = page.get("total").and_then(Value::as_u64).unwrap_or_else(|| {
        let seen = start_at + items.len() as u64;
        let is_last = page.get("isLast").and_then(Value::as_bool).unwrap_or(true);
        if is_last { seen } else { seen + 1 }
    });
    ListPage { items, total }
}

/// Wraps plain text in an Atlassian document; documents pass through.
fn adf(text: &Value) -> Value {
    match text {
        Value::String(text) => {
            let paragraphs: Vec<Value> = text
                .split("\n\n")
                .filter(|paragraph| !paragraph.trim().is_empty())
                .map(|paragraph| {
                    json!({
                        "type": "paragraph",
                        "content": [{ "type": "text", "text": paragraph }]
                    })
                })
                .collect();
            json!({ "type": "doc", "version": 1, "content": paragraphs })
        }
        other => other.clone(),
    }
}

fn with_adf_description(mut payload: Value) -> Value {
    if let Some(description) = payload.pointer_mut("/fields/description") {
        *description = adf(description);
    }
    payload
}

/// `{"transition": {...}, "comment": "..."}` into the REST shape.
fn transition_body(mut payload: Value) -> Value {
    let comment = payload
        .as_object_mut()
        .and_then(|object| object.remove("comment"));
    if let Some(comment) = comment {
        payload["update"] = json!({ "comment": [{ "add": { "body": adf(&comment) } }] });
    }
    payload
}

impl Upstream for JiraRestClient {
    async fn fetch(&self, kind: EntityKind, id: &str) -> UpstreamResult<Value> {
        self.fetch_entity(kind, id).await
    }

    async fn fetch_related(&self, target: &RelatedRef) -> UpstreamResult<Value> {
        self.fetch_related_entity(target).await
    }

    async fn list(&self, kind: EntityKind, query: &ListQuery) -> UpstreamResult<ListPage> {
        self.list_entities(kind, query).await
    }

    async fn create(&self, kind: EntityKind, payload: Value) -> UpstreamResult<Value> {
        self.create_entity(kind, payload).await
    }

    async fn mutate(&self, kind: EntityKind, id: &str, patch: Value) -> UpstreamResult<Value> {
        self.mutate_entity(kind, id, patch).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> UpstreamResult<()> {
        self.delete_entity(kind, id).await
    }

    async fn perform_action(
        &self,
        kind: EntityKind,
        id: &str,
        action: &str,
        payload: Value,
    ) -> UpstreamResult<()> {
        self.action(kind, id, action, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_error_classes() {
        let body = r#"{"errorMessages":["Issue does not exist"],"errors":{}}"#;
        let not_found = classify(StatusCode::NOT_FOUND, None, "/rest/api/3/issue/X-1", body);
        assert_eq!(not_found.class(), "not_found");
        assert!(not_found.to_string().contains("Issue does not exist"));

        assert_eq!(classify(StatusCode::UNAUTHORIZED, None, "/", "").class(), "unauthorized");
        assert_eq!(classify(StatusCode::FORBIDDEN, None, "/", "").class(), "permission_denied");

        let limited = classify(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(7)),
            "/",
            "",
        );
        assert_eq!(
            limited,
            UpstreamError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[test]
    fn field_errors_are_joined() {
        let body = r#"{"errorMessages":[],"errors":{"summary":"You must specify a summary."}}"#;
        let err = classify(StatusCode::BAD_REQUEST, None, "/rest/api/3/issue", body);
        assert_eq!(
            err,
            UpstreamError::Rejected {
                status: 400,
                message: "summary: You must specify a summary.".to_string()
            }
        );
    }

    #[test]
    fn agile_pages_estimate_missing_total() {
        let page = json!({ "values": [{ "id": 1 }, { "id": 2 }], "isLast": false });
        let listed = list_page(&page, "values", 10);
        assert_eq!(listed.items.len(), 2);
        assert_eq!(listed.total, 13);

        let last = json!({ "values": [{ "id": 1 }], "isLast": true });
        assert_eq!(list_page(&last, "values", 0).total, 1);
    }

    #[test]
    fn plain_text_becomes_document() {
        let doc = adf(&json!("first\n\nsecond"));
        assert_eq!(doc["type"], "doc");
        assert_eq!(doc["content"].as_array().map(Vec::len), Some(2));
        assert_eq!(doc["content"][1]["content"][0]["text"], "second");

        let already = json!({ "type": "doc", "version": 1, "content": [] });
        assert_eq!(adf(&already), already);
    }

    #[test]
    fn transition_comment_moves_under_update() {
        let body = transition_body(json!({ "transition": { "id": "31" }, "comment": "done" }));
        assert!(body.get("comment").is_none());
        assert_eq!(body["update"]["comment"][0]["add"]["body"]["type"], "doc");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = JiraRestClient::new(RestClientConfig::new(
            "https://example.atlassian.net/",
            "me@example.com",
            "token",
        ))
        .expect("client builds");
        assert_eq!(client.base_url, "https://example.atlassian.net");
    }
}
