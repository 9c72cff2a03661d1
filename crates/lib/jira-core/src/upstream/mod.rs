//! Upstream service collaborator and its implementations.
//!
//! The engine never builds raw network requests; it talks to the issue
//! tracker exclusively through [`Upstream`]. `rest` targets Jira Cloud and
//! `memory` is an in-process sandbox used by tests and offline mode.

pub mod memory;
pub mod rest;

use std::{error::Error, fmt, future::Future, time::Duration};

use jira_types::EntityKind;
use jira_types::schema::{DEFAULT_MAX_RESULTS, DEFAULT_START_AT};
use serde_json::{Map, Value};

pub use memory::{CallMethod, MemoryUpstream, UpstreamCall};
pub use rest::{JiraRestClient, RestClientConfig};

/// Classified failure reported by the upstream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    NotFound(String),
    Unauthorized(String),
    PermissionDenied(String),
    RateLimited { retry_after: Option<Duration> },
    Rejected { status: u16, message: String },
    Network(String),
    Decode(String),
}

impl UpstreamError {
    /// Stable classification label.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::PermissionDenied(_) => "permission_denied",
            Self::RateLimited { .. } => "rate_limited",
            Self::Rejected { .. } => "rejected",
            Self::Network(_) => "network",
            Self::Decode(_) => "decode",
        }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            status: 400,
            message: message.into(),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(resource) => write!(f, "not found: {resource}"),
            Self::Unauthorized(message) => write!(f, "unauthorized: {message}"),
            Self::PermissionDenied(message) => write!(f, "permission denied: {message}"),
            Self::RateLimited {
                retry_after: Some(after),
            } => write!(f, "rate limited, retry after {}s", after.as_secs()),
            Self::RateLimited { retry_after: None } => write!(f, "rate limited"),
            Self::Rejected { status, message } => {
                write!(f, "request rejected ({status}): {message}")
            }
            Self::Network(message) => write!(f, "network failure: {message}"),
            Self::Decode(message) => write!(f, "unexpected upstream payload: {message}"),
        }
    }
}

impl Error for UpstreamError {}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Page window for list calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub start_at: u64,
    pub max_results: u64,
}

impl Page {
    #[must_use]
    pub const fn new(start_at: u64, max_results: u64) -> Self {
        Self {
            start_at,
            max_results,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(DEFAULT_START_AT, DEFAULT_MAX_RESULTS)
    }
}

/// Filter and page for a list call. Filter keys are the `FILTER_*` schema
/// constants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Map<String, Value>,
    pub page: Page,
}

impl ListQuery {
    #[must_use]
    pub fn new(page: Page) -> Self {
        Self {
            filter: Map::new(),
            page,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filter.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_optional_filter(self, key: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.with_filter(key, value),
            None => self,
        }
    }

    /// Reads a filter value as a string, rendering numbers.
    #[must_use]
    pub fn filter_string(&self, key: &str) -> Option<String> {
        self.filter.get(key).and_then(jira_types::scalar_string)
    }
}

/// One page of a list call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub items: Vec<Value>,
    pub total: u64,
}

/// Secondary dataset hanging off an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedRef {
    pub kind: EntityKind,
    pub id: String,
    pub relation: &'static str,
    /// Extra addressing some relations need (the origin board of a sprint report).
    pub scope: Option<String>,
}

impl RelatedRef {
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<String>, relation: &'static str) -> Self {
        Self {
            kind,
            id: id.into(),
            relation,
            scope: None,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

impl fmt::Display for RelatedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.id, self.relation)
    }
}

/// Client for the remote issue-tracking service.
///
/// Implementations are constructed once at start-up and shared read-only
/// across every tool invocation.
pub trait Upstream: Send + Sync + 'static {
    /// Fetches one entity by identifier.
    fn fetch(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> impl Future<Output = UpstreamResult<Value>> + Send;

    /// Fetches a secondary dataset of an entity.
    fn fetch_related(
        &self,
        target: &RelatedRef,
    ) -> impl Future<Output = UpstreamResult<Value>> + Send;

    /// Lists entities matching a filter.
    fn list(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> impl Future<Output = UpstreamResult<ListPage>> + Send;

    /// Creates an entity and returns its upstream representation.
    fn create(
        &self,
        kind: EntityKind,
        payload: Value,
    ) -> impl Future<Output = UpstreamResult<Value>> + Send;

    /// Applies a partial update and returns the updated entity.
    fn mutate(
        &self,
        kind: EntityKind,
        id: &str,
        patch: Value,
    ) -> impl Future<Output = UpstreamResult<Value>> + Send;

    /// Deletes an entity.
    fn delete(&self, kind: EntityKind, id: &str)
    -> impl Future<Output = UpstreamResult<()>> + Send;

    /// Performs a named side-effecting action (transition, comment, ...).
    fn perform_action(
        &self,
        kind: EntityKind,
        id: &str,
        action: &str,
        payload: Value,
    ) -> impl Future<Output = UpstreamResult<()>> + Send;
}
