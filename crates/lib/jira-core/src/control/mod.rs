use std::sync::Arc;

use jira_types::scalar_string;
use serde_json::Value;

use crate::compose::Envelope;
use crate::descriptor::ToolDescriptor;
use crate::engine::{EntityTool, invoke};
use crate::error::ToolResult;
use crate::normalize::ArgBag;
use crate::upstream::Upstream;

pub mod board;
pub mod filter;
pub mod issue;
pub mod project;
pub mod sprint;

pub use board::{BoardOp, BoardOperation, BoardTool};
pub use filter::{FilterOp, FilterOperation, FilterTool};
pub use issue::{IssueOp, IssueOperation, IssueTool};
pub use project::{ProjectOp, ProjectOperation, ProjectTool};
pub use sprint::{SprintOp, SprintOperation, SprintTool};

/// Entry point for the five entity tools over one shared upstream client.
pub struct JiraControlPlane<U: Upstream> {
    upstream: Arc<U>,
}

impl<U: Upstream> Clone for JiraControlPlane<U> {
    fn clone(&self) -> Self {
        Self {
            upstream: Arc::clone(&self.upstream),
        }
    }
}

impl<U: Upstream> JiraControlPlane<U> {
    pub fn new(upstream: U) -> Self {
        Self {
            upstream: Arc::new(upstream),
        }
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Runs `manage_jira_issue`.
    ///
    /// # Errors
    /// Returns a `ToolError` if validation, the state guard, or the primary
    /// upstream call fails.
    pub async fn manage_issue(&self, args: ArgBag) -> ToolResult<Envelope> {
        invoke::<IssueTool, U>(&self.upstream, args).await
    }

    /// Runs `manage_jira_sprint`.
    ///
    /// # Errors
    /// Returns a `ToolError` if validation, the state guard, or the primary
    /// upstream call fails.
    pub async fn manage_sprint(&self, args: ArgBag) -> ToolResult<Envelope> {
        invoke::<SprintTool, U>(&self.upstream, args).await
    }

    /// Runs `manage_jira_board`.
    ///
    /// # Errors
    /// Returns a `ToolError` if validation or the primary upstream call fails.
    pub async fn manage_board(&self, args: ArgBag) -> ToolResult<Envelope> {
        invoke::<BoardTool, U>(&self.upstream, args).await
    }

    /// Runs `manage_jira_project`.
    ///
    /// # Errors
    /// Returns a `ToolError` if validation or the primary upstream call
    /// fails, or the operation is not implemented.
    pub async fn manage_project(&self, args: ArgBag) -> ToolResult<Envelope> {
        invoke::<ProjectTool, U>(&self.upstream, args).await
    }

    /// Runs `manage_jira_filter`.
    ///
    /// # Errors
    /// Returns a `ToolError` if validation or the primary upstream call fails.
    pub async fn manage_filter(&self, args: ArgBag) -> ToolResult<Envelope> {
        invoke::<FilterTool, U>(&self.upstream, args).await
    }
}

/// Every tool descriptor, in tool order.
#[must_use]
pub fn descriptors() -> [&'static ToolDescriptor; 5] {
    [
        IssueTool::descriptor(),
        SprintTool::descriptor(),
        BoardTool::descriptor(),
        ProjectTool::descriptor(),
        FilterTool::descriptor(),
    ]
}

/// Identifier of an upstream entity rendered as a string.
pub(crate) fn entity_id(entity: &Value, field: &str) -> Option<String> {
    entity.get(field).and_then(scalar_string)
}
