//! MCP server implementation for jira-mcp.
//!
//! This crate wires the Jira control plane into rmcp tool handlers: the five
//! `manage_jira_*` entity tools plus `help` and `health`.

mod helpers;
mod tools;
pub mod server;

use jira_core::control::JiraControlPlane;
use jira_core::upstream::Upstream;
use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};

pub use tools::ToolInvocation;

const SERVER_INSTRUCTIONS: &str = r"jira-mcp exposes Jira Cloud through five entity tools.

Every tool takes an `operation` field plus that operation's fields:
- `manage_jira_issue`: get, create, update, delete, transition, comment, link.
- `manage_jira_sprint`: get, list, create, update, delete, manage_issues.
- `manage_jira_board`: get, list, create, delete, get_configuration.
- `manage_jira_project`: get, list (create/update/delete are not yet available).
- `manage_jira_filter`: get, list, create, update, delete, execute_filter, execute_jql.

Notes:
- Field names are camelCase (`issueKey`, `sprintId`); snake_case spellings are accepted.
- `expand` takes a list (or comma-separated string) of expansion tokens; unknown tokens are rejected.
- On list operations `expand` applies to every item; `execute_filter` and `execute_jql` return issues and take no `expand`.
- List operations accept `startAt` (default 0) and `maxResults` (default 50, max 100).
- Responses are `{data, _metadata, _summary}`; `_metadata.available_expansions` lists what can still be expanded.
- Sprints move future -> active -> closed; closed sprints are read-only.
- Use `help` for every tool's operations, required fields and aliases. `health` returns `ok`.";

/// MCP server wrapper around the Jira control plane and tool routers.
pub struct JiraMcp<U: Upstream> {
    tool_router: ToolRouter<Self>,
    control: JiraControlPlane<U>,
}

impl<U: Upstream> Clone for JiraMcp<U> {
    fn clone(&self) -> Self {
        Self {
            tool_router: self.tool_router.clone(),
            control: self.control.clone(),
        }
    }
}

impl<U: Upstream> JiraMcp<U> {
    /// Creates a new server over a shared control plane.
    #[must_use]
    pub fn with_control(control: JiraControlPlane<U>) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_entity()
            + Self::tool_router_context();
        Self {
            tool_router,
            control,
        }
    }

    #[must_use]
    pub const fn control(&self) -> &JiraControlPlane<U> {
        &self.control
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl<U: Upstream> JiraMcp<U> {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
impl<U: Upstream> ServerHandler for JiraMcp<U> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use jira_core::upstream::MemoryUpstream;

    use super::*;

    #[test]
    fn router_exposes_entity_and_context_tools() {
        let server = JiraMcp::with_control(JiraControlPlane::new(MemoryUpstream::sample()));
        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                "health",
                "help",
                "manage_jira_board",
                "manage_jira_filter",
                "manage_jira_issue",
                "manage_jira_project",
                "manage_jira_sprint",
            ]
        );
    }
}
