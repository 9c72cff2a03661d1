use jira_core::normalize::ArgBag;
use jira_core::upstream::Upstream;
use jira_core::{Envelope, ToolResult};
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{JiraMcp, helpers};

/// Arguments of every entity tool: the operation name plus that operation's
/// fields, in any accepted spelling.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ToolInvocation {
    /// Operation to run, e.g. `get` or `list`.
    pub operation: Option<String>,
    /// Operation fields, plus `expand`, `startAt` and `maxResults`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ToolInvocation {
    /// Reassembles the raw argument bag seen by the engine.
    #[must_use]
    pub fn into_args(self) -> ArgBag {
        let mut args = self.fields;
        if let Some(operation) = self.operation {
            args.insert("operation".to_string(), json!(operation));
        }
        args
    }
}

fn respond(result: ToolResult<Envelope>) -> Result<CallToolResult, ErrorData> {
    let envelope = result.map_err(helpers::map_tool_err)?;
    Ok(CallToolResult::success(vec![Content::json(envelope)?]))
}

#[tool_router(router = tool_router_entity, vis = "pub")]
impl<U: Upstream> JiraMcp<U> {
    #[tool(
        description = "Jira issues. Operations: get, create, update, delete, transition, comment, link. Expansions: comments, transitions, attachments, related_issues, history."
    )]
    async fn manage_jira_issue(
        &self,
        Parameters(params): Parameters<ToolInvocation>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.control().manage_issue(params.into_args()).await)
    }

    #[tool(
        description = "Jira sprints (future -> active -> closed). Operations: get, list, create, update, delete, manage_issues. Expansions: issues, report, board."
    )]
    async fn manage_jira_sprint(
        &self,
        Parameters(params): Parameters<ToolInvocation>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.control().manage_sprint(params.into_args()).await)
    }

    #[tool(
        description = "Jira agile boards. Operations: get, list, create, delete, get_configuration. Expansions: sprints, issues, configuration."
    )]
    async fn manage_jira_board(
        &self,
        Parameters(params): Parameters<ToolInvocation>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.control().manage_board(params.into_args()).await)
    }

    #[tool(
        description = "Jira projects. Operations: get, list (create, update, delete are declared but not yet available). Expansions: boards, components, versions, recent_issues."
    )]
    async fn manage_jira_project(
        &self,
        Parameters(params): Parameters<ToolInvocation>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.control().manage_project(params.into_args()).await)
    }

    #[tool(
        description = "Jira saved filters and JQL search. Operations: get, list, create, update, delete, execute_filter, execute_jql. Expansions: permissions, issue_count."
    )]
    async fn manage_jira_filter(
        &self,
        Parameters(params): Parameters<ToolInvocation>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.control().manage_filter(params.into_args()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_keeps_flattened_fields() {
        let invocation: ToolInvocation = serde_json::from_value(json!({
            "operation": "get",
            "issue_key": "PROJ-1",
            "expand": ["comments"]
        }))
        .expect("invocation deserializes");

        let args = invocation.into_args();
        assert_eq!(args.get("operation"), Some(&json!("get")));
        assert_eq!(args.get("issue_key"), Some(&json!("PROJ-1")));
        assert_eq!(args.get("expand"), Some(&json!(["comments"])));
    }

    #[test]
    fn missing_operation_stays_missing() {
        let invocation: ToolInvocation =
            serde_json::from_value(json!({ "sprintId": 12 })).expect("invocation deserializes");
        assert!(!invocation.into_args().contains_key("operation"));
    }
}
