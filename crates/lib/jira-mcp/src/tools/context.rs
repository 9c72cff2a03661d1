use jira_core::control::descriptors;
use jira_core::upstream::Upstream;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{JiraMcp, helpers};

/// Optional narrowing of the help output to one tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HelpParams {
    /// Tool name such as `manage_jira_sprint`.
    pub tool: Option<String>,
}

/// Operations, fields, expansions and aliases of the requested tools.
fn tool_summaries(tool: Option<&str>) -> Vec<Value> {
    descriptors()
        .into_iter()
        .filter(|descriptor| tool.is_none_or(|name| name == descriptor.tool))
        .map(|descriptor| descriptor.summary())
        .collect()
}

#[tool_router(router = tool_router_context, vis = "pub")]
impl<U: Upstream> JiraMcp<U> {
    #[tool(
        description = "Describe the entity tools: operations with required and optional fields, expansion tokens, and accepted field aliases."
    )]
    async fn help(
        &self,
        Parameters(params): Parameters<HelpParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let summaries = tool_summaries(params.tool.as_deref());
        if summaries.is_empty() {
            let known: Vec<&str> = descriptors().iter().map(|descriptor| descriptor.tool).collect();
            return Err(helpers::mcp_err(
                rmcp::model::ErrorCode::INVALID_PARAMS,
                format!("unknown tool (expected one of: {})", known.join(", ")),
                None,
            ));
        }
        Ok(CallToolResult::success(vec![Content::json(summaries)?]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_covers_every_tool_or_one() {
        assert_eq!(tool_summaries(None).len(), 5);

        let sprint = tool_summaries(Some("manage_jira_sprint"));
        assert_eq!(sprint.len(), 1);
        assert_eq!(sprint[0]["tool"], "manage_jira_sprint");

        assert!(tool_summaries(Some("manage_jira_widget")).is_empty());
    }
}
