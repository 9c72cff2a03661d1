use std::borrow::Cow;

use jira_core::error::{ErrorKind, ToolError};
use jira_core::upstream::UpstreamError;
use rmcp::ErrorData;
use rmcp::model::ErrorCode;
use serde_json::{Map, Value, json};

pub(crate) fn mcp_err(
    code: ErrorCode,
    message: impl Into<Cow<'static, str>>,
    data: Option<Value>,
) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data,
    }
}

/// Converts the core error taxonomy into an MCP error at the tool boundary.
pub(crate) fn map_tool_err(err: ToolError) -> ErrorData {
    let kind = err.kind();
    let code = match kind {
        kind if kind.is_validation() => ErrorCode::INVALID_PARAMS,
        ErrorKind::IllegalStateTransition => ErrorCode::INVALID_REQUEST,
        ErrorKind::UpstreamFailure
            if matches!(err.upstream(), Some(UpstreamError::NotFound(_))) =>
        {
            ErrorCode::RESOURCE_NOT_FOUND
        }
        _ => ErrorCode::INTERNAL_ERROR,
    };

    let mut data = Map::new();
    data.insert("kind".to_string(), json!(kind.as_str()));
    if let Some(field) = err.field() {
        data.insert("field".to_string(), json!(field));
    }
    if let Some(operation) = err.operation() {
        data.insert("operation".to_string(), json!(operation));
    }
    if let Some(expected) = err.expected() {
        data.insert("expected".to_string(), json!(expected));
    }
    if let Some(upstream) = err.upstream() {
        data.insert("upstream".to_string(), upstream_data(upstream));
    }

    mcp_err(code, err.to_string(), Some(Value::Object(data)))
}

fn upstream_data(err: &UpstreamError) -> Value {
    match err {
        UpstreamError::RateLimited {
            retry_after: Some(after),
        } => json!({ "class": err.class(), "retryAfterSecs": after.as_secs() }),
        UpstreamError::Rejected { status, .. } => json!({ "class": err.class(), "status": status }),
        _ => json!({ "class": err.class() }),
    }
}
