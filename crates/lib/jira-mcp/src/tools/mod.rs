//! MCP tool modules.
//!
//! Tools are grouped by role: the five operation-discriminated entity tools
//! and contextual help describing them.

mod context;
mod entity;

pub use entity::ToolInvocation;
