//! Shared entity model and schema constants for jira-mcp.
//!
//! This crate defines the entity kinds, lifecycle enums, and typed request
//! payloads shared by the operation engine, upstream clients, and tool surface.

pub mod models;
pub mod schema;

pub use models::*;
