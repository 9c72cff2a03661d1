//! Operation engine for jira-mcp.
//!
//! Every entity tool runs through one pipeline in [`engine`]: argument
//! normalization, descriptor-driven validation, an optional state-machine
//! guard, the upstream call, best-effort expansion and envelope composition.
//! [`control::JiraControlPlane`] exposes the five entity tools over any
//! [`upstream::Upstream`], either the Jira Cloud REST client or the in-memory
//! sandbox.

pub mod compose;
pub mod control;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod expand;
pub mod normalize;
pub mod upstream;
pub mod validate;

pub use compose::Envelope;
pub use control::JiraControlPlane;
pub use error::{ErrorKind, ToolError, ToolResult};
pub use normalize::ArgBag;
pub use upstream::{JiraRestClient, MemoryUpstream, RestClientConfig, Upstream, UpstreamError};
