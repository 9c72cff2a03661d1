//! Daemon entry point for the Jira MCP server.
//!
//! Loads configuration from flags, environment and an optional TOML file,
//! builds the upstream client (Jira Cloud or the in-memory sandbox), and
//! serves the MCP protocol over streamable HTTP and/or stdio.

mod config;
mod upstream;

use jira_core::control::JiraControlPlane;
use jira_core::upstream::{MemoryUpstream, Upstream};
use jira_mcp::server::{McpHttpServerConfig, serve_stdio, serve_streamable_http};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, JiraConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = JiraConfig::from_args()?;
    init_tracing(&config.log_level);

    if config.sandbox {
        info!("starting in sandbox mode with the demo dataset");
        run(JiraControlPlane::new(MemoryUpstream::sample()), &config).await
    } else {
        let credentials = config
            .credentials
            .as_ref()
            .ok_or(ConfigError::MissingSetting("JIRA_BASE_URL"))?;
        let client = upstream::rest_client(credentials, config.request_timeout)?;
        info!(base_url = %credentials.base_url, "starting against Jira Cloud");
        run(JiraControlPlane::new(client), &config).await
    }
}

/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run<U: Upstream>(control: JiraControlPlane<U>, config: &JiraConfig) -> Result<(), BoxError> {
    let http_task = if config.http_serve {
        let http_config = McpHttpServerConfig::new(config.http_addr);
        let http_control = control.clone();
        Some(tokio::spawn(async move {
            if let Err(err) = serve_streamable_http(http_control, http_config).await {
                error!(error = %err, "MCP HTTP server stopped");
            }
        }))
    } else {
        None
    };

    if config.enable_stdio {
        info!("serving MCP over stdio");
        serve_stdio(control).await?;
        info!("stdio session closed");
    } else if let Some(task) = http_task {
        task.await?;
    }
    Ok(())
}
