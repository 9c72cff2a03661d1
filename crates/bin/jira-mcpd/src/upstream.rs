use jira_core::upstream::{JiraRestClient, RestClientConfig, UpstreamError};

use crate::config::Credentials;

/// Builds the Jira Cloud client from resolved credentials.
pub fn rest_client(
    credentials: &Credentials,
    timeout: std::time::Duration,
) -> Result<JiraRestClient, UpstreamError> {
    let config = RestClientConfig::new(
        credentials.base_url.as_str(),
        credentials.email.as_str(),
        credentials.api_token.as_str(),
    )
    .with_timeout(timeout);
    JiraRestClient::new(config)
}
