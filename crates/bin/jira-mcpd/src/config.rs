use clap::{Parser, builder::BoolishValueParser};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:4030";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug, Default)]
#[command(name = "jira-mcpd", version, about = "Jira MCP daemon.")]
struct CliArgs {
    /// TOML file with settings; flags and environment variables override it.
    #[arg(long = "config", env = "JIRA_MCPD_CONFIG")]
    config_path: Option<PathBuf>,

    #[arg(long, env = "JIRA_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "JIRA_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "JIRA_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    #[arg(long, env = "JIRA_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    #[arg(
        long,
        env = "JIRA_SANDBOX",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    sandbox: Option<bool>,

    #[arg(
        long,
        env = "JIRA_ENABLE_STDIO",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    stdio: Option<bool>,

    #[arg(
        long,
        env = "JIRA_HTTP_SERVE",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    http_serve: Option<bool>,

    #[arg(long, env = "JIRA_HTTP_ADDR")]
    http_addr: Option<SocketAddr>,

    #[arg(long, env = "JIRA_LOG")]
    log_level: Option<String>,
}

/// Settings read from the optional TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    email: Option<String>,
    api_token: Option<String>,
    request_timeout_secs: Option<u64>,
    sandbox: Option<bool>,
    stdio: Option<bool>,
    http_serve: Option<bool>,
    http_addr: Option<SocketAddr>,
    log_level: Option<String>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::File {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse(path, &raw)
    }

    fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|err| ConfigError::File {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

/// Jira Cloud credentials used when not running in sandbox mode.
#[derive(Clone)]
pub struct Credentials {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Runtime configuration resolved from flags, environment and file.
#[derive(Debug, Clone)]
pub struct JiraConfig {
    /// `None` in sandbox mode.
    pub credentials: Option<Credentials>,
    pub request_timeout: Duration,
    pub sandbox: bool,
    pub enable_stdio: bool,
    pub http_serve: bool,
    pub http_addr: SocketAddr,
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSetting(&'static str),
    InvalidSetting { name: &'static str, value: String },
    File { path: PathBuf, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "missing required setting: {name}"),
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
            Self::File { path, message } => {
                let path = path.display();
                write!(f, "failed to load config file {path}: {message}")
            }
        }
    }
}

impl Error for ConfigError {}

impl JiraConfig {
    /// Parses flags and environment, then layers them over the config file.
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        let file = match args.config_path.as_deref() {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    fn resolve(args: CliArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());

        let sandbox = args.sandbox.or(file.sandbox).unwrap_or(false);
        let enable_stdio = args.stdio.or(file.stdio).unwrap_or(false);
        let http_serve = args.http_serve.or(file.http_serve).unwrap_or(true);
        if !enable_stdio && !http_serve {
            return Err(ConfigError::InvalidSetting {
                name: "JIRA_HTTP_SERVE",
                value: "false (stdio is disabled too, nothing would be served)".to_string(),
            });
        }

        let base_url = non_empty(args.base_url.or(file.base_url));
        let email = non_empty(args.email.or(file.email));
        let api_token = non_empty(args.api_token.or(file.api_token));
        let credentials = if sandbox {
            None
        } else {
            let base_url = base_url.ok_or(ConfigError::MissingSetting("JIRA_BASE_URL"))?;
            if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
                return Err(ConfigError::InvalidSetting {
                    name: "JIRA_BASE_URL",
                    value: base_url,
                });
            }
            Some(Credentials {
                base_url,
                email: email.ok_or(ConfigError::MissingSetting("JIRA_EMAIL"))?,
                api_token: api_token.ok_or(ConfigError::MissingSetting("JIRA_API_TOKEN"))?,
            })
        };

        let timeout_secs = args
            .request_timeout_secs
            .or(file.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "JIRA_REQUEST_TIMEOUT_SECS",
                value: timeout_secs.to_string(),
            });
        }

        let http_addr = match args.http_addr.or(file.http_addr) {
            Some(addr) => addr,
            None => DEFAULT_HTTP_ADDR
                .parse()
                .map_err(|_| ConfigError::InvalidSetting {
                    name: "JIRA_HTTP_ADDR",
                    value: DEFAULT_HTTP_ADDR.to_string(),
                })?,
        };

        Ok(Self {
            credentials,
            request_timeout: Duration::from_secs(timeout_secs),
            sandbox,
            enable_stdio,
            http_serve,
            http_addr,
            log_level: non_empty(args.log_level.or(file.log_level))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}
