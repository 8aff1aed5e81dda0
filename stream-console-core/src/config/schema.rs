//! Configuration schema definitions

use crate::bus::{ModuleId, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration for stream-console
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP / websocket server
    #[serde(default)]
    pub server: ServerConfig,
    /// Console hub behavior
    #[serde(default)]
    pub console: ConsoleConfig,
    /// Command routing
    #[serde(default)]
    pub router: RouterConfig,
    /// Backend modules
    #[serde(default)]
    pub modules: ModulesConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Origins allowed to open a console websocket
    pub allowed_origins: Vec<String>,
    /// Directory holding the management page
    pub static_dir: String,
    /// Management page served at `/`
    pub index_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            allowed_origins: vec!["http://localhost:8765".to_string()],
            static_dir: "static".to_string(),
            index_file: "console.html".to_string(),
        }
    }
}

/// What a newly registered console receives from the backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Leave the backlog untouched
    None,
    /// Replay every backlogged message, oldest first
    All,
    /// Replay only the newest `n` messages and discard the rest
    Last(usize),
}

/// Console hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Capacity of each connection's inbound buffer
    pub inbound_capacity: usize,
    /// Upper bound on a single write to a console connection
    pub write_timeout_ms: u64,
    /// Maximum number of backlogged messages kept
    pub backlog_capacity: usize,
    /// Age after which backlogged messages are dropped (0 = never)
    pub backlog_ttl_secs: u64,
    /// Backlog replay on registration
    pub replay: ReplayPolicy,
    /// Interval of the status ticker (0 = disabled)
    pub heartbeat_secs: u64,
    /// Message broadcast by the status ticker
    pub heartbeat_message: String,
}

impl ConsoleConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn backlog_ttl(&self) -> Option<Duration> {
        (self.backlog_ttl_secs > 0).then(|| Duration::from_secs(self.backlog_ttl_secs))
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_secs > 0).then(|| Duration::from_secs(self.heartbeat_secs))
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 25,
            write_timeout_ms: 1000,
            backlog_capacity: 1000,
            backlog_ttl_secs: 0,
            replay: ReplayPolicy::All,
            heartbeat_secs: 0,
            heartbeat_message: "Hello!".to_string(),
        }
    }
}

/// Command router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Module receiving operator commands without an `@module` prefix
    pub default_target: ModuleId,
    /// Capacity of each direction of a module channel
    pub module_channel_capacity: usize,
    /// Retry policy for full module channels
    pub retry: RetryConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_target: ModuleId::ChatIntegration,
            module_channel_capacity: 50,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry settings for command delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 25,
            max_backoff_ms: 400,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Backend module configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModulesConfig {
    #[serde(default)]
    pub chat_integration: ChatIntegrationConfig,
}

/// Chat integration module configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatIntegrationConfig {
    pub enabled: bool,
    /// Chat channel the integration watches
    pub channel: String,
    /// Account name the integration acts as
    pub username: String,
}

impl Default for ChatIntegrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: "stream".to_string(),
            username: "console-bot".to_string(),
        }
    }
}
