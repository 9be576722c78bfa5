//! Configuration types module
//!
//! Host configuration split by concern: the supervised gateway, the
//! supervisor transport, the proxy limits and the control API server.

pub mod gateway;
pub mod proxy;
pub mod supervisor;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Control API server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Supervised gateway configuration
    #[serde(default)]
    pub gateway: gateway::GatewaySettings,

    /// Process supervisor configuration
    #[serde(default)]
    pub supervisor: supervisor::SupervisorConfig,

    /// Proxy limits
    #[serde(default)]
    pub proxy: proxy::ProxyConfig,

    /// Health watcher configuration
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from the config file and environment overrides
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Control API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to bind to
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Session token identifying the instance owner
    #[serde(skip_serializing, default)]
    pub owner_token: Option<SecretString>,
    /// Identity reported for the owner
    #[serde(default = "default_owner_id")]
    pub owner_id: String,
    /// Allowed CORS origins (empty = same-origin only)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            port: default_server_port(),
            owner_token: None,
            owner_id: default_owner_id(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8001
}

fn default_owner_id() -> String {
    "owner".to_string()
}

/// Health watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Enable the background watcher
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Poll interval
    #[serde(default = "default_watch_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            enabled: true,
            interval: default_watch_interval(),
        }
    }
}

fn default_watch_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info,clawhost=debug".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 18789);
        assert_eq!(config.gateway.control_port, 18791);
        assert_eq!(config.proxy.max_message_bytes, 1024 * 1024);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert!(config.server.owner_token.is_none());
    }
}
