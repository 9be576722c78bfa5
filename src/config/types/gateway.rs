//! Supervised gateway settings

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Primary gateway port (HTTP control UI)
pub const GATEWAY_PORT: u16 = 18789;

/// Gateway control port (WebSocket)
pub const GATEWAY_CONTROL_PORT: u16 = 18791;

/// Where the gateway lives and how long it may take to come up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Gateway home (config document, secrets file)
    #[serde(default = "default_home")]
    pub home_dir: PathBuf,
    /// Agent workspace handed to the gateway
    #[serde(default = "default_workspace")]
    pub workspace_dir: PathBuf,
    /// Primary port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Control/WebSocket port
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    /// How long to wait for Starting -> Running
    #[serde(default = "default_start_timeout", with = "humantime_serde")]
    pub start_timeout: Duration,
    /// Readiness poll period while starting
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Fallback key for the emergent provider
    #[serde(skip_serializing, default)]
    pub emergent_api_key: Option<SecretString>,
    /// Emergent integration base URL
    #[serde(default = "default_emergent_base_url")]
    pub emergent_base_url: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            home_dir: default_home(),
            workspace_dir: default_workspace(),
            port: default_port(),
            control_port: default_control_port(),
            start_timeout: default_start_timeout(),
            poll_interval: default_poll_interval(),
            emergent_api_key: None,
            emergent_base_url: default_emergent_base_url(),
        }
    }
}

impl GatewaySettings {
    /// Secrets file read by the gateway wrapper at process start
    pub fn secrets_path(&self) -> PathBuf {
        self.home_dir.join("gateway.env")
    }

    /// Persisted config document
    pub fn document_path(&self) -> PathBuf {
        self.home_dir.join("gateway_config.json")
    }

    /// Configuration file consumed by the gateway process itself
    pub fn gateway_file_path(&self) -> PathBuf {
        self.home_dir.join("clawdbot.json")
    }
}

fn default_home() -> PathBuf {
    crate::config::paths::gateway_home()
}

fn default_workspace() -> PathBuf {
    crate::config::paths::workspace_dir()
}

fn default_port() -> u16 {
    GATEWAY_PORT
}

fn default_control_port() -> u16 {
    GATEWAY_CONTROL_PORT
}

fn default_start_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_emergent_base_url() -> String {
    "https://integrations.emergentagent.com/llm".to_string()
}
