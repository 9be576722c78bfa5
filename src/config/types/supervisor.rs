//! Process supervisor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How to reach the process manager and how patient to be with it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Supervisor program name of the gateway
    #[serde(default = "default_program")]
    pub program: String,
    /// Control command (supervisorctl)
    #[serde(default = "default_command")]
    pub command: String,
    /// Prefix commands with `sudo -n`
    #[serde(default)]
    pub use_sudo: bool,
    /// Timeout for start
    #[serde(default = "default_start_timeout", with = "humantime_serde")]
    pub start_timeout: Duration,
    /// Timeout for stop
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,
    /// Timeout for restart
    #[serde(default = "default_restart_timeout", with = "humantime_serde")]
    pub restart_timeout: Duration,
    /// Timeout for status
    #[serde(default = "default_status_timeout", with = "humantime_serde")]
    pub status_timeout: Duration,
    /// Retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between retries
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            program: default_program(),
            command: default_command(),
            use_sudo: false,
            start_timeout: default_start_timeout(),
            stop_timeout: default_stop_timeout(),
            restart_timeout: default_restart_timeout(),
            status_timeout: default_status_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

fn default_program() -> String {
    "clawdbot-gateway".to_string()
}

fn default_command() -> String {
    "supervisorctl".to_string()
}

fn default_start_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_restart_timeout() -> Duration {
    Duration::from_secs(45)
}

fn default_status_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}
