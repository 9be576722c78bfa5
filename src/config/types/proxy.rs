//! Proxy limits

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied to every proxied request and bridged session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Close a bridged session after this long without a forwarded frame
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Largest single frame forwarded in either direction
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Largest HTTP request body accepted for forwarding
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Upstream HTTP request timeout
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            idle_timeout: default_idle_timeout(),
            max_message_bytes: default_max_message_bytes(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_max_message_bytes() -> usize {
    1024 * 1024
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
