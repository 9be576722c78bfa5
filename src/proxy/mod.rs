//! ProxyBridge - passes owner traffic through to the local gateway
//!
//! HTTP requests go to the primary port, WebSocket sessions to the control
//! port. Both carry the gateway token upstream and only run while the
//! controller reports `Running`.

mod http;
mod ws;

pub use self::http::AUTH_HEADER;
pub use self::ws::{close_socket, CLOSE_IDLE, CLOSE_NOT_RUNNING, CLOSE_POLICY, CLOSE_PROXY_ERROR};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::controller::GatewayController;
use crate::error::{Error, Result};

/// A bridged WebSocket session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub opened_at: DateTime<Utc>,
}

pub struct ProxyBridge {
    controller: Arc<GatewayController>,
    config: ProxyConfig,
    client: reqwest::Client,
    sessions: Mutex<HashMap<Uuid, SessionInfo>>,
}

impl ProxyBridge {
    pub fn new(controller: Arc<GatewayController>, config: ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            controller,
            config,
            client,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Number of live bridged sessions
    pub fn active_sessions(&self) -> usize {
        self.session_map().len()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.session_map().values().cloned().collect()
    }

    /// Token of the running gateway, or why there is none
    fn running_token(&self) -> Result<String> {
        self.controller.token().ok_or_else(|| {
            Error::GatewayNotRunning(format!(
                "gateway is {}",
                self.controller.current_status().state
            ))
        })
    }

    fn session_map(&self) -> MutexGuard<'_, HashMap<Uuid, SessionInfo>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self) -> SessionGuard<'_> {
        let info = SessionInfo {
            id: Uuid::new_v4(),
            opened_at: Utc::now(),
        };
        let id = info.id;
        self.session_map().insert(id, info);
        SessionGuard { bridge: self, id }
    }
}

/// Keeps a session registered for as long as it lives
struct SessionGuard<'a> {
    bridge: &'a ProxyBridge,
    id: Uuid,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.bridge.session_map().remove(&self.id);
    }
}
