//! HealthWatcher - periodic reconciliation through the controller's public API
//!
//! Every tick:
//! 1. Runs the configured [`CorruptionCheck`]; a repaired corruption means
//!    the gateway must reload its files
//! 2. Compares the controller's view with the process manager's; a gateway
//!    that died under a `Running` controller is restarted

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::controller::{GatewayController, LifecycleState};
use crate::error::Result;

/// Detects (and repairs) damage to files the gateway depends on
#[async_trait]
pub trait CorruptionCheck: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Returns `true` when something was repaired and the gateway has to be
    /// restarted to pick it up
    async fn check_and_repair(&self) -> Result<bool>;
}

/// Why a tick restarted the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    Repaired(String),
    ProcessDrift,
}

pub struct HealthWatcher {
    controller: Arc<GatewayController>,
    checks: Vec<Box<dyn CorruptionCheck>>,
    interval: Duration,
}

impl HealthWatcher {
    pub fn new(controller: Arc<GatewayController>, interval: Duration) -> Self {
        Self {
            controller,
            checks: Vec::new(),
            interval,
        }
    }

    pub fn with_check(mut self, check: Box<dyn CorruptionCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Tick until `shutdown` flips to `true` or its sender goes away
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Health watcher started, interval: {:?}", self.interval);

        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Some(reason) = self.tick().await {
                info!(?reason, "Watcher restarted gateway");
            }
        }

        info!("Health watcher stopped");
    }

    /// One reconciliation pass
    pub async fn tick(&self) -> Option<RestartReason> {
        let mut repaired = None;
        for check in &self.checks {
            match check.check_and_repair().await {
                Ok(true) => {
                    warn!(check = check.name(), "Repaired gateway file");
                    repaired.get_or_insert_with(|| check.name().to_string());
                }
                Ok(false) => {}
                Err(e) => warn!(check = check.name(), "Corruption check failed: {}", e),
            }
        }

        if self.controller.current_status().state != LifecycleState::Running {
            return None;
        }

        let reason = match repaired {
            Some(name) => RestartReason::Repaired(name),
            None => match self.controller.process_status().await {
                Ok(process) if process.is_running() => return None,
                Ok(process) => {
                    warn!(state = %process.state, "Gateway process is not running");
                    RestartReason::ProcessDrift
                }
                Err(e) => {
                    debug!("Supervisor status unavailable: {}", e);
                    return None;
                }
            },
        };

        // The controller may have moved on while we looked
        if self.controller.current_status().state != LifecycleState::Running {
            return None;
        }

        match self.controller.restart().await {
            Ok(_) => Some(reason),
            Err(e) => {
                error!(?reason, "Gateway restart failed: {}", e);
                None
            }
        }
    }
}
