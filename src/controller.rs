//! GatewayController - the only writer of gateway lifecycle state
//!
//! ## Lifecycle
//!
//! ```text
//!   Stopped ──► Starting ──► Running ──► Stopping ──► Stopped
//!                  │            │
//!                  └────────────┴──► Failed ──► Starting
//! ```
//!
//! Transitions are claimed under a short synchronous lock and never hold it
//! across I/O. Filesystem and supervisor work for one transition is
//! serialized by a second, async lock. Readers get a snapshot through a
//! `watch` channel and never contend with a transition in flight.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use crate::config::GatewaySettings;
use crate::error::{Error, Result};
use crate::gateway::{
    ConfigBuilder, ConfigStore, GatewayConfig, GatewayFileWriter, Provider, ProviderSelection,
    SecretWriter,
};
use crate::supervisor::{ProcessState, ProcessStatus, ProcessSupervisor};

/// Gateway lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl LifecycleState {
    /// A transition is in flight
    pub fn is_transitional(self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Stopping)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the gateway
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub state: LifecycleState,
    /// Seconds since the gateway reached `Running`
    pub uptime: Option<u64>,
    pub last_error: Option<String>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Result of a successful start
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub status: GatewayStatus,
    pub token: String,
    pub token_changed: bool,
}

/// The state object; one per controller
struct Lifecycle {
    state: LifecycleState,
    /// Bumped on every claimed transition; a stale start cannot land
    epoch: u64,
    cancel: Option<Arc<Notify>>,
    /// Last selection that reached `Running`, provider key included
    selection: Option<ProviderSelection>,
    token: Option<String>,
    provider: Option<Provider>,
    model: Option<String>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl Lifecycle {
    fn new() -> Self {
        Lifecycle {
            state: LifecycleState::Stopped,
            epoch: 0,
            cancel: None,
            selection: None,
            token: None,
            provider: None,
            model: None,
            started_at: None,
            last_error: None,
        }
    }

    fn snapshot(&self) -> GatewayStatus {
        GatewayStatus {
            state: self.state,
            uptime: None,
            last_error: self.last_error.clone(),
            provider: self.provider,
            model: self.model.clone(),
            started_at: self.started_at,
        }
    }
}

/// Claimed transition
struct Claim {
    epoch: u64,
    previous: LifecycleState,
    cancel: Arc<Notify>,
}

/// How a persisted configuration is brought up
#[derive(Debug, Clone, Copy)]
enum Launch {
    Start,
    Restart,
}

/// Orchestrates configuration, secrets and the process supervisor
pub struct GatewayController {
    builder: ConfigBuilder,
    secrets: SecretWriter,
    gateway_file: GatewayFileWriter,
    store: Arc<dyn ConfigStore>,
    supervisor: Arc<dyn ProcessSupervisor>,
    inner: Mutex<Lifecycle>,
    ops: tokio::sync::Mutex<()>,
    status_tx: watch::Sender<GatewayStatus>,
}

impl GatewayController {
    pub fn new(
        settings: GatewaySettings,
        store: Arc<dyn ConfigStore>,
        supervisor: Arc<dyn ProcessSupervisor>,
    ) -> Self {
        let lifecycle = Lifecycle::new();
        let (status_tx, _) = watch::channel(lifecycle.snapshot());
        Self {
            secrets: SecretWriter::new(settings.secrets_path()),
            gateway_file: GatewayFileWriter::new(
                settings.gateway_file_path(),
                settings.emergent_base_url.clone(),
            ),
            builder: ConfigBuilder::new(settings),
            store,
            supervisor,
            inner: Mutex::new(lifecycle),
            ops: tokio::sync::Mutex::new(()),
            status_tx,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        self.builder.settings()
    }

    /// Snapshot of the lifecycle; never waits on a transition
    pub fn current_status(&self) -> GatewayStatus {
        let mut status = self.status_tx.borrow().clone();
        if status.state == LifecycleState::Running {
            status.uptime = status
                .started_at
                .map(|t| (Utc::now() - t).num_seconds().max(0) as u64);
        }
        status
    }

    /// Receive every published status change
    pub fn subscribe(&self) -> watch::Receiver<GatewayStatus> {
        self.status_tx.subscribe()
    }

    /// Token of the running gateway
    pub fn token(&self) -> Option<String> {
        let lifecycle = self.lifecycle();
        match lifecycle.state {
            LifecycleState::Running => lifecycle.token.clone(),
            _ => None,
        }
    }

    /// What the process manager reports right now
    pub async fn process_status(&self) -> Result<ProcessStatus> {
        self.supervisor.status().await
    }

    /// Configure and start the gateway.
    ///
    /// Allowed from `Stopped`, `Failed` and `Running`; from `Running` the
    /// gateway is stopped and relaunched with the new configuration.
    pub async fn start_with_config(&self, selection: ProviderSelection) -> Result<StartOutcome> {
        selection.validate()?;

        let claim = self.claim_start()?;
        let ops = self.ops.lock().await;
        self.ensure_current(claim.epoch)?;

        let current = self
            .store
            .load()
            .await
            .map_err(|e| self.revert(&claim, e))?;
        let mut built = self
            .builder
            .build(current.as_ref(), &selection)
            .map_err(|e| self.revert(&claim, e))?;

        // Nothing has changed on disk until this succeeds
        let writer = self.secrets.clone();
        let secrets = built.secrets.clone();
        blocking(move || writer.write(&secrets))
            .await
            .map_err(|e| self.revert(&claim, e))?;

        built.config.should_run = true;
        built.config.started_at = Some(Utc::now());
        let writer = self.gateway_file.clone();
        let config = built.config.clone();
        blocking(move || writer.write(&config))
            .await
            .map_err(|e| self.fail(claim.epoch, e))?;
        self.store
            .save(&built.config)
            .await
            .map_err(|e| self.fail(claim.epoch, e))?;

        if claim.previous == LifecycleState::Running {
            info!("Reconfiguring running gateway");
            self.supervisor
                .stop()
                .await
                .map_err(|e| self.fail(claim.epoch, e))?;
        }
        self.supervisor
            .start()
            .await
            .map_err(|e| self.fail(claim.epoch, e))?;
        drop(ops);

        self.await_ready(&claim, built.config.control_port).await?;
        self.mark_running(&claim, &built.config, Some(selection))?;

        info!(
            provider = %built.config.provider,
            model = %built.config.model,
            token_changed = built.token_changed,
            "Gateway running"
        );

        Ok(StartOutcome {
            status: self.current_status(),
            token: built.config.token,
            token_changed: built.token_changed,
        })
    }

    /// Stop the gateway and forget its secrets. Stopping a stopped gateway
    /// is a no-op.
    pub async fn stop(&self) -> Result<GatewayStatus> {
        let epoch = {
            let mut lifecycle = self.lifecycle();
            match lifecycle.state {
                LifecycleState::Stopped => return Ok(lifecycle.snapshot()),
                LifecycleState::Stopping => {
                    return Err(Error::InvalidTransition(
                        "gateway is already stopping".to_string(),
                    ))
                }
                _ => {}
            }
            if let Some(cancel) = lifecycle.cancel.take() {
                cancel.notify_one();
            }
            lifecycle.epoch += 1;
            lifecycle.state = LifecycleState::Stopping;
            self.publish(&lifecycle);
            lifecycle.epoch
        };
        info!("Stopping gateway");

        let _ops = self.ops.lock().await;

        self.supervisor
            .stop()
            .await
            .map_err(|e| self.fail(epoch, e))?;

        let writer = self.secrets.clone();
        if let Err(e) = blocking(move || writer.clear()).await {
            warn!("Failed to clear gateway secrets: {}", e);
        }
        match self.store.load().await {
            Ok(Some(mut config)) => {
                config.should_run = false;
                config.updated_at = Utc::now();
                if let Err(e) = self.store.save(&config).await {
                    warn!("Failed to persist stopped gateway state: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to load gateway config while stopping: {}", e),
        }

        let mut lifecycle = self.lifecycle();
        if lifecycle.epoch == epoch {
            lifecycle.state = LifecycleState::Stopped;
            lifecycle.selection = None;
            lifecycle.token = None;
            lifecycle.started_at = None;
            lifecycle.last_error = None;
            self.publish(&lifecycle);
            info!("Gateway stopped");
        }
        Ok(lifecycle.snapshot())
    }

    /// Stop then start with the last known configuration.
    ///
    /// Without a selection in memory the persisted document and the secrets
    /// file on disk are relaunched as they are.
    pub async fn restart(&self) -> Result<GatewayStatus> {
        let selection = {
            let lifecycle = self.lifecycle();
            if lifecycle.state.is_transitional() {
                return Err(Error::InvalidTransition(format!(
                    "cannot restart while {}",
                    lifecycle.state
                )));
            }
            lifecycle.selection.clone()
        };

        match selection {
            Some(selection) => {
                info!("Restarting gateway with last selection");
                self.stop().await?;
                Ok(self.start_with_config(selection).await?.status)
            }
            None => {
                info!("Restarting gateway from persisted configuration");
                self.launch_persisted(Launch::Restart).await
            }
        }
    }

    /// Reconcile with the process manager after the host starts.
    ///
    /// A gateway the supervisor already runs is adopted; one that should be
    /// running is relaunched from disk.
    pub async fn recover(&self) -> Result<GatewayStatus> {
        let process = match self.supervisor.status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("Supervisor status unavailable during recovery: {}", e);
                return Ok(self.current_status());
            }
        };
        let config = self.store.load().await?;

        if process.is_running() {
            let Some(mut config) = config else {
                warn!("Gateway is running but no configuration is stored; leaving it alone");
                return Ok(self.current_status());
            };
            if !config.has_token() {
                if let Some(token) = self.gateway_file.read_token() {
                    config.token = token;
                }
            }
            if !config.has_token() {
                warn!("Gateway is running without a known token; not adopting it");
                return Ok(self.current_status());
            }

            let claim = self.claim_start()?;
            self.mark_running(&claim, &config, None)?;
            info!(pid = ?process.pid, provider = %config.provider, "Adopted running gateway");
            return Ok(self.current_status());
        }

        match config {
            Some(config) if config.should_run && self.secrets.exists() => {
                info!("Relaunching gateway marked to run");
                self.launch_persisted(Launch::Start).await
            }
            Some(config) if config.should_run => {
                warn!(
                    path = %self.secrets.path().display(),
                    "Gateway marked to run but its secrets file is missing"
                );
                Ok(self.current_status())
            }
            _ => Ok(self.current_status()),
        }
    }

    async fn launch_persisted(&self, launch: Launch) -> Result<GatewayStatus> {
        let claim = self.claim_start()?;
        let ops = self.ops.lock().await;
        self.ensure_current(claim.epoch)?;

        let mut config = match self.store.load().await {
            Ok(Some(config)) if config.has_token() => config,
            Ok(_) => {
                return Err(self.revert(
                    &claim,
                    Error::InvalidTransition("no gateway configuration to launch".to_string()),
                ))
            }
            Err(e) => return Err(self.revert(&claim, e)),
        };
        if !self.secrets.exists() {
            return Err(self.revert(
                &claim,
                Error::InvalidTransition(
                    "gateway secrets are missing; start with a provider selection".to_string(),
                ),
            ));
        }

        config.should_run = true;
        config.started_at = Some(Utc::now());
        config.updated_at = Utc::now();
        self.store
            .save(&config)
            .await
            .map_err(|e| self.fail(claim.epoch, e))?;

        let launched = match launch {
            Launch::Start => self.supervisor.start().await,
            Launch::Restart => self.supervisor.restart().await,
        };
        launched.map_err(|e| self.fail(claim.epoch, e))?;
        drop(ops);

        self.await_ready(&claim, config.control_port).await?;
        self.mark_running(&claim, &config, None)?;
        info!(provider = %config.provider, "Gateway running");
        Ok(self.current_status())
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, lifecycle: &Lifecycle) {
        debug!(state = %lifecycle.state, epoch = lifecycle.epoch, "Lifecycle transition");
        self.status_tx.send_replace(lifecycle.snapshot());
    }

    fn claim_start(&self) -> Result<Claim> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state.is_transitional() {
            return Err(Error::InvalidTransition(format!(
                "cannot start while {}",
                lifecycle.state
            )));
        }

        let cancel = Arc::new(Notify::new());
        let claim = Claim {
            epoch: lifecycle.epoch + 1,
            previous: lifecycle.state,
            cancel: cancel.clone(),
        };
        lifecycle.epoch = claim.epoch;
        lifecycle.cancel = Some(cancel);
        lifecycle.state = LifecycleState::Starting;
        lifecycle.last_error = None;
        self.publish(&lifecycle);
        Ok(claim)
    }

    fn ensure_current(&self, epoch: u64) -> Result<()> {
        if self.lifecycle().epoch == epoch {
            Ok(())
        } else {
            Err(Error::InvalidTransition(
                "start was superseded by stop".to_string(),
            ))
        }
    }

    /// Undo a claim that failed before anything was launched
    fn revert(&self, claim: &Claim, err: Error) -> Error {
        let mut lifecycle = self.lifecycle();
        if lifecycle.epoch == claim.epoch {
            lifecycle.state = claim.previous;
            lifecycle.cancel = None;
            self.publish(&lifecycle);
        }
        warn!("Gateway start aborted: {}", err);
        err
    }

    fn fail(&self, epoch: u64, err: Error) -> Error {
        let mut lifecycle = self.lifecycle();
        if lifecycle.epoch == epoch {
            lifecycle.state = LifecycleState::Failed;
            lifecycle.cancel = None;
            lifecycle.token = None;
            lifecycle.last_error = Some(err.to_string());
            self.publish(&lifecycle);
        }
        error!(code = err.code(), "Gateway transition failed: {}", err);
        err
    }

    fn mark_running(
        &self,
        claim: &Claim,
        config: &GatewayConfig,
        selection: Option<ProviderSelection>,
    ) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.epoch != claim.epoch {
            return Err(Error::InvalidTransition(
                "start was superseded by stop".to_string(),
            ));
        }
        lifecycle.state = LifecycleState::Running;
        lifecycle.cancel = None;
        lifecycle.token = Some(config.token.clone());
        lifecycle.provider = Some(config.provider);
        lifecycle.model = Some(config.model.clone());
        lifecycle.started_at = config.started_at.or_else(|| Some(Utc::now()));
        lifecycle.last_error = None;
        if selection.is_some() {
            lifecycle.selection = selection;
        }
        self.publish(&lifecycle);
        Ok(())
    }

    /// Poll until the supervisor reports running and the control port
    /// accepts connections. Returns early when `stop` cancels the claim.
    async fn await_ready(&self, claim: &Claim, control_port: u16) -> Result<()> {
        let settings = self.settings();
        let limit = settings.start_timeout;
        let interval = settings.poll_interval;

        let poll = async {
            loop {
                match self.check_ready(control_port).await {
                    Readiness::Ready => return Ok(()),
                    Readiness::Dead(state) => {
                        return Err(Error::Supervisor(format!(
                            "gateway entered {} while starting",
                            state
                        )))
                    }
                    Readiness::Pending => tokio::time::sleep(interval).await,
                }
            }
        };

        tokio::select! {
            _ = claim.cancel.notified() => Err(Error::InvalidTransition(
                "start was cancelled by stop".to_string(),
            )),
            result = tokio::time::timeout(limit, poll) => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(self.fail(claim.epoch, e)),
                Err(_) => Err(self.fail(
                    claim.epoch,
                    Error::SupervisorTimeout(format!("gateway not ready within {:?}", limit)),
                )),
            },
        }
    }

    async fn check_ready(&self, control_port: u16) -> Readiness {
        match self.supervisor.status().await {
            Ok(status) if status.is_running() => {}
            Ok(status) if status.state == ProcessState::Fatal => return Readiness::Dead(status.state),
            Ok(status) => {
                debug!(state = %status.state, "Gateway not running yet");
                return Readiness::Pending;
            }
            Err(e) => {
                debug!("Supervisor status failed while starting: {}", e);
                return Readiness::Pending;
            }
        }

        let connect = TcpStream::connect((Ipv4Addr::LOCALHOST, control_port));
        match tokio::time::timeout(Duration::from_secs(2), connect).await {
            Ok(Ok(_)) => Readiness::Ready,
            _ => Readiness::Pending,
        }
    }
}

enum Readiness {
    Ready,
    Pending,
    Dead(ProcessState),
}

/// Run filesystem work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Internal(format!("file task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryConfigStore, SecretWriter, TOKEN_ENV};
    use crate::supervisor::testing::FakeSupervisor;
    use crate::test_support::{
        dead_port, gateway_with, listening_gateway, openai_selection as openai, stopped_gateway,
        test_settings,
    };
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_start_stop_cycle() {
        let h = listening_gateway(1).await;

        let first = h.controller.start_with_config(openai()).await.unwrap();
        assert_eq!(first.status.state, LifecycleState::Running);
        assert!(!first.token.is_empty());
        assert_eq!(h.controller.token(), Some(first.token.clone()));

        let second = h
            .controller
            .start_with_config(openai().with_model("gpt-x"))
            .await
            .unwrap();
        assert_eq!(second.status.state, LifecycleState::Running);
        assert_eq!(second.token, first.token);
        assert!(!second.token_changed);
        assert_eq!(second.status.model.as_deref(), Some("openai/gpt-x"));

        let stopped = h.controller.stop().await.unwrap();
        assert_eq!(stopped.state, LifecycleState::Stopped);
        assert!(h.controller.token().is_none());
        assert!(!SecretWriter::new(h.home().join("gateway.env")).exists());
        assert!(!h.store.load().await.unwrap().unwrap().should_run);
    }

    #[tokio::test]
    async fn test_critical_change_rotates_token() {
        let h = listening_gateway(1).await;
        let first = h.controller.start_with_config(openai()).await.unwrap();

        let second = h
            .controller
            .start_with_config(ProviderSelection::new("anthropic").with_key("sk-ant-0123456789"))
            .await
            .unwrap();
        assert!(second.token_changed);
        assert!(!second.token.is_empty());
        assert_ne!(second.token, first.token);
    }

    #[tokio::test]
    async fn test_secrets_file_carries_token_and_key() {
        let h = listening_gateway(1).await;
        let outcome = h.controller.start_with_config(openai()).await.unwrap();

        let file = SecretWriter::new(h.home().join("gateway.env"))
            .read()
            .unwrap()
            .unwrap();
        assert_eq!(file.get(TOKEN_ENV), Some(&outcome.token));
        assert_eq!(
            file.get("OPENAI_API_KEY").map(String::as_str),
            Some("sk-validlengthkey1234")
        );
    }

    #[tokio::test]
    async fn test_gateway_file_records_token() {
        let h = listening_gateway(1).await;
        let outcome = h.controller.start_with_config(openai()).await.unwrap();

        let settings = test_settings(h.home(), 1, 1);
        let file = GatewayFileWriter::new(settings.gateway_file_path(), "");
        assert_eq!(file.read_token(), Some(outcome.token));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let h = listening_gateway(1).await;
        assert_eq!(h.controller.stop().await.unwrap().state, LifecycleState::Stopped);
        assert_eq!(h.controller.stop().await.unwrap().state, LifecycleState::Stopped);
        assert_eq!(h.supervisor.stop_calls(), 0);

        h.controller.start_with_config(openai()).await.unwrap();
        h.controller.stop().await.unwrap();
        assert_eq!(h.controller.stop().await.unwrap().state, LifecycleState::Stopped);
        assert_eq!(h.supervisor.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_starts_single_winner() {
        let h = listening_gateway(1).await;
        h.supervisor.set_start_delay(Duration::from_millis(50));

        let (a, b) = tokio::join!(
            h.controller.start_with_config(openai()),
            h.controller.start_with_config(openai()),
        );

        let results = [a, b];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(Error::InvalidTransition(_))))
            .count();
        assert_eq!((ok, rejected), (1, 1));
        assert_eq!(h.controller.current_status().state, LifecycleState::Running);
        assert_eq!(h.supervisor.start_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_selection_changes_nothing() {
        let h = listening_gateway(1).await;
        let err = h
            .controller
            .start_with_config(ProviderSelection::new("openai").with_key("short"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(h.controller.current_status().state, LifecycleState::Stopped);
        assert_eq!(h.supervisor.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_secret_write_failure_leaves_state() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let supervisor = Arc::new(FakeSupervisor::new());
        let controller = GatewayController::new(
            test_settings(&blocker.join("home"), 1, dead_port().await),
            Arc::new(MemoryConfigStore::new()),
            supervisor.clone(),
        );

        let err = controller.start_with_config(openai()).await.unwrap_err();
        assert!(matches!(err, Error::SecretWriteFailed(_)));
        assert_eq!(controller.current_status().state, LifecycleState::Stopped);
        assert_eq!(supervisor.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_supervisor_failure_marks_failed() {
        let h = listening_gateway(1).await;
        h.supervisor
            .fail_next_starts(1, || Error::UnknownProgram("clawdbot-gateway".into()));

        let err = h.controller.start_with_config(openai()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownProgram(_)));
        let status = h.controller.current_status();
        assert_eq!(status.state, LifecycleState::Failed);
        assert!(status.last_error.is_some());

        // Failed -> Starting on retry
        h.controller.start_with_config(openai()).await.unwrap();
        assert_eq!(h.controller.current_status().state, LifecycleState::Running);
    }

    #[tokio::test]
    async fn test_readiness_timeout_marks_failed() {
        let h = stopped_gateway(1, dead_port().await);
        let err = h.controller.start_with_config(openai()).await.unwrap_err();
        assert!(matches!(err, Error::SupervisorTimeout(_)));
        assert_eq!(h.controller.current_status().state, LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_stop_cancels_start_poll() {
        let h = stopped_gateway(1, dead_port().await);

        let controller = h.controller.clone();
        let start = tokio::spawn(async move { controller.start_with_config(openai()).await });

        let mut rx = h.controller.subscribe();
        rx.wait_for(|s| s.state == LifecycleState::Starting)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stopped = h.controller.stop().await.unwrap();
        assert_eq!(stopped.state, LifecycleState::Stopped);

        let result = start.await.unwrap();
        assert!(matches!(result, Err(Error::InvalidTransition(_))));
        assert_eq!(h.controller.current_status().state, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_keeps_token() {
        let h = listening_gateway(1).await;
        let first = h.controller.start_with_config(openai()).await.unwrap();

        let status = h.controller.restart().await.unwrap();
        assert_eq!(status.state, LifecycleState::Running);
        assert_eq!(h.controller.token(), Some(first.token));
        assert_eq!(h.supervisor.stop_calls(), 1);
        assert_eq!(h.supervisor.start_calls(), 2);
    }

    #[tokio::test]
    async fn test_recover_adopts_running_gateway() {
        let h = listening_gateway(1).await;
        let outcome = h.controller.start_with_config(openai()).await.unwrap();

        // Fresh controller over the same disk state, process still up
        let controller = GatewayController::new(
            h.controller.settings().clone(),
            h.store.clone(),
            h.supervisor.clone(),
        );
        assert_eq!(controller.current_status().state, LifecycleState::Stopped);

        let status = controller.recover().await.unwrap();
        assert_eq!(status.state, LifecycleState::Running);
        assert_eq!(controller.token(), Some(outcome.token));
        assert_eq!(h.supervisor.start_calls(), 1);
    }

    #[tokio::test]
    async fn test_recover_adopts_from_stored_document() {
        let home = tempdir().unwrap();
        let built = ConfigBuilder::new(test_settings(home.path(), 1, 1))
            .build(None, &openai())
            .unwrap();
        let token = built.config.token.clone();

        let h = gateway_with(
            1,
            1,
            FakeSupervisor::running(),
            MemoryConfigStore::with_config(built.config),
        );
        let status = h.controller.recover().await.unwrap();
        assert_eq!(status.state, LifecycleState::Running);
        assert_eq!(status.provider, Some(Provider::OpenAI));
        assert_eq!(h.controller.token(), Some(token));
        assert_eq!(h.supervisor.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_recover_relaunches_when_marked_to_run() {
        let h = listening_gateway(1).await;
        let outcome = h.controller.start_with_config(openai()).await.unwrap();
        h.supervisor.set_process(ProcessState::Stopped);

        let controller = GatewayController::new(
            h.controller.settings().clone(),
            h.store.clone(),
            h.supervisor.clone(),
        );
        let status = controller.recover().await.unwrap();
        assert_eq!(status.state, LifecycleState::Running);
        assert_eq!(controller.token(), Some(outcome.token.clone()));
        assert_eq!(h.supervisor.start_calls(), 2);

        // No selection in memory: restart relaunches from disk
        let status = controller.restart().await.unwrap();
        assert_eq!(status.state, LifecycleState::Running);
        assert_eq!(h.supervisor.restart_calls(), 1);
        assert_eq!(controller.token(), Some(outcome.token));
    }

    #[tokio::test]
    async fn test_recover_leaves_stopped_gateway() {
        let h = listening_gateway(1).await;
        h.controller.start_with_config(openai()).await.unwrap();
        h.controller.stop().await.unwrap();

        let controller = GatewayController::new(
            h.controller.settings().clone(),
            h.store.clone(),
            h.supervisor.clone(),
        );
        let status = controller.recover().await.unwrap();
        assert_eq!(status.state, LifecycleState::Stopped);
        assert_eq!(h.supervisor.start_calls(), 1);
    }
}
