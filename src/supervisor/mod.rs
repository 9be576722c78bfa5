//! Supervisor module - external process manager behind a trait
//!
//! - [`SupervisorCtl`]: drives `supervisorctl start|stop|restart|status`
//! - [`RetryingSupervisor`]: timeouts and bounded retries around any
//!   [`ProcessSupervisor`]

mod ctl;
mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use ctl::{parse_status, SupervisorCtl};
pub use retry::{RetryPolicy, RetryingSupervisor};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};

/// Process state as reported by the process manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Backoff,
    Stopping,
    Exited,
    Fatal,
    Unknown,
}

impl ProcessState {
    pub fn from_supervisor(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "STOPPED" => ProcessState::Stopped,
            "STARTING" => ProcessState::Starting,
            "RUNNING" => ProcessState::Running,
            "BACKOFF" => ProcessState::Backoff,
            "STOPPING" => ProcessState::Stopping,
            "EXITED" => ProcessState::Exited,
            "FATAL" => ProcessState::Fatal,
            _ => ProcessState::Unknown,
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Backoff => "backoff",
            ProcessState::Stopping => "stopping",
            ProcessState::Exited => "exited",
            ProcessState::Fatal => "fatal",
            ProcessState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Snapshot of the supervised program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    pub state: ProcessState,
    pub pid: Option<u32>,
}

impl ProcessStatus {
    pub fn stopped() -> Self {
        ProcessStatus {
            state: ProcessState::Stopped,
            pid: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }
}

/// Control surface of the external process manager.
///
/// `start`, `stop` and `restart` are idempotent from the caller's side:
/// stopping a stopped program succeeds.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Program this supervisor controls
    fn program(&self) -> &str;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn restart(&self) -> Result<()>;

    async fn status(&self) -> Result<ProcessStatus>;
}

/// Program names end up as process arguments; keep them boring.
pub fn validate_program_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(Error::Config(format!(
            "Supervisor program name must be 1 to 64 characters: {:?}",
            name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Config(format!(
            "Invalid supervisor program name: {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_names() {
        assert!(validate_program_name("clawdbot-gateway").is_ok());
        assert!(validate_program_name("gw_2").is_ok());
        assert!(validate_program_name("").is_err());
        assert!(validate_program_name("gw;id").is_err());
        assert!(validate_program_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(ProcessState::from_supervisor("RUNNING"), ProcessState::Running);
        assert_eq!(ProcessState::from_supervisor("fatal"), ProcessState::Fatal);
        assert_eq!(ProcessState::from_supervisor("???"), ProcessState::Unknown);
    }
}
