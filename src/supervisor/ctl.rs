//! supervisorctl transport
//!
//! Each call spawns `supervisorctl <action> <program>` (optionally via
//! `sudo -n`) and classifies its output. Transport failures map to
//! `SupervisorUnreachable` so the retry layer can try again; an unknown
//! program maps to `UnknownProgram` and is never retried.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{validate_program_name, ProcessState, ProcessStatus, ProcessSupervisor};
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};

/// Output of one supervisorctl invocation
#[derive(Debug, Clone)]
struct CtlOutput {
    success: bool,
    text: String,
}

/// [`ProcessSupervisor`] backed by supervisorctl
#[derive(Debug, Clone)]
pub struct SupervisorCtl {
    command: String,
    program: String,
    use_sudo: bool,
}

impl SupervisorCtl {
    pub fn new(command: impl Into<String>, program: impl Into<String>, use_sudo: bool) -> Result<Self> {
        let program = program.into();
        validate_program_name(&program)?;
        Ok(SupervisorCtl {
            command: command.into(),
            program,
            use_sudo,
        })
    }

    /// Build from config, resolving the command in PATH when possible
    pub fn from_config(config: &SupervisorConfig) -> Result<Self> {
        let command = match which::which(&config.command) {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                warn!("{} not found in PATH ({}); using it verbatim", config.command, e);
                config.command.clone()
            }
        };
        Self::new(command, config.program.clone(), config.use_sudo)
    }

    async fn run(&self, action: &str) -> Result<CtlOutput> {
        let mut command = if self.use_sudo {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(&self.command);
            c
        } else {
            Command::new(&self.command)
        };
        command
            .arg(action)
            .arg(&self.program)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(action, program = %self.program, "Running supervisorctl");

        let output = command.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::Supervisor(format!("{} not found: {}", self.command, e))
            }
            _ => Error::SupervisorUnreachable(format!("failed to spawn {}: {}", self.command, e)),
        })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CtlOutput {
            success: output.status.success(),
            text,
        })
    }
}

/// Map supervisorctl output of a lifecycle action to a result
fn classify(action: &str, program: &str, output: &CtlOutput) -> Result<()> {
    let lower = output.text.to_lowercase();

    if lower.contains("no such process") || lower.contains("no such group") {
        return Err(Error::UnknownProgram(program.to_string()));
    }
    if is_unreachable(&lower) {
        return Err(Error::SupervisorUnreachable(output.text.trim().to_string()));
    }

    let idempotent_ok = match action {
        "start" => lower.contains("already started"),
        "stop" => lower.contains("not running"),
        _ => false,
    };

    if output.success || idempotent_ok {
        Ok(())
    } else {
        Err(Error::Supervisor(format!(
            "{} {} failed: {}",
            action,
            program,
            output.text.trim()
        )))
    }
}

fn is_unreachable(lower: &str) -> bool {
    lower.contains("refused connection")
        || lower.contains("connection refused")
        || lower.contains("no such file")
        || lower.contains("shutdown_state")
        || lower.contains("is the supervisord running")
}

/// Parse `NAME  RUNNING   pid 123, uptime 0:01:23`
pub fn parse_status(program: &str, text: &str) -> Result<ProcessStatus> {
    let lower = text.to_lowercase();
    if lower.contains("no such process") {
        return Err(Error::UnknownProgram(program.to_string()));
    }
    if is_unreachable(&lower) {
        return Err(Error::SupervisorUnreachable(text.trim().to_string()));
    }

    let line = text
        .lines()
        .find(|l| l.split_whitespace().next() == Some(program))
        .ok_or_else(|| Error::Supervisor(format!("unexpected status output: {}", text.trim())))?;

    let mut tokens = line.split_whitespace().skip(1);
    let state = tokens
        .next()
        .map(ProcessState::from_supervisor)
        .unwrap_or(ProcessState::Unknown);

    let pid = line
        .split_whitespace()
        .skip_while(|t| *t != "pid")
        .nth(1)
        .and_then(|t| t.trim_end_matches(',').parse().ok());

    Ok(ProcessStatus { state, pid })
}

#[async_trait]
impl ProcessSupervisor for SupervisorCtl {
    fn program(&self) -> &str {
        &self.program
    }

    async fn start(&self) -> Result<()> {
        let output = self.run("start").await?;
        classify("start", &self.program, &output)?;
        info!(program = %self.program, "Started via supervisor");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let output = self.run("stop").await?;
        classify("stop", &self.program, &output)?;
        info!(program = %self.program, "Stopped via supervisor");
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        let output = self.run("restart").await?;
        classify("restart", &self.program, &output)?;
        info!(program = %self.program, "Restarted via supervisor");
        Ok(())
    }

    async fn status(&self) -> Result<ProcessStatus> {
        // supervisorctl exits non-zero for non-running programs; the text decides
        let output = self.run("status").await?;
        parse_status(&self.program, &output.text)
    }
}
