//! In-memory supervisor for tests

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use super::{ProcessState, ProcessStatus, ProcessSupervisor};
use crate::error::{Error, Result};

#[derive(Default, Clone, Copy)]
struct Faults {
    remaining: u32,
    make: Option<fn() -> Error>,
}

impl Faults {
    fn take(&mut self) -> Option<Error> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.make.map(|make| make())
    }
}

#[derive(Default)]
struct FakeState {
    process: Option<ProcessState>,
    start_faults: Faults,
    stop_faults: Faults,
    restart_faults: Faults,
    start_delay: Duration,
    stop_delay: Duration,
    starts: u32,
    stops: u32,
    restarts: u32,
}

/// Supervisor that only flips a state flag
pub struct FakeSupervisor {
    program: String,
    state: Mutex<FakeState>,
}

impl FakeSupervisor {
    pub fn new() -> Self {
        FakeSupervisor {
            program: "clawdbot-gateway".to_string(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn running() -> Self {
        let fake = Self::new();
        fake.set_process(ProcessState::Running);
        fake
    }

    pub fn set_process(&self, state: ProcessState) {
        self.state.lock().unwrap().process = Some(state);
    }

    pub fn fail_next_starts(&self, n: u32, make: fn() -> Error) {
        self.state.lock().unwrap().start_faults = Faults {
            remaining: n,
            make: Some(make),
        };
    }

    pub fn fail_next_stops(&self, n: u32, make: fn() -> Error) {
        self.state.lock().unwrap().stop_faults = Faults {
            remaining: n,
            make: Some(make),
        };
    }

    pub fn fail_next_restarts(&self, n: u32, make: fn() -> Error) {
        self.state.lock().unwrap().restart_faults = Faults {
            remaining: n,
            make: Some(make),
        };
    }

    pub fn set_start_delay(&self, delay: Duration) {
        self.state.lock().unwrap().start_delay = delay;
    }

    pub fn set_stop_delay(&self, delay: Duration) {
        self.state.lock().unwrap().stop_delay = delay;
    }

    pub fn start_calls(&self) -> u32 {
        self.state.lock().unwrap().starts
    }

    pub fn stop_calls(&self) -> u32 {
        self.state.lock().unwrap().stops
    }

    pub fn restart_calls(&self) -> u32 {
        self.state.lock().unwrap().restarts
    }
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    fn program(&self) -> &str {
        &self.program
    }

    async fn start(&self) -> Result<()> {
        let (delay, fault) = {
            let mut s = self.state.lock().unwrap();
            s.starts += 1;
            (s.start_delay, s.start_faults.take())
        };
        tokio::time::sleep(delay).await;
        if let Some(e) = fault {
            return Err(e);
        }
        self.set_process(ProcessState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let (delay, fault) = {
            let mut s = self.state.lock().unwrap();
            s.stops += 1;
            (s.stop_delay, s.stop_faults.take())
        };
        tokio::time::sleep(delay).await;
        if let Some(e) = fault {
            return Err(e);
        }
        self.set_process(ProcessState::Stopped);
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        let fault = {
            let mut s = self.state.lock().unwrap();
            s.restarts += 1;
            s.restart_faults.take()
        };
        if let Some(e) = fault {
            return Err(e);
        }
        self.set_process(ProcessState::Running);
        Ok(())
    }

    async fn status(&self) -> Result<ProcessStatus> {
        let state = self
            .state
            .lock()
            .unwrap()
            .process
            .unwrap_or(ProcessState::Stopped);
        Ok(ProcessStatus {
            state,
            pid: (state == ProcessState::Running).then_some(4242),
        })
    }
}
