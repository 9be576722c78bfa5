//! Timeouts and bounded retries around a [`ProcessSupervisor`]

use async_trait::async_trait;
use backoff::backoff::Constant;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

use super::{ProcessStatus, ProcessSupervisor};
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};

/// Per-action limits
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub restart_timeout: Duration,
    pub status_timeout: Duration,
    /// Retries after the first attempt, transient failures only
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl From<&SupervisorConfig> for RetryPolicy {
    fn from(config: &SupervisorConfig) -> Self {
        RetryPolicy {
            start_timeout: config.start_timeout,
            stop_timeout: config.stop_timeout,
            restart_timeout: config.restart_timeout,
            status_timeout: config.status_timeout,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&SupervisorConfig::default())
    }
}

/// Wraps a supervisor so every action is bounded in time and transient
/// failures are retried with a fixed delay.
///
/// The timeout covers the whole action including retries.
pub struct RetryingSupervisor<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: ProcessSupervisor> RetryingSupervisor<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        RetryingSupervisor { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn call<T, F, Fut>(&self, action: &'static str, limit: Duration, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        let max_retries = self.policy.max_retries;
        let program = self.inner.program();

        let retried = backoff::future::retry(Constant::new(self.policy.retry_delay), || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            let fut = op();
            async move {
                fut.await.map_err(|e| {
                    if e.is_retryable() && attempt < max_retries {
                        warn!(
                            action,
                            program,
                            attempt = attempt + 1,
                            "Supervisor call failed, retrying: {}",
                            e
                        );
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        });

        match tokio::time::timeout(limit, retried).await {
            Ok(result) => result,
            Err(_) => Err(Error::SupervisorTimeout(format!(
                "{} {} did not finish within {:?}",
                action, program, limit
            ))),
        }
    }
}

#[async_trait]
impl<S: ProcessSupervisor> ProcessSupervisor for RetryingSupervisor<S> {
    fn program(&self) -> &str {
        self.inner.program()
    }

    async fn start(&self) -> Result<()> {
        self.call("start", self.policy.start_timeout, || self.inner.start())
            .await
    }

    async fn stop(&self) -> Result<()> {
        self.call("stop", self.policy.stop_timeout, || self.inner.stop())
            .await
    }

    async fn restart(&self) -> Result<()> {
        self.call("restart", self.policy.restart_timeout, || self.inner.restart())
            .await
    }

    async fn status(&self) -> Result<ProcessStatus> {
        self.call("status", self.policy.status_timeout, || self.inner.status())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::testing::FakeSupervisor;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            start_timeout: Duration::from_secs(15),
            stop_timeout: Duration::from_secs(30),
            restart_timeout: Duration::from_secs(45),
            status_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let fake = FakeSupervisor::new();
        fake.fail_next_starts(2, || Error::SupervisorUnreachable("refused".into()));
        let sup = RetryingSupervisor::new(fake, policy());

        sup.start().await.unwrap();
        assert_eq!(sup.inner().start_calls(), 3);
        assert!(sup.status().await.unwrap().is_running());
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let fake = FakeSupervisor::new();
        fake.fail_next_starts(10, || Error::SupervisorUnreachable("refused".into()));
        let sup = RetryingSupervisor::new(fake, policy());

        let err = sup.start().await.unwrap_err();
        assert!(matches!(err, Error::SupervisorUnreachable(_)));
        assert_eq!(sup.inner().start_calls(), 4);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let fake = FakeSupervisor::new();
        fake.fail_next_starts(1, || Error::UnknownProgram("gw".into()));
        let sup = RetryingSupervisor::new(fake, policy());

        assert!(matches!(sup.start().await, Err(Error::UnknownProgram(_))));
        assert_eq!(sup.inner().start_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_stop_times_out() {
        let fake = FakeSupervisor::new();
        fake.set_stop_delay(Duration::from_secs(3600));
        let sup = RetryingSupervisor::new(fake, policy());

        let started = tokio::time::Instant::now();
        assert!(matches!(sup.stop().await, Err(Error::SupervisorTimeout(_))));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
