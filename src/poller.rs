//! Poll-after-settle scheduling. The next fetch is armed only once the
//! previous one has finished, so a slow server is never hit concurrently.
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ApiResult;

/// What a poller does after a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep polling with exponential backoff.
    #[default]
    Retry,
    /// End the chain at the first failure.
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Starting,
    Running { ticks: u64 },
    Failed { error: String, attempts: u32 },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub policy: FailurePolicy,
    /// Zero disables the cap.
    pub max_backoff: Duration,
}

impl PollConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            policy: FailurePolicy::Retry,
            max_backoff: Duration::from_secs(300),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy, max_backoff: Duration) -> Self {
        self.policy = policy;
        self.max_backoff = max_backoff;
        self
    }
}

/// `interval * 2^(failures-1)`, capped, never shorter than the interval.
pub fn backoff_delay(interval: Duration, failures: u32, max_backoff: Duration) -> Duration {
    let exp = failures.saturating_sub(1).min(10);
    let delay = interval.saturating_mul(1u32 << exp);
    let capped = if max_backoff.is_zero() {
        delay
    } else {
        delay.min(max_backoff)
    };
    capped.max(interval)
}

/// Owned by a view; dropping it stops the polling chain.
#[derive(Debug)]
pub struct PollHandle {
    name: &'static str,
    token: CancellationToken,
    refresh: Arc<Notify>,
    state: watch::Receiver<PollState>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    /// Stop the loop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Skip the remaining delay and fetch now.
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    /// Cancel and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Start polling `tick` until cancelled.
pub fn spawn<F, Fut>(name: &'static str, config: PollConfig, mut tick: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ApiResult<()>> + Send + 'static,
{
    let token = CancellationToken::new();
    let refresh = Arc::new(Notify::new());
    let (state_tx, state_rx) = watch::channel(PollState::Starting);

    let task_token = token.clone();
    let task_refresh = Arc::clone(&refresh);
    let task = tokio::spawn(async move {
        let mut ticks = 0u64;
        let mut failures = 0u32;
        loop {
            let result = tokio::select! {
                _ = task_token.cancelled() => break,
                result = tick() => result,
            };
            let delay = match result {
                Ok(()) => {
                    ticks += 1;
                    failures = 0;
                    let _ = state_tx.send(PollState::Running { ticks });
                    config.interval
                }
                Err(err) => {
                    failures += 1;
                    warn!(poller = name, ?err, attempts = failures, "poll failed");
                    let _ = state_tx.send(PollState::Failed {
                        error: err.to_string(),
                        attempts: failures,
                    });
                    if config.policy == FailurePolicy::Stop {
                        info!(poller = name, "polling chain ended after failure");
                        return;
                    }
                    backoff_delay(config.interval, failures, config.max_backoff)
                }
            };
            debug!(poller = name, delay_ms = delay.as_millis() as u64, "next poll scheduled");
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
                _ = task_refresh.notified() => {}
            }
        }
        let _ = state_tx.send(PollState::Stopped);
        debug!(poller = name, "poller stopped");
    });

    PollHandle {
        name,
        token,
        refresh,
        state: state_rx,
        task: Some(task),
    }
}
