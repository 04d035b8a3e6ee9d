//! Concurrent task runner.
//!
//! Bounds outbound work three ways: a fair semaphore caps how many
//! operations run at once, a rolling sixty-second window caps how many may
//! start per minute, and every attempt runs under a timeout. Retryable
//! failures (network faults and timeouts) are re-attempted with exponential
//! backoff inside a bounded loop; everything else returns to the caller on
//! the first attempt.
//!
//! Waiters queue FIFO on the semaphore, so a burst of submissions drains in
//! submission order.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::version::error::CheckError;

const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Operations allowed in flight at once.
    pub max_concurrency: usize,
    /// Operation starts allowed inside any rolling sixty-second window.
    pub max_per_minute: usize,
    /// Per-attempt deadline; expiry abandons the attempt and counts as a
    /// retryable failure.
    pub task_timeout: Duration,
    /// Re-attempts after the first try.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Floor applied to backoff after a network-class failure.
    pub min_network_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_per_minute: 60,
            task_timeout: Duration::from_secs(60),
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            min_network_backoff: Duration::from_secs(5),
        }
    }
}

pub struct TaskRunner {
    semaphore: Semaphore,
    window: Mutex<VecDeque<Instant>>,
    config: RunnerConfig,
}

impl TaskRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            semaphore: Semaphore::new(config.max_concurrency.max(1)),
            window: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Run `factory`'s operation under the concurrency cap, rate window,
    /// timeout and retry policy. The factory is invoked once per attempt.
    pub async fn run<F, Fut, T>(&self, factory: F) -> Result<T, CheckError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CheckError>>,
    {
        // The semaphore is never closed, so acquire cannot fail.
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("runner semaphore closed"),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.reserve_rate_slot().await;

            let error = match tokio::time::timeout(self.config.task_timeout, factory()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_retryable() => e,
                Ok(Err(e)) => return Err(e),
                Err(_) => CheckError::Timeout(self.config.task_timeout),
            };

            if attempt > self.config.max_retries {
                warn!("giving up after {} attempts: {}", attempt, error);
                return Err(error);
            }

            let backoff = self.backoff_for(attempt, &error);
            warn!(
                "attempt {} failed ({}), retrying in {:?}",
                attempt, error, backoff
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Block until starting an operation keeps the window under the cap.
    /// The lock is held only to update the counter, never across a sleep.
    async fn reserve_rate_slot(&self) {
        loop {
            let wait = {
                let mut window = match self.window.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= RATE_WINDOW)
                {
                    window.pop_front();
                }
                if window.len() < self.config.max_per_minute {
                    window.push_back(now);
                    None
                } else {
                    window
                        .front()
                        .map(|oldest| RATE_WINDOW - now.duration_since(*oldest))
                }
            };
            match wait {
                None => return,
                Some(delay) => {
                    debug!("rate window full, waiting {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn backoff_for(&self, attempt: u32, error: &CheckError) -> Duration {
        let exp = self
            .config
            .base_backoff
            .saturating_mul(1u32 << (attempt - 1).min(16));
        let mut backoff = exp.min(self.config.max_backoff);
        if matches!(error, CheckError::Transport(_)) {
            backoff = backoff.max(self.config.min_network_backoff);
        }
        backoff
    }
}
