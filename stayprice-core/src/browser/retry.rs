use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::config::SessionSection;

use super::error::BrowserResult;
use super::metrics::SessionMetrics;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Duration,
    jitter_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: usize,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff: Duration, jitter_seconds: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            jitter_seconds,
        }
    }

    pub fn from_config(config: &SessionSection) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.retry_backoff_seconds),
            config.jitter_seconds,
        )
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::from_secs(0);
        }
        let mut delay = self.backoff;
        if self.jitter_seconds > 0 {
            let jitter = rand::thread_rng().gen_range(0..=self.jitter_seconds);
            delay += Duration::from_secs(jitter);
        }
        delay
    }

    /// Runs `operation` until it succeeds or the attempt budget is spent,
    /// returning the last error in the latter case.
    pub async fn run<F, Fut, T>(
        &self,
        label: &str,
        metrics: &mut SessionMetrics,
        mut operation: F,
    ) -> Result<RetryOutcome<T>, RetryExhausted>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = BrowserResult<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match operation(attempt).await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt + 1,
                    });
                }
                Err(error) => {
                    metrics.record_creation_failure();
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(
                            operation = label,
                            attempts = attempt,
                            error = %error,
                            "giving up after final attempt"
                        );
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: usize,
    pub last_error: super::error::BrowserError,
}
