use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{ResolveError, Result};

/// Runs calls to remote collaborators with a per-attempt deadline and
/// exponential backoff with jitter between transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    cfg: RetryConfig,
}

impl RetryPolicy {
    pub fn new(cfg: RetryConfig) -> Self {
        Self { cfg }
    }

    /// A policy that tries once with the given deadline.
    pub fn once(timeout: Duration) -> Self {
        Self::new(RetryConfig {
            max_attempts: 1,
            timeout_ms: timeout.as_millis() as u64,
            ..Default::default()
        })
    }

    /// Backoff before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped, then jittered into [delay/2, delay].
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.cfg.base_delay().as_millis() as u64;
        let max = self.cfg.max_delay().as_millis() as u64;
        let exp = base.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(20));
        let delay = exp.min(max);
        if delay == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(delay / 2..=delay);
        Duration::from_millis(jittered)
    }

    /// Run `f` until it succeeds, fails permanently, or attempts run out.
    /// Only transient errors (and deadline overruns) are retried.
    pub async fn run<T, E, F, Fut>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<ResolveError>,
    {
        let attempts = self.cfg.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(self.cfg.timeout(), f()).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) => e.into(),
                Err(_) => ResolveError::Timeout { op: op.to_string() },
            };
            if !err.is_transient() || attempt >= attempts {
                return Err(err);
            }
            let delay = self.backoff(attempt);
            warn!(op, attempt, ?delay, error = %err, "transient failure, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
