//! Legacy single-endpoint retry path.
//!
//! Before multi-endpoint failover, every request went to one endpoint and
//! transient failures were retried in place on a fixed back-off schedule with
//! a widening per-attempt timeout. [`RetryingBackend`] keeps that behavior for
//! deployments with a single provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use brickwork_utils::error::LlmError;

use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// Delays between attempts; one attempt more than there are delays
pub const LEGACY_BACKOFF_SCHEDULE: [Duration; 6] = [
    Duration::from_secs(3),
    Duration::from_secs(6),
    Duration::from_secs(12),
    Duration::from_secs(24),
    Duration::from_secs(30),
    Duration::from_secs(30),
];

/// Per-attempt timeout never exceeds this multiple of the base timeout
const MAX_TIMEOUT_MULTIPLIER: u32 = 4;

/// Wraps one transport and retries transient failures on a schedule.
pub struct RetryingBackend {
    inner: Arc<dyn LlmBackend>,
    schedule: Vec<Duration>,
}

impl RetryingBackend {
    #[must_use]
    pub fn new(inner: Arc<dyn LlmBackend>) -> Self {
        Self::with_schedule(inner, LEGACY_BACKOFF_SCHEDULE.to_vec())
    }

    #[must_use]
    pub fn with_schedule(inner: Arc<dyn LlmBackend>, schedule: Vec<Duration>) -> Self {
        Self { inner, schedule }
    }

    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.schedule.len() + 1
    }

    /// Timeout for a 1-based attempt: `base * attempt`, capped at 4x base.
    #[must_use]
    pub fn attempt_timeout(base: Duration, attempt: u32) -> Duration {
        base * attempt.clamp(1, MAX_TIMEOUT_MULTIPLIER)
    }
}

#[async_trait]
impl LlmBackend for RetryingBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let base_timeout = inv.timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let timeout = Self::attempt_timeout(base_timeout, attempt);
            let mut this_attempt = inv.clone();
            this_attempt.timeout = timeout;

            debug!(
                request = %inv.request_label,
                attempt,
                timeout_secs = timeout.as_secs(),
                "Legacy attempt"
            );

            let outcome = match tokio::time::timeout(timeout, self.inner.invoke(this_attempt)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(LlmError::Timeout { duration: timeout }),
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(err) if err.is_transient() => {
                    let Some(delay) = self.schedule.get(attempt as usize - 1).copied() else {
                        warn!(
                            request = %inv.request_label,
                            attempts = attempt,
                            error = %err,
                            "Retry schedule exhausted"
                        );
                        return Err(err);
                    };
                    warn!(
                        request = %inv.request_label,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use tokio::time::Instant;

    fn inv() -> LlmInvocation {
        LlmInvocation::new("legacy", "m", Duration::from_secs(10), vec![])
    }

    #[test]
    fn test_attempt_timeout_widens_and_caps() {
        let base = Duration::from_secs(10);
        assert_eq!(RetryingBackend::attempt_timeout(base, 1), Duration::from_secs(10));
        assert_eq!(RetryingBackend::attempt_timeout(base, 2), Duration::from_secs(20));
        assert_eq!(RetryingBackend::attempt_timeout(base, 4), Duration::from_secs(40));
        assert_eq!(RetryingBackend::attempt_timeout(base, 7), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_on_schedule() {
        let inner = Arc::new(
            ScriptedBackend::new("s")
                .with_error(LlmError::ProviderQuota("429".into()))
                .with_error(LlmError::ProviderOutage("503".into()))
                .with_response("finally"),
        );
        let backend = RetryingBackend::new(inner.clone());

        let started = Instant::now();
        let result = backend.invoke(inv()).await.unwrap();

        assert_eq!(result.raw_response, "finally");
        assert_eq!(inner.calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(9));

        let timeouts: Vec<Duration> = inner.invocations().iter().map(|i| i.timeout).collect();
        assert_eq!(
            timeouts,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_schedule() {
        let inner = Arc::new(
            ScriptedBackend::new("s").with_fallback_error(LlmError::Transport("down".into())),
        );
        let backend = RetryingBackend::new(inner.clone());

        let err = backend.invoke(inv()).await.unwrap_err();

        assert!(matches!(err, LlmError::Transport(_)));
        assert_eq!(inner.calls(), backend.max_attempts());
        assert_eq!(backend.max_attempts(), 7);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let inner = Arc::new(
            ScriptedBackend::new("s")
                .with_error(LlmError::BadRequest("400".into()))
                .with_response("never"),
        );
        let backend = RetryingBackend::with_schedule(inner.clone(), vec![Duration::ZERO]);

        let err = backend.invoke(inv()).await.unwrap_err();
        assert!(matches!(err, LlmError::BadRequest(_)));
        assert_eq!(inner.calls(), 1);
    }
}
