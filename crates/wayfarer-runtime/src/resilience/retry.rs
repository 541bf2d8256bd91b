//! Bounded retry with per-attempt timeouts and jittered exponential backoff.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::clock::{Clock, Jitter, RandomJitter, SystemClock};
use crate::config::human_duration;
use crate::dependencies::DependencyKey;
use crate::error::{FailureKind, ToolError};
use crate::observability::{output_size, AttemptOutcome, CallTracer, EventKind, Phase};

/// How often and how patiently to call one dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Upper bound on a single attempt
    #[serde(with = "human_duration")]
    pub per_attempt_timeout: Duration,

    /// Delay ceiling before the first retry; doubles per attempt
    #[serde(with = "human_duration")]
    pub base_backoff: Duration,

    /// Cap on the doubled delay
    #[serde(with = "human_duration")]
    pub max_backoff: Duration,

    /// Widens the delay ceiling by this fraction
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(5),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            jitter_fraction: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction;
        self
    }

    /// The same policy with a single attempt, used for half-open probes.
    pub fn single_attempt(&self) -> Self {
        self.clone().with_max_attempts(1)
    }

    /// Largest delay allowed after failed attempt number `attempt` (1-based).
    ///
    /// The actual sleep is drawn uniformly from `[0, ceiling]`.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
            .mul_f64(1.0 + self.jitter_fraction)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.per_attempt_timeout.is_zero() {
            return Err("per_attempt_timeout must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(format!(
                "jitter_fraction must be within [0, 1], got {}",
                self.jitter_fraction
            ));
        }
        if self.max_backoff < self.base_backoff {
            return Err("max_backoff must not be below base_backoff".to_string());
        }
        Ok(())
    }
}

/// Runs an operation under a `RetryPolicy`.
///
/// Each attempt gets `min(per_attempt_timeout, remaining run budget)` and
/// is dropped when that runs out. Every attempt is traced before the
/// executor returns or sleeps.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn Jitter>,
}

impl RetryExecutor {
    pub fn new(clock: Arc<dyn Clock>, jitter: Arc<dyn Jitter>) -> Self {
        Self { clock, jitter }
    }

    /// Call `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `op` receives the attempt's deadline and must observe it at its own
    /// I/O boundaries; the executor cancels it at that instant regardless.
    /// When the run has no time left for a first attempt, `op` is never
    /// called and the result is `DeadlineSpent`.
    pub async fn execute<T, F, Fut>(
        &self,
        tracer: &CallTracer<'_>,
        key: &DependencyKey,
        policy: &RetryPolicy,
        mut op: F,
    ) -> Result<T, FailureKind>
    where
        T: Serialize,
        F: FnMut(Instant) -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let run = tracer.run();
        let mut attempts = 0;
        let mut last = None;

        for attempt in 1..=policy.max_attempts {
            let started = self.clock.now();
            let remaining = run.remaining(started);
            if remaining.is_zero() {
                tracing::warn!(key = %key, attempt, "Run deadline spent, not attempting");
                break;
            }

            let budget = policy.per_attempt_timeout.min(remaining);
            attempts = attempt;
            tracer.emit(
                key,
                Phase::Started,
                EventKind::Attempt {
                    attempt,
                    outcome: None,
                },
                Duration::ZERO,
                0,
            );

            let result = tokio::time::timeout(budget, op(started + budget)).await;
            let elapsed = self.clock.now().saturating_duration_since(started);

            let failure = match result {
                Ok(Ok(value)) => {
                    tracer.emit(
                        key,
                        Phase::Succeeded,
                        EventKind::Attempt {
                            attempt,
                            outcome: Some(AttemptOutcome::Success),
                        },
                        elapsed,
                        output_size(&value),
                    );
                    return Ok(value);
                }
                Err(_) | Ok(Err(ToolError::DeadlineExceeded)) => {
                    tracer.emit(
                        key,
                        Phase::Failed,
                        EventKind::Attempt {
                            attempt,
                            outcome: Some(AttemptOutcome::Timeout),
                        },
                        elapsed,
                        0,
                    );
                    FailureKind::Timeout {
                        key: key.clone(),
                        elapsed,
                    }
                }
                Ok(Err(err)) => {
                    tracer.emit(
                        key,
                        Phase::Failed,
                        EventKind::Attempt {
                            attempt,
                            outcome: Some(AttemptOutcome::Failure),
                        },
                        elapsed,
                        0,
                    );
                    if !err.is_retryable() {
                        tracing::warn!(key = %key, attempt, error = %err, "Non-retryable failure");
                        return Err(FailureKind::Fatal {
                            key: key.clone(),
                            message: err.to_string(),
                        });
                    }
                    FailureKind::DependencyError {
                        key: key.clone(),
                        message: err.to_string(),
                    }
                }
            };

            last = Some(failure);

            if attempt < policy.max_attempts {
                let delay = self.jitter.sample(policy.backoff_ceiling(attempt));
                if delay >= run.remaining(self.clock.now()) {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Backoff would outlast the run deadline, giving up"
                    );
                    break;
                }

                tracing::warn!(
                    key = %key,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }

        let Some(last) = last else {
            return Err(FailureKind::DeadlineSpent { key: key.clone() });
        };
        tracing::warn!(key = %key, attempts, last = %last, "Retries exhausted");

        Err(FailureKind::Exhausted {
            key: key.clone(),
            attempts,
            last: Box::new(last),
        })
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(RandomJitter))
    }
}
