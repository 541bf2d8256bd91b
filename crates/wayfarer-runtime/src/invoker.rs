//! One guarded call: breaker, then retry, then fallback.
//!
//! ```text
//! acquire breaker ── Rejected ──────────────────────┐
//!        │                                          ▼
//!     Allowed/Probe ─> retry executor ─ Exhausted ─> next producer ... terminal
//!        │                  │
//!        │               success ─> refresh caches
//!        └───────────── Fatal ─> caller
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RuntimeConfig;
use crate::dependencies::{Dependency, DependencyKey};
use crate::error::FailureKind;
use crate::observability::{fingerprint, output_size, CallTracer, EventKind, Phase, TraceEvent};
use crate::resilience::{
    Admission, CircuitBreaker, Clock, FallbackChain, Producer, RetryExecutor, RetryPolicy,
    Transition,
};
use crate::run::RunContext;

/// What a guarded call produced.
#[derive(Debug, Clone)]
pub struct Invocation<T> {
    pub value: T,

    /// True iff the primary dependency did not answer
    pub degraded: bool,

    /// Label of the producer that answered
    pub producer: String,

    /// Failures of the producers tried before it
    pub failures: Vec<FailureKind>,

    /// Events this call emitted, in order
    pub trace: Vec<TraceEvent>,
}

/// Runs calls through the shared breaker registry and retry policies.
#[derive(Debug)]
pub struct ToolInvoker {
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    clock: Arc<dyn Clock>,
    default_policy: RetryPolicy,
    overrides: BTreeMap<DependencyKey, RetryPolicy>,
}

impl ToolInvoker {
    pub fn new(
        breaker: Arc<CircuitBreaker>,
        retry: RetryExecutor,
        clock: Arc<dyn Clock>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            breaker,
            retry,
            clock,
            default_policy: config.retry.clone(),
            overrides: config.retry_overrides.clone(),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn policy_for(&self, key: &DependencyKey) -> &RetryPolicy {
        self.overrides.get(key).unwrap_or(&self.default_policy)
    }

    /// Resolve `chain` for `input` within `run`.
    ///
    /// Only a `Fatal` failure comes back as an error; everything else ends
    /// in some producer's value, marked degraded when it was not the
    /// primary's.
    pub async fn call<I, T>(
        &self,
        run: &RunContext,
        input: &I,
        chain: &FallbackChain<I, T>,
    ) -> Result<Invocation<T>, FailureKind>
    where
        I: Serialize + Send + Sync,
        T: Serialize + Clone + Send + Sync + 'static,
    {
        let started = self.clock.now();
        let tracer = CallTracer::new(run, fingerprint(input));
        let key = chain.key();

        let resolved = {
            let tracer = &tracer;
            chain
                .resolve_with(input, move |_, producer| self.run_producer(tracer, input, producer))
                .await?
        };

        if resolved.index == 0 {
            for cache in chain.caches() {
                cache
                    .insert(tracer.fingerprint().to_string(), resolved.value.clone())
                    .await;
            }
        } else {
            tracing::info!(
                run_id = %run.run_id(),
                key = %key,
                producer = %resolved.producer,
                failures = resolved.failures.len(),
                "Call degraded to fallback"
            );
            tracer.emit(
                &key,
                Phase::Succeeded,
                EventKind::Fallback {
                    producer: resolved.producer.clone(),
                    index: resolved.index,
                },
                self.clock.now().saturating_duration_since(started),
                output_size(&resolved.value),
            );
        }

        Ok(Invocation {
            value: resolved.value,
            degraded: resolved.degraded,
            producer: resolved.producer,
            failures: resolved.failures,
            trace: tracer.into_events(),
        })
    }

    async fn run_producer<I, T>(
        &self,
        tracer: &CallTracer<'_>,
        input: &I,
        producer: Producer<I, T>,
    ) -> Result<T, FailureKind>
    where
        I: Serialize + Send + Sync,
        T: Serialize + Clone + Send + Sync + 'static,
    {
        match producer {
            Producer::Dependency(dependency) => self.guarded(tracer, dependency.as_ref(), input).await,
            Producer::Cached(cache) => cache.lookup(tracer.fingerprint()).await,
        }
    }

    /// One dependency behind its breaker and retry policy.
    ///
    /// Whatever happens inside the retry loop counts as a single outcome
    /// for the breaker. Malformed input and a run deadline spent before the
    /// first attempt are not charged to it.
    async fn guarded<I, T>(
        &self,
        tracer: &CallTracer<'_>,
        dependency: &dyn Dependency<I, T>,
        input: &I,
    ) -> Result<T, FailureKind>
    where
        I: Send + Sync,
        T: Serialize + Send,
    {
        let key = dependency.key();
        let (admission, transition) = self.breaker.acquire(&key);
        if let Some(transition) = transition {
            self.trace_transition(tracer, &key, transition);
        }

        let policy = match admission {
            Admission::Rejected => {
                tracing::debug!(key = %key, "Circuit open, skipping dependency");
                tracer.emit(&key, Phase::Failed, EventKind::BreakerRejected, Duration::ZERO, 0);
                return Err(FailureKind::CircuitOpen { key });
            }
            Admission::Probe => self.policy_for(&key).single_attempt(),
            Admission::Allowed => self.policy_for(&key).clone(),
        };

        let result = self
            .retry
            .execute(tracer, &key, &policy, |deadline| dependency.invoke(input, deadline))
            .await;

        let transition = match &result {
            Ok(_) => self.breaker.record_success(&key, admission),
            Err(failure) if failure.counts_against_breaker() => {
                self.breaker.record_failure(&key, admission)
            }
            Err(_) => {
                self.breaker.release(&key, admission);
                None
            }
        };
        if let Some(transition) = transition {
            self.trace_transition(tracer, &key, transition);
        }

        result
    }

    fn trace_transition(&self, tracer: &CallTracer<'_>, key: &DependencyKey, transition: Transition) {
        tracer.emit(
            key,
            Phase::Succeeded,
            EventKind::BreakerTransition {
                from: transition.from,
                to: transition.to,
            },
            Duration::ZERO,
            0,
        );
    }
}
