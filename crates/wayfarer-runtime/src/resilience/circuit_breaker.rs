//! Circuit breaker to shield failing dependencies.
//!
//! When a dependency fails repeatedly inside a rolling window, its circuit
//! opens and calls go straight to the fallback chain until a cooldown has
//! passed. Then a single probe call decides whether it closes again.
//!
//! Each dependency key has its own circuit, so one failing service never
//! blocks another. Every state change for a key happens under that key's
//! lock; callers never check and then act on a stale state.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::clock::{Clock, SystemClock};
use crate::config::human_duration;
use crate::dependencies::DependencyKey;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures inside one window before opening the circuit
    pub failure_threshold: u32,

    /// Rolling window, measured from the first counted failure
    #[serde(with = "human_duration")]
    pub window: Duration,

    /// Time the circuit stays open before a probe is allowed
    #[serde(with = "human_duration")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(120),
        }
    }
}

/// Status of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    /// Normal operation
    Closed,

    /// Calls are rejected without reaching the dependency
    Open,

    /// One probe call decides whether to close
    HalfOpen,
}

/// Snapshot of one circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerState {
    pub status: BreakerStatus,
    pub consecutive_failures: u32,
    pub window_start: Option<Instant>,
    pub opened_at: Option<Instant>,
    /// When the current half-open probe was handed out
    pub probe_started: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            status: BreakerStatus::Closed,
            consecutive_failures: 0,
            window_start: None,
            opened_at: None,
            probe_started: None,
        }
    }
}

/// Whether a caller may go ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed, normal call
    Allowed,

    /// The caller holds the single half-open probe slot
    Probe,

    /// Circuit open (or probe in flight), skip the dependency
    Rejected,
}

impl Admission {
    pub fn is_rejected(self) -> bool {
        self == Self::Rejected
    }
}

/// A status change, reported so callers can trace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BreakerStatus,
    pub to: BreakerStatus,
}

/// Registry of circuits, one per dependency key.
pub struct CircuitBreaker {
    states: RwLock<HashMap<DependencyKey, Arc<Mutex<BreakerState>>>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn circuit(&self, key: &DependencyKey) -> Arc<Mutex<BreakerState>> {
        if let Some(circuit) = self.states.read().get(key) {
            return Arc::clone(circuit);
        }
        let mut states = self.states.write();
        Arc::clone(
            states
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(BreakerState::closed()))),
        )
    }

    /// Ask to call the dependency behind `key`.
    ///
    /// The first caller after the cooldown moves the circuit to half-open
    /// and gets the probe; everyone else is rejected until it resolves.
    pub fn acquire(&self, key: &DependencyKey) -> (Admission, Option<Transition>) {
        let circuit = self.circuit(key);
        let mut state = circuit.lock();
        let now = self.clock.now();

        match state.status {
            BreakerStatus::Closed => {
                if self.window_expired(&state, now) {
                    state.consecutive_failures = 0;
                    state.window_start = None;
                }
                (Admission::Allowed, None)
            }
            BreakerStatus::Open => {
                let cooled = state
                    .opened_at
                    .map_or(true, |opened| now.saturating_duration_since(opened) >= self.config.cooldown);
                if !cooled {
                    return (Admission::Rejected, None);
                }

                state.status = BreakerStatus::HalfOpen;
                state.probe_started = Some(now);
                tracing::info!(key = %key, "Circuit half-open, admitting probe");
                (
                    Admission::Probe,
                    Some(Transition {
                        from: BreakerStatus::Open,
                        to: BreakerStatus::HalfOpen,
                    }),
                )
            }
            BreakerStatus::HalfOpen => {
                let in_flight = state.probe_started.is_some_and(|started| {
                    now.saturating_duration_since(started) < self.config.cooldown
                });
                if in_flight {
                    return (Admission::Rejected, None);
                }

                // no probe, or the last one never reported back
                state.probe_started = Some(now);
                (Admission::Probe, None)
            }
        }
    }

    /// Report a successful call made under `admission`.
    pub fn record_success(&self, key: &DependencyKey, admission: Admission) -> Option<Transition> {
        let circuit = self.circuit(key);
        let mut state = circuit.lock();

        match (state.status, admission) {
            (BreakerStatus::HalfOpen, Admission::Probe) => {
                *state = BreakerState::closed();
                tracing::info!(key = %key, "Circuit closed after successful probe");
                Some(Transition {
                    from: BreakerStatus::HalfOpen,
                    to: BreakerStatus::Closed,
                })
            }
            (BreakerStatus::Closed, _) => {
                state.consecutive_failures = 0;
                state.window_start = None;
                None
            }
            // a late result from before the circuit opened
            _ => None,
        }
    }

    /// Report a failed call made under `admission`.
    pub fn record_failure(&self, key: &DependencyKey, admission: Admission) -> Option<Transition> {
        let circuit = self.circuit(key);
        let mut state = circuit.lock();
        let now = self.clock.now();

        match (state.status, admission) {
            (BreakerStatus::HalfOpen, Admission::Probe) => {
                state.status = BreakerStatus::Open;
                state.opened_at = Some(now);
                state.probe_started = None;
                tracing::warn!(key = %key, "Circuit reopened after failed probe");
                Some(Transition {
                    from: BreakerStatus::HalfOpen,
                    to: BreakerStatus::Open,
                })
            }
            (BreakerStatus::Closed, Admission::Allowed) => {
                if state.window_start.is_none() || self.window_expired(&state, now) {
                    state.window_start = Some(now);
                    state.consecutive_failures = 1;
                } else {
                    state.consecutive_failures += 1;
                }

                if state.consecutive_failures < self.config.failure_threshold {
                    return None;
                }

                state.status = BreakerStatus::Open;
                state.opened_at = Some(now);
                tracing::warn!(
                    key = %key,
                    failures = state.consecutive_failures,
                    "Circuit opened after repeated failures"
                );
                Some(Transition {
                    from: BreakerStatus::Closed,
                    to: BreakerStatus::Open,
                })
            }
            _ => None,
        }
    }

    /// Give back a probe slot without a verdict.
    ///
    /// Used when the call ended in a way that says nothing about the
    /// dependency's health: malformed input, or a run with no time left to
    /// make the call at all.
    pub fn release(&self, key: &DependencyKey, admission: Admission) {
        if admission != Admission::Probe {
            return;
        }
        let circuit = self.circuit(key);
        let mut state = circuit.lock();
        if state.status == BreakerStatus::HalfOpen {
            state.probe_started = None;
        }
    }

    /// Current state of a circuit.
    pub fn state(&self, key: &DependencyKey) -> BreakerState {
        self.states
            .read()
            .get(key)
            .map(|circuit| circuit.lock().clone())
            .unwrap_or_else(BreakerState::closed)
    }

    pub fn status(&self, key: &DependencyKey) -> BreakerStatus {
        self.state(key).status
    }

    fn window_expired(&self, state: &BreakerState, now: Instant) -> bool {
        state
            .window_start
            .is_some_and(|start| now.saturating_duration_since(start) >= self.config.window)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("circuits", &self.states.read().len())
            .finish()
    }
}
