//! Structured trace events for every outbound call.
//!
//! Events never carry raw payloads: inputs are reduced to a one-way
//! fingerprint and outputs to a byte size. Within one dependency key,
//! events are recorded in real-time order; different keys interleave.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::dependencies::DependencyKey;
use crate::resilience::BreakerStatus;
use crate::run::RunContext;

/// Hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 16;

/// Lifecycle phase of a traced step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Started,
    Succeeded,
    Failed,
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    Timeout,
}

/// What a trace event is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Attempt {
        attempt: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<AttemptOutcome>,
    },
    BreakerTransition {
        from: BreakerStatus,
        to: BreakerStatus,
    },
    BreakerRejected,
    Fallback {
        producer: String,
        index: usize,
    },
}

/// One observability event, keyed by run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub run_id: Uuid,
    pub dependency_key: DependencyKey,
    pub phase: Phase,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
    pub duration_ms: u64,
    pub input_fingerprint: String,
    pub output_size: usize,
}

impl TraceEvent {
    /// The attempt-shaped view of a finished attempt event.
    pub fn attempt_record(&self) -> Option<AttemptRecord> {
        match self.kind {
            EventKind::Attempt {
                attempt,
                outcome: Some(outcome),
            } => Some(AttemptRecord {
                dependency_key: self.dependency_key.clone(),
                attempt_number: attempt,
                started_at: self.at - chrono::Duration::milliseconds(self.duration_ms as i64),
                duration: Duration::from_millis(self.duration_ms),
                outcome,
                input_fingerprint: self.input_fingerprint.clone(),
                output_size: self.output_size,
            }),
            _ => None,
        }
    }
}

/// Immutable record of one attempt against a dependency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub dependency_key: DependencyKey,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: AttemptOutcome,
    pub input_fingerprint: String,
    pub output_size: usize,
}

/// Sink for trace events. Shared across concurrent calls.
pub trait ObservabilityRecorder: Send + Sync {
    fn record(&self, event: TraceEvent);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    pub fn for_run(&self, run_id: Uuid) -> Vec<TraceEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Finished attempts against `key`, in order.
    pub fn attempts(&self, key: &DependencyKey) -> Vec<AttemptRecord> {
        self.events
            .lock()
            .iter()
            .filter(|e| &e.dependency_key == key)
            .filter_map(TraceEvent::attempt_record)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ObservabilityRecorder for MemoryRecorder {
    fn record(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl ObservabilityRecorder for TracingRecorder {
    fn record(&self, event: TraceEvent) {
        match event.phase {
            Phase::Failed => tracing::warn!(
                target: "wayfarer::trace",
                run_id = %event.run_id,
                key = %event.dependency_key,
                kind = ?event.kind,
                duration_ms = event.duration_ms,
                input = %event.input_fingerprint,
                "Dependency step failed"
            ),
            _ => tracing::debug!(
                target: "wayfarer::trace",
                run_id = %event.run_id,
                key = %event.dependency_key,
                phase = ?event.phase,
                kind = ?event.kind,
                duration_ms = event.duration_ms,
                input = %event.input_fingerprint,
                output_size = event.output_size,
                "Dependency step"
            ),
        }
    }
}

/// Sends each event to several recorders.
#[derive(Default, Clone)]
pub struct FanoutRecorder {
    sinks: Vec<Arc<dyn ObservabilityRecorder>>,
}

impl FanoutRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ObservabilityRecorder>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ObservabilityRecorder for FanoutRecorder {
    fn record(&self, event: TraceEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}

/// One-way fingerprint of a call input.
pub fn fingerprint<I: Serialize + ?Sized>(input: &I) -> String {
    let bytes = serde_json::to_vec(input).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Serialized size of a call output, in bytes.
pub fn output_size<T: Serialize + ?Sized>(value: &T) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

/// Per-call view of the run trace.
///
/// Forwards every event to the run's recorder and keeps a copy, so the
/// invoker can hand the call's own trace back to its caller.
pub struct CallTracer<'a> {
    run: &'a RunContext,
    fingerprint: String,
    local: Mutex<Vec<TraceEvent>>,
}

impl<'a> CallTracer<'a> {
    pub fn new(run: &'a RunContext, fingerprint: String) -> Self {
        Self {
            run,
            fingerprint,
            local: Mutex::new(Vec::new()),
        }
    }

    pub fn run(&self) -> &RunContext {
        self.run
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn emit(
        &self,
        key: &DependencyKey,
        phase: Phase,
        kind: EventKind,
        duration: Duration,
        output_size: usize,
    ) {
        let event = TraceEvent {
            run_id: self.run.run_id(),
            dependency_key: key.clone(),
            phase,
            kind,
            at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            input_fingerprint: self.fingerprint.clone(),
            output_size,
        };
        self.local.lock().push(event.clone());
        self.run.recorder().record(event);
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.local.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = fingerprint(&"Dubai hotel prices AED");
        let b = fingerprint(&"Dubai hotel prices AED");
        let c = fingerprint(&"Dubai museum entry fee");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(!a.contains("Dubai"));
    }

    #[test]
    fn test_output_size_counts_json_bytes() {
        assert_eq!(output_size(&"abc"), 5);
        assert_eq!(output_size(&vec![1, 2]), 5);
    }

    #[test]
    fn test_attempt_record_projection() {
        let event = TraceEvent {
            run_id: Uuid::new_v4(),
            dependency_key: DependencyKey::search(),
            phase: Phase::Failed,
            kind: EventKind::Attempt {
                attempt: 2,
                outcome: Some(AttemptOutcome::Timeout),
            },
            at: Utc::now(),
            duration_ms: 5_000,
            input_fingerprint: "abc".into(),
            output_size: 0,
        };

        let record = event.attempt_record().unwrap();
        assert_eq!(record.attempt_number, 2);
        assert_eq!(record.outcome, AttemptOutcome::Timeout);
        assert_eq!(record.duration, Duration::from_secs(5));

        let started = TraceEvent {
            phase: Phase::Started,
            kind: EventKind::Attempt {
                attempt: 1,
                outcome: None,
            },
            ..event
        };
        assert!(started.attempt_record().is_none());
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(MemoryRecorder::new());
        let second = Arc::new(MemoryRecorder::new());
        let fanout = FanoutRecorder::new().with(first.clone()).with(second.clone());

        fanout.record(TraceEvent {
            run_id: Uuid::new_v4(),
            dependency_key: DependencyKey::currency(),
            phase: Phase::Succeeded,
            kind: EventKind::BreakerRejected,
            at: Utc::now(),
            duration_ms: 0,
            input_fingerprint: String::new(),
            output_size: 0,
        });

        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events().len(), 1);
    }
}
