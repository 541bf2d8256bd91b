//! Per-run context shared by every call a planning run makes.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::observability::ObservabilityRecorder;

/// Identity, deadline and trace sink of one planning run.
#[derive(Clone)]
pub struct RunContext {
    run_id: Uuid,
    deadline: Instant,
    recorder: Arc<dyn ObservabilityRecorder>,
}

impl RunContext {
    pub fn new(run_id: Uuid, deadline: Instant, recorder: Arc<dyn ObservabilityRecorder>) -> Self {
        Self {
            run_id,
            deadline,
            recorder,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// When the automated phases of this run must be done.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Budget left at `now`; zero once the deadline has passed.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    pub fn recorder(&self) -> &dyn ObservabilityRecorder {
        self.recorder.as_ref()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
