//! Time and randomness sources.
//!
//! Everything time-dependent in the resilience layer reads the clock through
//! `Clock`, and every backoff delay is drawn through `Jitter`, so tests can
//! drive both deterministically.

use parking_lot::Mutex;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Monotonic time source.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Tokio's clock, so paused-time tests see virtual time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Draws an actual delay from a computed ceiling.
pub trait Jitter: Send + Sync + fmt::Debug {
    /// A delay in `[0, ceiling]`.
    fn sample(&self, ceiling: Duration) -> Duration;
}

/// Full jitter: uniform over `[0, ceiling]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&self, ceiling: Duration) -> Duration {
        let max = ceiling.as_nanos().min(u64::MAX as u128) as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..=max))
    }
}

/// Always the ceiling. Deterministic delays for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn sample(&self, ceiling: Duration) -> Duration {
        ceiling
    }
}
