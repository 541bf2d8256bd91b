//! Resilience patterns for wayfarer-runtime.
//!
//! This module provides:
//! - Injectable clock and jitter, so time-based behavior is testable
//! - Retry with bounded, jittered exponential backoff
//! - A circuit breaker registry keyed by dependency
//! - Ordered fallback chains ending in a producer that cannot fail

mod circuit_breaker;
mod clock;
mod fallback;
mod retry;

pub use circuit_breaker::{
    Admission, BreakerState, BreakerStatus, CircuitBreaker, CircuitBreakerConfig, Transition,
};
pub use clock::{Clock, Jitter, ManualClock, NoJitter, RandomJitter, SystemClock};
pub use fallback::{FallbackChain, Producer, Resolved, Terminal};
pub use retry::{RetryExecutor, RetryPolicy};
