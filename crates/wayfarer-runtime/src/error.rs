//! Failure taxonomy for outbound dependency calls.
//!
//! - `Timeout` / `DependencyError`: per-attempt, recovered by retry
//! - `CircuitOpen` / `Exhausted` / `Unavailable` / `DeadlineSpent`: recovered by
//!   the fallback chain
//! - `Fatal`: caller misuse, propagates to the orchestrator untouched

use std::time::Duration;
use thiserror::Error;

use crate::dependencies::DependencyKey;

/// Errors a dependency reports from a single invocation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Dependency call failed: {0}")]
    Dependency(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Malformed input. Retrying cannot help.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_))
    }
}

/// Why a guarded call did not produce a value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureKind {
    #[error("{key}: attempt timed out after {elapsed:?}")]
    Timeout { key: DependencyKey, elapsed: Duration },

    #[error("{key}: {message}")]
    DependencyError { key: DependencyKey, message: String },

    #[error("{key}: circuit open")]
    CircuitOpen { key: DependencyKey },

    #[error("{key}: exhausted after {attempts} attempt(s), last: {last}")]
    Exhausted {
        key: DependencyKey,
        attempts: u32,
        last: Box<FailureKind>,
    },

    /// The run deadline ran out before the dependency was called
    #[error("{key}: run deadline spent before any attempt")]
    DeadlineSpent { key: DependencyKey },

    /// A non-dependency producer had nothing to offer (e.g. cache miss)
    #[error("{key}: unavailable: {reason}")]
    Unavailable { key: DependencyKey, reason: String },

    #[error("{key}: non-retryable failure: {message}")]
    Fatal { key: DependencyKey, message: String },
}

impl FailureKind {
    pub fn key(&self) -> &DependencyKey {
        match self {
            Self::Timeout { key, .. }
            | Self::DependencyError { key, .. }
            | Self::CircuitOpen { key }
            | Self::Exhausted { key, .. }
            | Self::DeadlineSpent { key }
            | Self::Unavailable { key, .. }
            | Self::Fatal { key, .. } => key,
        }
    }

    /// Whether the fallback chain may move on to the next producer.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. }
                | Self::Exhausted { .. }
                | Self::DeadlineSpent { .. }
                | Self::Unavailable { .. }
        )
    }

    /// Whether the dependency itself misbehaved.
    ///
    /// Only these outcomes are charged to its circuit breaker.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::DependencyError { .. } | Self::Exhausted { .. }
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}
