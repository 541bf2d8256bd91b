//! Unreliable outbound dependencies.
//!
//! Every service the planner talks to (web search, itinerary synthesis,
//! exchange rates, the cost calculator) sits behind the `Dependency` trait and is addressed by a
//! `DependencyKey`. Breaker state, retry overrides and trace events are all
//! keyed by it.

mod calculator;
mod fault;
mod offline;

pub use calculator::{Calculator, CostExpression};
pub use fault::{Fault, FaultInjector};
pub use offline::{CatalogSearch, CatalogSynthesizer, FixedRateCurrency};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use wayfarer_core::{SearchHit, TravelRequest};

use crate::error::ToolError;

/// Identifies one external service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyKey(String);

impl DependencyKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn search() -> Self {
        Self::new("search")
    }

    pub fn synthesis() -> Self {
        Self::new("synthesis")
    }

    pub fn currency() -> Self {
        Self::new("currency")
    }

    pub fn calculator() -> Self {
        Self::new("calculator")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An external service producing `T` from `I`.
///
/// `deadline` is the latest instant the caller will wait. Implementations
/// may use it to bound their own work; the invoker enforces it regardless.
#[async_trait]
pub trait Dependency<I, T>: Send + Sync
where
    I: Send + Sync,
    T: Send,
{
    fn key(&self) -> DependencyKey;

    async fn invoke(&self, input: &I, deadline: Instant) -> Result<T, ToolError>;
}

#[async_trait]
impl<I, T, D> Dependency<I, T> for Arc<D>
where
    I: Send + Sync,
    T: Send,
    D: Dependency<I, T> + ?Sized,
{
    fn key(&self) -> DependencyKey {
        (**self).key()
    }

    async fn invoke(&self, input: &I, deadline: Instant) -> Result<T, ToolError> {
        (**self).invoke(input, deadline).await
    }
}

/// Input to the itinerary synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisInput {
    pub request: TravelRequest,
    pub hits: Vec<SearchHit>,
}

/// A request for the rate converting `from` into `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyQuery {
    pub from: String,
    pub to: String,
}

impl CurrencyQuery {
    pub fn new(from: impl AsRef<str>, to: impl AsRef<str>) -> Self {
        Self {
            from: from.as_ref().to_uppercase(),
            to: to.as_ref().to_uppercase(),
        }
    }
}
