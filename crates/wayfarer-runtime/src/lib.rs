//! # wayfarer-runtime
//!
//! Reliability orchestration for Wayfarer.
//!
//! This crate wraps every call to an unreliable dependency (web search,
//! plan synthesis, currency lookup, cost arithmetic) so that a planning run always ends in
//! a plan, a pending review, or a caller error:
//! - Retry with per-attempt timeouts and bounded, jittered backoff
//! - A circuit breaker per dependency key, shared across runs
//! - Fallback chains: primary, cached last-good result, curated terminal
//! - A structured trace event for every attempt and transition
//!
//! ## Important
//!
//! Validation and review decisions live in `wayfarer-core` and are fully
//! deterministic. This crate only decides *how* a value was obtained; it
//! never changes what a valid plan is.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wayfarer_runtime::{Orchestrator, PlanOutcome};
//! use wayfarer_core::{ReviewDecision, TravelRequest};
//!
//! let orchestrator = Orchestrator::builder().build()?;
//!
//! match orchestrator.plan(TravelRequest::new("Dubai", 3, 50.0, "AED")).await? {
//!     PlanOutcome::Final(plan) => println!("{}", plan.plan.total_cost),
//!     PlanOutcome::ReviewRequired(review) => {
//!         orchestrator
//!             .resolve_review(review.request_id, ReviewDecision::AutoReduce)
//!             .await?;
//!     }
//!     PlanOutcome::ReductionInfeasible { .. } => unreachable!(),
//! }
//! ```

pub mod cache;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod invoker;
pub mod observability;
pub mod orchestrator;
pub mod resilience;
pub mod run;
pub mod store;

// Re-export main types at crate root
pub use cache::ResultCache;
pub use config::{CacheConfig, ConfigError, RuntimeConfig};
pub use dependencies::{
    Calculator, CatalogSearch, CatalogSynthesizer, CostExpression, CurrencyQuery, Dependency,
    DependencyKey, Fault, FaultInjector, FixedRateCurrency, SynthesisInput,
};
pub use error::{FailureKind, ToolError};
pub use invoker::{Invocation, ToolInvoker};
pub use observability::{
    AttemptOutcome, AttemptRecord, EventKind, FanoutRecorder, MemoryRecorder,
    ObservabilityRecorder, Phase, TraceEvent, TracingRecorder,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, PlanError, PlanOutcome};
pub use resilience::{
    BreakerStatus, CircuitBreaker, CircuitBreakerConfig, Clock, FallbackChain, Jitter,
    ManualClock, NoJitter, RandomJitter, RetryExecutor, RetryPolicy, SystemClock, Terminal,
};
pub use run::RunContext;
pub use store::{FileReviewStore, MemoryReviewStore, ReviewStore, StoreError};
