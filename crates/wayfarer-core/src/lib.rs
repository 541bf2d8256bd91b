//! # wayfarer-core
//!
//! Deterministic itinerary model and review gate for Wayfarer.
//!
//! This crate holds everything about a travel plan that does not depend on
//! an unreliable dependency:
//! - What a plan looks like (`CandidatePlan`, `FinalPlan`)
//! - Whether it is acceptable (`BudgetValidator`)
//! - What happens when it is not (`ReviewGate`, auto-reduction)
//! - What to fall back to when nothing else works (`Catalog`, `FixedRates`)
//! - Which search results are worth keeping (`merge_hits`)
//!
//! ## Key Guarantees
//!
//! 1. **No I/O**: Nothing here calls out to a network service
//! 2. **Pure validation**: Same plan, same verdict
//! 3. **Auditable reviews**: A frozen candidate is never mutated; resolutions
//!    produce new plans
//! 4. **Total fallbacks**: Catalog lookups cannot fail
//!
//! ## Example
//!
//! ```rust,ignore
//! use wayfarer_core::{Catalog, FixedRates, TravelRequest, ValidationPolicy, BudgetValidator};
//!
//! let request = TravelRequest::new("Dubai", 3, 500.0, "AED");
//! let plan = Catalog::dubai().plan_for(&request, &FixedRates::default());
//! let verdict = BudgetValidator::new(ValidationPolicy::default(), 500.0).validate(&plan);
//! assert!(verdict.is_passing());
//! ```

pub mod catalog;
pub mod reduce;
pub mod request;
pub mod review;
pub mod search;
pub mod types;
pub mod validator;

// Re-export main types at crate root
pub use catalog::{minimal_plan, Catalog, CatalogEntry, CatalogError, FixedRates};
pub use reduce::{reduce_to_budget, Reduction};
pub use request::{RequestError, TravelRequest, MAX_DAYS};
pub use review::{
    Draft, GateDecision, Resolution, ReviewDecision, ReviewError, ReviewGate, ReviewRequest,
    ReviewStatus,
};
pub use search::{merge_hits, queries_for, MAX_HITS};
pub use types::{CandidatePlan, ExchangeRate, FinalPlan, ItineraryItem, SearchHit};
pub use validator::{BudgetValidator, ReasonCode, ValidationPolicy, ValidationVerdict};
