//! Planning orchestrator.
//!
//! One linear pipeline with one optional pause point:
//! - Fan-out: price-focused search queries, bounded by `max_concurrency`
//! - Synthesis of an itinerary from the merged hits
//! - Currency normalization into the budget currency
//! - Re-totalling the costs through the calculator
//! - Review gate: finalize, or persist a `ReviewRequest` and stop
//!
//! Every outbound call goes through the `ToolInvoker`, so each phase either
//! gets a live answer or a degraded one; only caller misuse aborts a run.
//! The run deadline bounds the automated phases only. A pending review has
//! no deadline.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use wayfarer_core::{
    catalog::round_cents, merge_hits, minimal_plan, queries_for, CandidatePlan, Catalog, Draft,
    ExchangeRate, FinalPlan, FixedRates, GateDecision, ItineraryItem, RequestError, Resolution,
    ReviewDecision, ReviewError, ReviewGate, ReviewRequest, SearchHit, TravelRequest,
    ValidationVerdict,
};

use crate::cache::ResultCache;
use crate::config::{ConfigError, RuntimeConfig};
use crate::dependencies::{
    Calculator, CatalogSearch, CatalogSynthesizer, CostExpression, CurrencyQuery, Dependency,
    DependencyKey, FixedRateCurrency, SynthesisInput,
};
use crate::error::FailureKind;
use crate::invoker::ToolInvoker;
use crate::observability::{ObservabilityRecorder, TracingRecorder};
use crate::resilience::{
    CircuitBreaker, Clock, FallbackChain, Jitter, RandomJitter, RetryExecutor, SystemClock,
    Terminal,
};
use crate::run::RunContext;
use crate::store::{MemoryReviewStore, ReviewStore, StoreError};

/// Note attached to every plan.
const PRICE_NOTE: &str = "Prices are approximate and may have changed.";

/// Errors that abort a planning run or a review resolution.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("Non-recoverable dependency failure: {0}")]
    Fatal(#[from] FailureKind),

    #[error("Review {0} not found")]
    ReviewNotFound(Uuid),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a run or a review resolution ended in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PlanOutcome {
    /// A finished plan
    Final(FinalPlan),

    /// The plan failed validation and waits for a reviewer
    ReviewRequired(ReviewRequest),

    /// Auto-reduction could not bring the plan within the rules
    ReductionInfeasible {
        request: ReviewRequest,
        reduced: CandidatePlan,
        verdict: ValidationVerdict,
    },
}

/// Plans itineraries against unreliable dependencies.
pub struct Orchestrator {
    config: RuntimeConfig,
    invoker: ToolInvoker,
    gate: ReviewGate,
    store: Arc<dyn ReviewStore>,
    recorder: Arc<dyn ObservabilityRecorder>,
    clock: Arc<dyn Clock>,
    search: FallbackChain<String, Vec<SearchHit>>,
    synthesis: FallbackChain<SynthesisInput, CandidatePlan>,
    currency: FallbackChain<CurrencyQuery, ExchangeRate>,
    calculator: FallbackChain<CostExpression, f64>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Breaker registry shared by every run of this orchestrator.
    pub fn breaker(&self) -> &CircuitBreaker {
        self.invoker.breaker()
    }

    /// Plan an itinerary.
    ///
    /// # Execution Flow
    /// 1. Validate the request (no dependency is called for a bad one)
    /// 2. Search, all queries concurrently through the invoker
    /// 3. Synthesize a candidate plan from the merged hits
    /// 4. Convert foreign-currency items into the budget currency
    /// 5. Re-total the costs with the calculator
    /// 6. Gate: finalize, or persist a review request
    pub async fn plan(&self, request: TravelRequest) -> Result<PlanOutcome, PlanError> {
        request.validate()?;

        let run = RunContext::new(
            Uuid::new_v4(),
            self.clock.now() + self.config.run_deadline,
            Arc::clone(&self.recorder),
        );
        tracing::info!(
            run_id = %run.run_id(),
            destination = %request.destination,
            days = request.days,
            budget = request.budget_amount,
            currency = %request.budget_currency,
            "Planning run started"
        );

        let mut notes = vec![PRICE_NOTE.to_string()];

        let (hits, search_degraded) = self.search_phase(&run, &request, &mut notes).await?;

        let input = SynthesisInput {
            request: request.clone(),
            hits,
        };
        let synthesis = self.invoker.call(&run, &input, &self.synthesis).await?;
        if synthesis.degraded {
            notes.push(format!("[synthesis fell back to {}]", synthesis.producer));
        }

        let (candidate, currency_degraded) =
            self.normalize_currency(&run, synthesis.value, &mut notes).await?;

        let (candidate, total_degraded) = self.retotal(&run, candidate, &mut notes).await?;

        let degraded =
            search_degraded || synthesis.degraded || currency_degraded || total_degraded;
        let draft = Draft {
            run_id: run.run_id(),
            candidate,
            budget_amount: request.budget_amount,
            budget_currency: request.budget_currency.clone(),
            degraded,
            notes,
        };

        match self.gate.check(draft) {
            GateDecision::Passing(plan) => {
                tracing::info!(
                    run_id = %run.run_id(),
                    total_cost = plan.plan.total_cost,
                    degraded = plan.degraded,
                    "Plan finalized"
                );
                Ok(PlanOutcome::Final(plan))
            }
            GateDecision::ReviewRequired(review) => {
                self.store.save(&review).await?;
                Ok(PlanOutcome::ReviewRequired(review))
            }
        }
    }

    /// Resolve a pending review with the reviewer's decision.
    ///
    /// The new status is committed to the store before returning. The
    /// store only accepts it while its copy is still pending, so a request
    /// is resolved once even when several processes share the store.
    pub async fn resolve_review(
        &self,
        request_id: Uuid,
        decision: ReviewDecision,
    ) -> Result<PlanOutcome, PlanError> {
        let request = self
            .store
            .load(request_id)
            .await?
            .ok_or(PlanError::ReviewNotFound(request_id))?;

        let resolution = self.gate.resolve(&request, decision)?;
        self.store
            .commit_resolution(resolution.request())
            .await
            .map_err(|err| match err {
                StoreError::Missing(id) => PlanError::ReviewNotFound(id),
                StoreError::AlreadyResolved { request_id, status } => {
                    PlanError::Review(ReviewError::AlreadyResolved { request_id, status })
                }
                other => PlanError::Store(other),
            })?;

        tracing::info!(
            request_id = %request_id,
            decision = ?decision,
            status = ?resolution.request().status,
            "Review resolved"
        );

        Ok(match resolution {
            Resolution::Finalized { plan, .. } => PlanOutcome::Final(plan),
            Resolution::Infeasible {
                request,
                reduced,
                verdict,
            } => PlanOutcome::ReductionInfeasible {
                request,
                reduced,
                verdict,
            },
        })
    }

    /// Reviews still waiting for a decision.
    pub async fn pending_reviews(&self) -> Result<Vec<ReviewRequest>, PlanError> {
        Ok(self.store.list_pending().await?)
    }

    async fn search_phase(
        &self,
        run: &RunContext,
        request: &TravelRequest,
        notes: &mut Vec<String>,
    ) -> Result<(Vec<SearchHit>, bool), PlanError> {
        let queries = queries_for(request);
        let results: Vec<_> = stream::iter(queries.iter())
            .map(|query| self.invoker.call(run, query, &self.search))
            .buffered(self.config.max_concurrency)
            .collect()
            .await;

        let mut batches = Vec::with_capacity(results.len());
        let mut fell_back_to = BTreeSet::new();
        for result in results {
            let invocation = result?;
            if invocation.degraded {
                fell_back_to.insert(invocation.producer);
            }
            batches.push(invocation.value);
        }

        let hits = merge_hits(batches);
        tracing::info!(
            run_id = %run.run_id(),
            queries = queries.len(),
            hits = hits.len(),
            "Search phase completed"
        );

        let degraded = !fell_back_to.is_empty();
        if degraded {
            let producers: Vec<_> = fell_back_to.into_iter().collect();
            notes.push(format!("[search fell back to {}]", producers.join(", ")));
        }
        Ok((hits, degraded))
    }

    async fn normalize_currency(
        &self,
        run: &RunContext,
        plan: CandidatePlan,
        notes: &mut Vec<String>,
    ) -> Result<(CandidatePlan, bool), PlanError> {
        let foreign = plan.foreign_currencies();
        if foreign.is_empty() {
            return Ok((plan, false));
        }

        let mut rates = HashMap::new();
        let mut degraded = false;
        for from in foreign {
            let query = CurrencyQuery::new(&from, &plan.currency);
            let invocation = self.invoker.call(run, &query, &self.currency).await?;
            if invocation.degraded {
                degraded = true;
                let rate = &invocation.value;
                notes.push(format!(
                    "exchange rate fallback: 1 {} = {} {}",
                    rate.from,
                    display_rate(rate.rate),
                    rate.to
                ));
            }
            rates.insert(from, invocation.value);
        }

        let items = plan
            .items
            .iter()
            .map(|item| match rates.get(&item.currency.to_ascii_uppercase()) {
                Some(rate) => ItineraryItem {
                    approx_cost: round_cents(rate.convert(item.approx_cost)),
                    currency: plan.currency.clone(),
                    ..item.clone()
                },
                None => item.clone(),
            })
            .collect();

        Ok((plan.with_items(items), degraded))
    }

    async fn retotal(
        &self,
        run: &RunContext,
        mut plan: CandidatePlan,
        notes: &mut Vec<String>,
    ) -> Result<(CandidatePlan, bool), PlanError> {
        let expression = CostExpression::total_of(&plan);
        let invocation = self.invoker.call(run, &expression, &self.calculator).await?;
        if invocation.degraded {
            notes.push(format!("[calculator fell back to {}]", invocation.producer));
        }

        let total = round_cents(invocation.value);
        if (total - plan.total_cost).abs() > 0.005 {
            tracing::warn!(
                run_id = %run.run_id(),
                calculated = total,
                summed = plan.total_cost,
                "Calculated total differs from item sum"
            );
        }
        plan.total_cost = total;
        Ok((plan, invocation.degraded))
    }
}

fn display_rate(rate: f64) -> f64 {
    (rate * 10_000.0).round() / 10_000.0
}

/// Builder for Orchestrator.
pub struct OrchestratorBuilder {
    config: RuntimeConfig,
    catalogs: Vec<Catalog>,
    search: Option<Arc<dyn Dependency<String, Vec<SearchHit>>>>,
    synthesis: Option<Arc<dyn Dependency<SynthesisInput, CandidatePlan>>>,
    currency: Option<Arc<dyn Dependency<CurrencyQuery, ExchangeRate>>>,
    calculator: Option<Arc<dyn Dependency<CostExpression, f64>>>,
    store: Option<Arc<dyn ReviewStore>>,
    recorder: Option<Arc<dyn ObservabilityRecorder>>,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn Jitter>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            catalogs: vec![Catalog::dubai()],
            search: None,
            synthesis: None,
            currency: None,
            calculator: None,
            store: None,
            recorder: None,
            clock: Arc::new(SystemClock),
            jitter: Arc::new(RandomJitter),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a curated catalog for fallbacks and offline dependencies.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalogs.push(catalog);
        self
    }

    pub fn search(mut self, dependency: Arc<dyn Dependency<String, Vec<SearchHit>>>) -> Self {
        self.search = Some(dependency);
        self
    }

    pub fn synthesis(
        mut self,
        dependency: Arc<dyn Dependency<SynthesisInput, CandidatePlan>>,
    ) -> Self {
        self.synthesis = Some(dependency);
        self
    }

    pub fn currency(mut self, dependency: Arc<dyn Dependency<CurrencyQuery, ExchangeRate>>) -> Self {
        self.currency = Some(dependency);
        self
    }

    pub fn calculator(mut self, dependency: Arc<dyn Dependency<CostExpression, f64>>) -> Self {
        self.calculator = Some(dependency);
        self
    }

    pub fn store(mut self, store: Arc<dyn ReviewStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn ObservabilityRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the orchestrator.
    ///
    /// Dependencies left unset are answered from the catalogs.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        self.config.validate()?;

        let catalogs = Arc::new(self.catalogs);
        let cache = &self.config.cache;

        let search_catalogs = Arc::clone(&catalogs);
        let search = FallbackChain::new(
            self.search
                .unwrap_or_else(|| Arc::new(CatalogSearch::new(Arc::clone(&catalogs)))),
            Terminal::computed("catalog search", move |query: &String| {
                CatalogSearch::hits_for(&search_catalogs, query)
            }),
        )
        .then_cached(Arc::new(ResultCache::from_config(DependencyKey::search(), cache)));

        let synthesis_catalogs = Arc::clone(&catalogs);
        let rates = FixedRates::default();
        let synthesis = FallbackChain::new(
            self.synthesis
                .unwrap_or_else(|| Arc::new(CatalogSynthesizer::new(Arc::clone(&catalogs)))),
            Terminal::computed("catalog plan", move |input: &SynthesisInput| {
                synthesis_catalogs
                    .iter()
                    .find(|catalog| catalog.covers(&input.request.destination))
                    .map(|catalog| catalog.plan_for(&input.request, &rates))
                    .unwrap_or_else(|| minimal_plan(&input.request))
            }),
        )
        .then_cached(Arc::new(ResultCache::from_config(DependencyKey::synthesis(), cache)));

        let fixed = FixedRates::default();
        let currency = FallbackChain::new(
            self.currency
                .unwrap_or_else(|| Arc::new(FixedRateCurrency::default())),
            Terminal::computed("fixed rates", move |query: &CurrencyQuery| {
                fixed.rate(&query.from, &query.to)
            }),
        )
        .then_cached(Arc::new(ResultCache::from_config(DependencyKey::currency(), cache)));

        let calculator = FallbackChain::new(
            self.calculator.unwrap_or_else(|| Arc::new(Calculator)),
            Terminal::computed("item sum", CostExpression::sum_of_terms),
        );

        let breaker = Arc::new(CircuitBreaker::with_clock(
            self.config.breaker.clone(),
            Arc::clone(&self.clock),
        ));
        let invoker = ToolInvoker::new(
            breaker,
            RetryExecutor::new(Arc::clone(&self.clock), self.jitter),
            Arc::clone(&self.clock),
            &self.config,
        );

        Ok(Orchestrator {
            gate: ReviewGate::new(self.config.validation),
            invoker,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryReviewStore::new())),
            recorder: self.recorder.unwrap_or_else(|| Arc::new(TracingRecorder)),
            clock: self.clock,
            search,
            synthesis,
            currency,
            calculator,
            config: self.config,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::{Fault, FaultInjector};
    use crate::observability::MemoryRecorder;
    use crate::resilience::NoJitter;
    use wayfarer_core::{ReasonCode, ReviewStatus};

    fn orchestrator() -> Orchestrator {
        Orchestrator::builder()
            .jitter(Arc::new(NoJitter))
            .recorder(Arc::new(MemoryRecorder::new()))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_calls_nothing() {
        let search = Arc::new(FaultInjector::new(CatalogSearch::new(Arc::new(vec![
            Catalog::dubai(),
        ]))));
        let orchestrator = Orchestrator::builder()
            .search(search.clone())
            .build()
            .unwrap();

        let err = orchestrator
            .plan(TravelRequest::new("Dubai", 9, 500.0, "AED"))
            .await
            .unwrap_err();

        assert!(matches!(err, PlanError::InvalidRequest(RequestError::DaysOutOfRange(9))));
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passing_plan_is_final() {
        let outcome = orchestrator()
            .plan(TravelRequest::new("Dubai", 3, 500.0, "AED"))
            .await
            .unwrap();

        match outcome {
            PlanOutcome::Final(plan) => {
                assert!(plan.under_budget);
                assert!(!plan.degraded);
                assert_eq!(plan.plan.total_cost, 321.0);
                assert_eq!(plan.plan.unique_source_count, 5);
            }
            other => panic!("expected final plan, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_items_are_converted() {
        let outcome = orchestrator()
            .plan(TravelRequest::new("Dubai", 3, 500.0, "USD"))
            .await
            .unwrap();

        match outcome {
            PlanOutcome::Final(plan) => {
                assert!(plan.plan.items.iter().all(|item| item.currency == "USD"));
                assert!(plan.plan.total_cost < 100.0);
                assert!(!plan.degraded);
            }
            other => panic!("expected final plan, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_round_trip() {
        let orchestrator = orchestrator();
        let outcome = orchestrator
            .plan(TravelRequest::new("Dubai", 3, 50.0, "AED"))
            .await
            .unwrap();

        let review = match outcome {
            PlanOutcome::ReviewRequired(review) => review,
            other => panic!("expected review, got {other:?}"),
        };
        assert!(review.verdict.reasons.contains(&ReasonCode::OverBudget));
        assert_eq!(orchestrator.pending_reviews().await.unwrap().len(), 1);

        let resolved = orchestrator
            .resolve_review(review.request_id, ReviewDecision::Approve)
            .await
            .unwrap();
        assert!(matches!(resolved, PlanOutcome::Final(ref plan) if !plan.under_budget));
        assert!(orchestrator.pending_reviews().await.unwrap().is_empty());

        let again = orchestrator
            .resolve_review(review.request_id, ReviewDecision::AutoReduce)
            .await
            .unwrap_err();
        assert!(matches!(
            again,
            PlanError::Review(ReviewError::AlreadyResolved {
                status: ReviewStatus::Approved,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_review() {
        let err = orchestrator()
            .resolve_review(Uuid::new_v4(), ReviewDecision::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::ReviewNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_destination_gets_minimal_plan() {
        let outcome = orchestrator()
            .plan(TravelRequest::new("Reykjavik", 2, 100.0, "EUR"))
            .await
            .unwrap();

        // exploration slots carry no sources
        match outcome {
            PlanOutcome::ReviewRequired(review) => {
                assert_eq!(review.candidate.items.len(), 2);
                assert!(review
                    .verdict
                    .reasons
                    .contains(&ReasonCode::LowConfidenceSources));
                assert!(review.verdict.within_budget);
            }
            other => panic!("expected review, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_synthesis_aborts_run() {
        let synthesis = Arc::new(FaultInjector::always(
            CatalogSynthesizer::new(Arc::new(vec![Catalog::dubai()])),
            Fault::InvalidInput,
        ));
        let orchestrator = Orchestrator::builder()
            .jitter(Arc::new(NoJitter))
            .synthesis(synthesis)
            .build()
            .unwrap();

        let err = orchestrator
            .plan(TravelRequest::new("Dubai", 3, 500.0, "AED"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::Fatal(FailureKind::Fatal { .. })));
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let plan = FinalPlan {
            plan: minimal_plan(&TravelRequest::new("Dubai", 1, 10.0, "AED")),
            under_budget: true,
            notes: String::new(),
            degraded: false,
        };
        let json = serde_json::to_value(PlanOutcome::Final(plan)).unwrap();
        assert_eq!(json["outcome"], "final");
        assert_eq!(json["detail"]["destination"], "Dubai");
    }
}
