//! Human-in-the-loop review gate.
//!
//! A drafted plan either passes validation and is finalized, or is frozen
//! into a `ReviewRequest`. A pending request is a plain serializable value,
//! so the pause survives process restarts; resolving it is a pure function
//! of the stored request and the reviewer's decision.
//!
//! ```text
//! Drafted -> Passing                       (finalize)
//! Drafted -> ReviewRequired (Pending)
//! Pending -> Approved                      (finalize as-is)
//! Pending -> AutoReduced                   (finalize reduced plan)
//! Pending -> Rejected                      (reduction infeasible)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::reduce::reduce_to_budget;
use crate::types::{CandidatePlan, FinalPlan};
use crate::validator::{BudgetValidator, ValidationPolicy, ValidationVerdict};

/// Errors from resolving a review.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReviewError {
    #[error("Review {request_id} already resolved as {status:?}")]
    AlreadyResolved {
        request_id: Uuid,
        status: ReviewStatus,
    },
}

/// Lifecycle of a review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    AutoReduced,
    Rejected,
}

/// What the reviewer chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Use the candidate as-is
    Approve,
    /// Drop optional items until the plan fits the budget
    AutoReduce,
}

/// A plan after the automated phases, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub run_id: Uuid,
    pub candidate: CandidatePlan,
    pub budget_amount: f64,
    pub budget_currency: String,
    pub degraded: bool,
    pub notes: Vec<String>,
}

/// A frozen plan waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub request_id: Uuid,
    pub run_id: Uuid,
    pub candidate: CandidatePlan,
    pub verdict: ValidationVerdict,
    pub budget_amount: f64,
    pub budget_currency: String,
    pub degraded: bool,
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReviewRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::Pending
    }

    /// The same request with a terminal status.
    fn resolved(&self, status: ReviewStatus) -> Self {
        Self {
            status,
            resolved_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}

/// Result of gating a draft.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Passing(FinalPlan),
    ReviewRequired(ReviewRequest),
}

/// Result of resolving a review.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The review produced a final plan
    Finalized {
        plan: FinalPlan,
        request: ReviewRequest,
    },

    /// AutoReduce could not bring the plan within the rules
    Infeasible {
        request: ReviewRequest,
        reduced: CandidatePlan,
        verdict: ValidationVerdict,
    },
}

impl Resolution {
    /// The request with its new status, for persisting.
    pub fn request(&self) -> &ReviewRequest {
        match self {
            Self::Finalized { request, .. } | Self::Infeasible { request, .. } => request,
        }
    }
}

/// The gate itself. Holds only policy; all state lives in drafts and requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewGate {
    policy: ValidationPolicy,
}

impl ReviewGate {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn validator(&self, budget_amount: f64) -> BudgetValidator {
        BudgetValidator::new(self.policy, budget_amount)
    }

    /// Validate a draft: finalize it or freeze it for review.
    pub fn check(&self, draft: Draft) -> GateDecision {
        let verdict = self.validator(draft.budget_amount).validate(&draft.candidate);

        if verdict.is_passing() {
            return GateDecision::Passing(FinalPlan {
                under_budget: verdict.within_budget,
                notes: draft.notes.join(" "),
                degraded: draft.degraded,
                plan: draft.candidate,
            });
        }

        let request = ReviewRequest {
            request_id: Uuid::new_v4(),
            run_id: draft.run_id,
            candidate: draft.candidate,
            verdict,
            budget_amount: draft.budget_amount,
            budget_currency: draft.budget_currency,
            degraded: draft.degraded,
            notes: draft.notes,
            created_at: Utc::now(),
            status: ReviewStatus::Pending,
            resolved_at: None,
        };

        tracing::info!(
            request_id = %request.request_id,
            run_id = %request.run_id,
            reasons = %request.verdict.describe(),
            "Plan requires human review"
        );

        GateDecision::ReviewRequired(request)
    }

    /// Apply a reviewer decision to a pending request.
    ///
    /// The frozen candidate is never modified; a reduced plan is a new value.
    pub fn resolve(
        &self,
        request: &ReviewRequest,
        decision: ReviewDecision,
    ) -> Result<Resolution, ReviewError> {
        if !request.is_pending() {
            return Err(ReviewError::AlreadyResolved {
                request_id: request.request_id,
                status: request.status,
            });
        }

        match decision {
            ReviewDecision::Approve => {
                let mut notes = request.notes.clone();
                notes.push(format!(
                    "[Approved by reviewer despite: {}]",
                    request.verdict.describe()
                ));

                Ok(Resolution::Finalized {
                    plan: FinalPlan {
                        plan: request.candidate.clone(),
                        under_budget: request.verdict.within_budget,
                        notes: notes.join(" "),
                        degraded: request.degraded,
                    },
                    request: request.resolved(ReviewStatus::Approved),
                })
            }
            ReviewDecision::AutoReduce => {
                let validator = self.validator(request.budget_amount);
                let reduction = reduce_to_budget(&request.candidate, &validator);
                let verdict = validator.validate(&reduction.plan);

                if !verdict.is_passing() {
                    tracing::warn!(
                        request_id = %request.request_id,
                        total_cost = reduction.plan.total_cost,
                        budget_limit = validator.budget_limit(),
                        reasons = %verdict.describe(),
                        "Auto-reduction cannot satisfy the budget rules"
                    );
                    return Ok(Resolution::Infeasible {
                        request: request.resolved(ReviewStatus::Rejected),
                        reduced: reduction.plan,
                        verdict,
                    });
                }

                let mut notes = request.notes.clone();
                notes.push(format!(
                    "[Auto-reduced to fit budget: removed {} item(s), saving {:.2} {}]",
                    reduction.removed.len(),
                    reduction.saved(),
                    request.candidate.currency
                ));

                Ok(Resolution::Finalized {
                    plan: FinalPlan {
                        plan: reduction.plan,
                        under_budget: verdict.within_budget,
                        notes: notes.join(" "),
                        degraded: request.degraded,
                    },
                    request: request.resolved(ReviewStatus::AutoReduced),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, FixedRates};
    use crate::request::TravelRequest;
    use crate::validator::ReasonCode;

    fn draft(budget: f64) -> Draft {
        let request = TravelRequest::new("Dubai", 3, budget, "AED");
        Draft {
            run_id: Uuid::new_v4(),
            candidate: Catalog::dubai().plan_for(&request, &FixedRates::default()),
            budget_amount: budget,
            budget_currency: "AED".to_string(),
            degraded: false,
            notes: vec!["Prices are approximate.".to_string()],
        }
    }

    fn pending(budget: f64) -> ReviewRequest {
        match ReviewGate::default().check(draft(budget)) {
            GateDecision::ReviewRequired(request) => request,
            other => panic!("expected review, got {other:?}"),
        }
    }

    #[test]
    fn test_passing_draft_is_finalized() {
        match ReviewGate::default().check(draft(500.0)) {
            GateDecision::Passing(plan) => {
                assert!(plan.under_budget);
                assert!(!plan.degraded);
                assert_eq!(plan.plan.total_cost, 321.0);
                assert_eq!(plan.notes, "Prices are approximate.");
            }
            other => panic!("expected pass, got {other:?}"),
        }
    }

    #[test]
    fn test_over_budget_requires_review() {
        let request = pending(50.0);
        assert!(request.is_pending());
        assert!(request.verdict.reasons.contains(&ReasonCode::OverBudget));
        assert_eq!(request.candidate.total_cost, 321.0);
    }

    #[test]
    fn test_approve_keeps_literal_verdict() {
        let request = pending(50.0);
        let resolution = ReviewGate::default()
            .resolve(&request, ReviewDecision::Approve)
            .unwrap();

        match resolution {
            Resolution::Finalized { plan, request: resolved } => {
                assert!(!plan.under_budget);
                assert_eq!(plan.plan, request.candidate);
                assert!(plan.notes.contains("Approved by reviewer despite: over budget"));
                assert_eq!(resolved.status, ReviewStatus::Approved);
                assert!(resolved.resolved_at.is_some());
            }
            other => panic!("expected finalized, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_reduce_fits_budget() {
        let request = pending(50.0);
        let resolution = ReviewGate::default()
            .resolve(&request, ReviewDecision::AutoReduce)
            .unwrap();

        match resolution {
            Resolution::Finalized { plan, request: resolved } => {
                assert!(plan.under_budget);
                assert!(plan.plan.total_cost <= 52.5);
                assert_eq!(plan.plan.total_cost, 52.0);
                assert!(plan.notes.contains("removed 2 item(s)"));
                assert_eq!(resolved.status, ReviewStatus::AutoReduced);
                // the frozen candidate is untouched
                assert_eq!(resolved.candidate.total_cost, 321.0);
            }
            other => panic!("expected finalized, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_reduce_infeasible() {
        let request = pending(1.0);
        let resolution = ReviewGate::default()
            .resolve(&request, ReviewDecision::AutoReduce)
            .unwrap();

        match resolution {
            Resolution::Infeasible {
                request: resolved,
                reduced,
                verdict,
            } => {
                assert_eq!(resolved.status, ReviewStatus::Rejected);
                assert_eq!(reduced.total_cost, 2.0);
                assert!(verdict.reasons.contains(&ReasonCode::OverBudget));
            }
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn test_resolved_request_cannot_reopen() {
        let gate = ReviewGate::default();
        let request = pending(50.0);
        let resolution = gate.resolve(&request, ReviewDecision::Approve).unwrap();

        let err = gate
            .resolve(resolution.request(), ReviewDecision::AutoReduce)
            .unwrap_err();
        assert!(matches!(
            err,
            ReviewError::AlreadyResolved {
                status: ReviewStatus::Approved,
                ..
            }
        ));
    }

    #[test]
    fn test_request_round_trips_through_json() {
        let request = pending(50.0);
        let json = serde_json::to_string(&request).unwrap();
        let restored: ReviewRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, request);
    }
}
