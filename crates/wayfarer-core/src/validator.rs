//! Budget validator: scores a candidate plan against cost and
//! source-confidence thresholds.
//!
//! Both rules are always evaluated so a verdict can carry both reasons.
//! The validator is pure: the same plan always yields the same verdict.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::CandidatePlan;

/// Thresholds applied by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Multiplier on the budget that still counts as within budget
    pub budget_headroom: f64,

    /// Distinct source URLs needed for a confident plan
    pub min_sources: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            budget_headroom: 1.05,
            min_sources: 2,
        }
    }
}

/// Why a verdict failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    OverBudget,
    LowConfidenceSources,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OverBudget => write!(f, "over budget"),
            Self::LowConfidenceSources => write!(f, "low source confidence"),
        }
    }
}

/// Outcome of validating a candidate plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub within_budget: bool,
    pub confident_sources: bool,
    pub reasons: BTreeSet<ReasonCode>,
}

impl ValidationVerdict {
    pub fn is_passing(&self) -> bool {
        self.within_budget && self.confident_sources
    }

    /// Human-readable reasons, joined.
    pub fn describe(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validator bound to one run's budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetValidator {
    policy: ValidationPolicy,
    budget_amount: f64,
}

impl BudgetValidator {
    pub fn new(policy: ValidationPolicy, budget_amount: f64) -> Self {
        Self {
            policy,
            budget_amount,
        }
    }

    pub fn budget_amount(&self) -> f64 {
        self.budget_amount
    }

    /// Highest total cost that still passes.
    pub fn budget_limit(&self) -> f64 {
        self.budget_amount * self.policy.budget_headroom
    }

    pub fn within_budget(&self, total_cost: f64) -> bool {
        total_cost <= self.budget_limit()
    }

    /// Score a plan.
    pub fn validate(&self, candidate: &CandidatePlan) -> ValidationVerdict {
        let within_budget = self.within_budget(candidate.total_cost);
        let confident_sources = candidate.unique_source_count >= self.policy.min_sources;

        let mut reasons = BTreeSet::new();
        if !within_budget {
            reasons.insert(ReasonCode::OverBudget);
        }
        if !confident_sources {
            reasons.insert(ReasonCode::LowConfidenceSources);
        }

        tracing::debug!(
            total_cost = candidate.total_cost,
            budget_limit = self.budget_limit(),
            unique_sources = candidate.unique_source_count,
            within_budget,
            confident_sources,
            "Validated candidate plan"
        );

        ValidationVerdict {
            within_budget,
            confident_sources,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItineraryItem;
    use proptest::prelude::*;

    fn plan_with(total: f64, sources: usize) -> CandidatePlan {
        let mut items: Vec<ItineraryItem> = (0..sources)
            .map(|i| {
                ItineraryItem::new(1, "free", 0.0, "AED", Some(format!("https://s{i}.example")))
            })
            .collect();
        items.push(ItineraryItem::new(1, "paid", total, "AED", None));
        CandidatePlan::new("Dubai", 1, "AED", items)
    }

    #[test]
    fn test_passing_plan() {
        let validator = BudgetValidator::new(ValidationPolicy::default(), 500.0);
        let verdict = validator.validate(&plan_with(321.0, 5));

        assert!(verdict.is_passing());
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let validator = BudgetValidator::new(ValidationPolicy::default(), 500.0);
        let at_limit = plan_with(500.0 * 1.05, 2);

        assert!(validator.validate(&at_limit).within_budget);

        let over = plan_with(526.0, 2);
        assert!(!validator.validate(&over).within_budget);
    }

    #[test]
    fn test_both_reasons_reported() {
        let validator = BudgetValidator::new(ValidationPolicy::default(), 50.0);
        let verdict = validator.validate(&plan_with(321.0, 1));

        assert!(!verdict.is_passing());
        assert!(verdict.reasons.contains(&ReasonCode::OverBudget));
        assert!(verdict.reasons.contains(&ReasonCode::LowConfidenceSources));
        assert_eq!(verdict.describe(), "over budget; low source confidence");
    }

    #[test]
    fn test_policy_overrides() {
        let policy = ValidationPolicy {
            budget_headroom: 1.0,
            min_sources: 0,
        };
        let validator = BudgetValidator::new(policy, 100.0);

        assert!(validator.validate(&plan_with(100.0, 0)).is_passing());
        assert!(!validator.validate(&plan_with(100.5, 0)).is_passing());
    }

    proptest! {
        #[test]
        fn prop_validation_is_idempotent(total in 0.0f64..10_000.0, sources in 0usize..6, budget in 1.0f64..5_000.0) {
            let validator = BudgetValidator::new(ValidationPolicy::default(), budget);
            let plan = plan_with(total, sources);
            prop_assert_eq!(validator.validate(&plan), validator.validate(&plan));
        }

        #[test]
        fn prop_within_budget_matches_limit(total in 0.0f64..10_000.0, budget in 1.0f64..5_000.0) {
            let validator = BudgetValidator::new(ValidationPolicy::default(), budget);
            let verdict = validator.validate(&plan_with(total, 2));
            prop_assert_eq!(verdict.within_budget, total <= budget * 1.05);
        }
    }
}
