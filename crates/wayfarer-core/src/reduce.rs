//! Deterministic cost reduction for over-budget plans.
//!
//! Every day keeps at least one activity. Among the remaining paid items,
//! the most expensive one goes first (ties: the later one in plan order),
//! until the plan fits the budget or nothing else can be dropped.

use crate::types::{CandidatePlan, ItineraryItem};
use crate::validator::BudgetValidator;

/// Result of a reduction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    /// The reduced plan (a new plan; the input is never mutated)
    pub plan: CandidatePlan,

    /// Items dropped, in the order they were dropped
    pub removed: Vec<ItineraryItem>,
}

impl Reduction {
    pub fn saved(&self) -> f64 {
        self.removed.iter().map(|item| item.approx_cost).sum()
    }
}

/// Drop optional items until `validator` considers the plan within budget.
pub fn reduce_to_budget(candidate: &CandidatePlan, validator: &BudgetValidator) -> Reduction {
    let mut items = candidate.items.clone();
    let mut removed = Vec::new();

    loop {
        let total: f64 = items.iter().map(|item| item.approx_cost).sum();
        if validator.within_budget(total) {
            break;
        }

        match next_reducible(&items) {
            Some(index) => removed.push(items.remove(index)),
            None => break,
        }
    }

    Reduction {
        plan: candidate.with_items(items),
        removed,
    }
}

fn next_reducible(items: &[ItineraryItem]) -> Option<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.approx_cost > 0.0)
        .filter(|(_, item)| items.iter().filter(|other| other.day == item.day).count() > 1)
        .max_by(|(ia, a), (ib, b)| {
            a.approx_cost
                .total_cmp(&b.approx_cost)
                .then(ia.cmp(ib))
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::validator::ValidationPolicy;
    use proptest::prelude::*;

    fn dubai_plan() -> CandidatePlan {
        let catalog = Catalog::dubai();
        CandidatePlan::new("Dubai", 3, "AED", catalog.items_in(&catalog.currency, 1.0, 3))
    }

    #[test]
    fn test_drops_most_expensive_first() {
        let validator = BudgetValidator::new(ValidationPolicy::default(), 50.0);
        let reduction = reduce_to_budget(&dubai_plan(), &validator);

        let dropped: Vec<f64> = reduction.removed.iter().map(|i| i.approx_cost).collect();
        assert_eq!(dropped, vec![169.0, 100.0]);
        assert_eq!(reduction.plan.total_cost, 52.0);
        assert!(validator.within_budget(reduction.plan.total_cost));
        assert_eq!(reduction.saved(), 269.0);
    }

    #[test]
    fn test_keeps_every_day_covered() {
        let validator = BudgetValidator::new(ValidationPolicy::default(), 1.0);
        let original = dubai_plan();
        let reduction = reduce_to_budget(&original, &validator);

        assert_eq!(reduction.plan.days_covered(), original.days_covered());
        assert_eq!(reduction.plan.total_cost, 2.0);
        assert!(!validator.within_budget(reduction.plan.total_cost));
    }

    #[test]
    fn test_within_budget_plan_is_unchanged() {
        let validator = BudgetValidator::new(ValidationPolicy::default(), 500.0);
        let original = dubai_plan();
        let reduction = reduce_to_budget(&original, &validator);

        assert!(reduction.removed.is_empty());
        assert_eq!(reduction.plan, original);
    }

    #[test]
    fn test_tie_drops_later_item() {
        let plan = CandidatePlan::new(
            "Somewhere",
            1,
            "USD",
            vec![
                ItineraryItem::new(1, "first", 10.0, "USD", None),
                ItineraryItem::new(1, "second", 10.0, "USD", None),
                ItineraryItem::new(1, "free", 0.0, "USD", None),
            ],
        );
        let validator = BudgetValidator::new(ValidationPolicy::default(), 10.0);
        let reduction = reduce_to_budget(&plan, &validator);

        assert_eq!(reduction.removed.len(), 1);
        assert_eq!(reduction.removed[0].activity, "second");
    }

    proptest! {
        #[test]
        fn prop_reduction_never_increases_cost(
            costs in proptest::collection::vec((1u32..4, 0.0f64..500.0), 1..12),
            budget in 1.0f64..1_000.0,
        ) {
            let items = costs
                .into_iter()
                .map(|(day, cost)| ItineraryItem::new(day, "x", cost, "AED", None))
                .collect();
            let plan = CandidatePlan::new("X", 3, "AED", items);
            let validator = BudgetValidator::new(ValidationPolicy::default(), budget);
            let reduction = reduce_to_budget(&plan, &validator);

            prop_assert!(reduction.plan.total_cost <= plan.total_cost + 1e-9);
            prop_assert_eq!(reduction.plan.days_covered(), plan.days_covered());
            prop_assert_eq!(reduction.plan.items.len() + reduction.removed.len(), plan.items.len());
        }
    }
}
