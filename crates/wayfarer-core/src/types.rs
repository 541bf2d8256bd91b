//! Itinerary data model.
//!
//! A `CandidatePlan` always derives `total_cost` and `unique_source_count`
//! from its items, so a plan can never disagree with itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One activity on one day of the trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItineraryItem {
    /// Day number, starting at 1
    pub day: u32,

    /// What the traveller does
    pub activity: String,

    /// Approximate cost in `currency`
    pub approx_cost: f64,

    /// ISO 4217 currency code
    pub currency: String,

    /// URL the price was taken from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ItineraryItem {
    pub fn new(
        day: u32,
        activity: impl Into<String>,
        approx_cost: f64,
        currency: impl Into<String>,
        source: Option<String>,
    ) -> Self {
        Self {
            day,
            activity: activity.into(),
            approx_cost,
            currency: currency.into(),
            source,
        }
    }
}

/// A synthesized itinerary awaiting validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidatePlan {
    pub destination: String,
    pub days: u32,
    pub items: Vec<ItineraryItem>,
    pub total_cost: f64,
    pub currency: String,
    pub unique_source_count: usize,
}

impl CandidatePlan {
    /// Build a plan, deriving the totals from `items`.
    pub fn new(
        destination: impl Into<String>,
        days: u32,
        currency: impl Into<String>,
        items: Vec<ItineraryItem>,
    ) -> Self {
        let mut plan = Self {
            destination: destination.into(),
            days,
            items,
            total_cost: 0.0,
            currency: currency.into(),
            unique_source_count: 0,
        };
        plan.recompute();
        plan
    }

    /// A new plan with the same header and a different item list.
    ///
    /// The receiver is left untouched.
    pub fn with_items(&self, items: Vec<ItineraryItem>) -> Self {
        Self::new(self.destination.clone(), self.days, self.currency.clone(), items)
    }

    /// Days that have at least one activity.
    pub fn days_covered(&self) -> BTreeSet<u32> {
        self.items.iter().map(|item| item.day).collect()
    }

    /// Currencies used by items that differ from the plan currency.
    pub fn foreign_currencies(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .filter(|item| !item.currency.eq_ignore_ascii_case(&self.currency))
            .map(|item| item.currency.to_ascii_uppercase())
            .collect()
    }

    fn recompute(&mut self) {
        self.total_cost = self.items.iter().map(|item| item.approx_cost).sum();
        self.unique_source_count = self
            .items
            .iter()
            .filter_map(|item| item.source.as_deref())
            .filter(|source| !source.trim().is_empty())
            .collect::<BTreeSet<_>>()
            .len();
    }
}

/// The terminal artifact handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalPlan {
    #[serde(flatten)]
    pub plan: CandidatePlan,

    /// The validator's literal within-budget result
    pub under_budget: bool,

    /// Assumptions, substitutions and review annotations
    pub notes: String,

    /// True if any dependency fell back during the run
    pub degraded: bool,
}

/// A single web search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Conversion rate from one currency to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRate {
    pub from: String,
    pub to: String,
    pub rate: f64,
}

impl ExchangeRate {
    pub fn convert(&self, amount: f64) -> f64 {
        amount * self.rate
    }
}
