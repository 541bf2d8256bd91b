//! Curated fallback catalog.
//!
//! The catalog is the data behind every terminal fallback: it cannot fail,
//! so a planning run always has something to return. User catalogs loaded
//! from disk are validated against `catalog.schema.json` first.

mod rates;
mod schema;

pub use rates::{round_cents, FixedRates};
pub use schema::validate_catalog_schema;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::request::TravelRequest;
use crate::types::{CandidatePlan, ItineraryItem, SearchHit};

/// Activities kept per day when building a plan from the catalog.
const MAX_ITEMS_PER_DAY: usize = 2;

/// Errors loading a catalog file.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Catalog does not match schema: {}", .0.join(", "))]
    SchemaViolation(Vec<String>),
}

/// One curated activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub day: u32,
    pub activity: String,
    pub approx_cost: f64,
    #[serde(default)]
    pub source: Option<String>,
}

/// Curated activities for one destination, priced in one currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub destination: String,
    pub currency: String,
    pub entries: Vec<CatalogEntry>,
    #[serde(default)]
    pub notes: String,
}

impl Catalog {
    /// The built-in Dubai catalog (321 AED, five distinct sources).
    pub fn dubai() -> Self {
        let entry = |day, activity: &str, approx_cost, source: &str| CatalogEntry {
            day,
            activity: activity.to_string(),
            approx_cost,
            source: Some(source.to_string()),
        };

        Self {
            destination: "Dubai".to_string(),
            currency: "AED".to_string(),
            entries: vec![
                entry(1, "Burj Khalifa At The Top (levels 124-125)", 169.0, "https://www.burjkhalifa.ae"),
                entry(1, "Dubai Fountain show at Dubai Mall", 0.0, "https://www.thedubaimall.com"),
                entry(2, "Evening desert safari (shared, with dinner)", 100.0, "https://www.visitdubai.com"),
                entry(2, "Al Fahidi Historical Neighbourhood walk", 0.0, "https://www.visitdubai.com"),
                entry(3, "Dubai Frame", 50.0, "https://www.dubaiframe.ae"),
                entry(3, "Abra crossing to the Gold and Spice Souks", 2.0, "https://www.rta.ae"),
            ],
            notes: "Curated prices, may be out of date.".to_string(),
        }
    }

    /// Parse and schema-check a catalog document.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        validate_catalog_schema(&value).map_err(CatalogError::SchemaViolation)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Whether this catalog applies to `destination` (case-insensitive).
    pub fn covers(&self, destination: &str) -> bool {
        destination
            .to_lowercase()
            .contains(&self.destination.to_lowercase())
    }

    pub fn total_cost(&self) -> f64 {
        self.entries.iter().map(|e| e.approx_cost).sum()
    }

    /// The catalog rendered as search results.
    pub fn search_hits(&self) -> Vec<SearchHit> {
        self.entries
            .iter()
            .map(|entry| SearchHit {
                title: entry.activity.clone(),
                url: entry.source.clone().unwrap_or_default(),
                snippet: format!("Cost: {} {}", entry.approx_cost, self.currency),
            })
            .collect()
    }

    /// Entries for the first `days` days, at most two per day,
    /// priced in `currency` by multiplying with `rate`.
    pub fn items_in(&self, currency: &str, rate: f64, days: u32) -> Vec<ItineraryItem> {
        let mut per_day = std::collections::BTreeMap::<u32, usize>::new();

        self.entries
            .iter()
            .filter(|entry| entry.day <= days)
            .filter(|entry| {
                let count = per_day.entry(entry.day).or_insert(0);
                *count += 1;
                *count <= MAX_ITEMS_PER_DAY
            })
            .map(|entry| ItineraryItem {
                day: entry.day,
                activity: entry.activity.clone(),
                approx_cost: round_cents(entry.approx_cost * rate),
                currency: currency.to_string(),
                source: entry.source.clone(),
            })
            .collect()
    }

    /// A full plan for `request`, converted with the fixed rate table.
    pub fn plan_for(&self, request: &TravelRequest, rates: &FixedRates) -> CandidatePlan {
        let rate = rates.rate(&self.currency, &request.budget_currency);
        CandidatePlan::new(
            request.destination.clone(),
            request.days,
            request.budget_currency.clone(),
            self.items_in(&request.budget_currency, rate.rate, request.days),
        )
    }
}

/// One free exploration slot per day, used when no catalog applies.
pub fn minimal_plan(request: &TravelRequest) -> CandidatePlan {
    let items = (1..=request.days)
        .map(|day| {
            ItineraryItem::new(
                day,
                format!("Explore {} - Day {}", request.destination, day),
                0.0,
                request.budget_currency.clone(),
                None,
            )
        })
        .collect();

    CandidatePlan::new(
        request.destination.clone(),
        request.days,
        request.budget_currency.clone(),
        items,
    )
}
