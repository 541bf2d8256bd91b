//! Catalog-backed dependencies.
//!
//! These answer from curated data instead of the network, so the whole
//! pipeline runs offline. They are also what the fallback chains fall back
//! to, which keeps primary and terminal answers consistent.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::Instant;
use wayfarer_core::{minimal_plan, CandidatePlan, Catalog, ExchangeRate, FixedRates, SearchHit};

use super::{CurrencyQuery, Dependency, DependencyKey, SynthesisInput};
use crate::error::ToolError;

/// Search answered from curated catalogs.
///
/// A query mentioning a known destination gets that catalog's entries as
/// hits; anything else gets an empty result.
#[derive(Debug, Clone)]
pub struct CatalogSearch {
    catalogs: Arc<Vec<Catalog>>,
}

impl CatalogSearch {
    pub fn new(catalogs: Arc<Vec<Catalog>>) -> Self {
        Self { catalogs }
    }

    pub fn hits_for(catalogs: &[Catalog], query: &str) -> Vec<SearchHit> {
        catalogs
            .iter()
            .filter(|catalog| catalog.covers(query))
            .flat_map(Catalog::search_hits)
            .collect()
    }
}

#[async_trait]
impl Dependency<String, Vec<SearchHit>> for CatalogSearch {
    fn key(&self) -> DependencyKey {
        DependencyKey::search()
    }

    async fn invoke(&self, query: &String, _deadline: Instant) -> Result<Vec<SearchHit>, ToolError> {
        if query.trim().is_empty() {
            return Err(ToolError::InvalidInput("empty search query".to_string()));
        }
        Ok(Self::hits_for(&self.catalogs, query))
    }
}

/// Builds an itinerary from the catalog entries the search surfaced.
///
/// Items stay priced in the catalog's own currency; converting them is the
/// currency phase's job.
#[derive(Debug, Clone)]
pub struct CatalogSynthesizer {
    catalogs: Arc<Vec<Catalog>>,
}

impl CatalogSynthesizer {
    pub fn new(catalogs: Arc<Vec<Catalog>>) -> Self {
        Self { catalogs }
    }

    fn synthesize(&self, input: &SynthesisInput) -> CandidatePlan {
        let request = &input.request;
        let Some(catalog) = self
            .catalogs
            .iter()
            .find(|catalog| catalog.covers(&request.destination))
        else {
            return minimal_plan(request);
        };

        let urls: BTreeSet<&str> = input.hits.iter().map(|hit| hit.url.as_str()).collect();
        let mut selected = catalog.clone();
        selected.entries.retain(|entry| {
            entry
                .source
                .as_deref()
                .is_some_and(|source| urls.contains(source))
        });
        if selected.entries.is_empty() {
            selected.entries = catalog.entries.clone();
        }

        CandidatePlan::new(
            request.destination.clone(),
            request.days,
            request.budget_currency.clone(),
            selected.items_in(&catalog.currency, 1.0, request.days),
        )
    }
}

#[async_trait]
impl Dependency<SynthesisInput, CandidatePlan> for CatalogSynthesizer {
    fn key(&self) -> DependencyKey {
        DependencyKey::synthesis()
    }

    async fn invoke(
        &self,
        input: &SynthesisInput,
        _deadline: Instant,
    ) -> Result<CandidatePlan, ToolError> {
        Ok(self.synthesize(input))
    }
}

/// Exchange rates from the fixed table. Unknown pairs are an error here,
/// unlike the terminal fallback which answers 1:1.
#[derive(Debug, Clone, Default)]
pub struct FixedRateCurrency {
    rates: FixedRates,
}

impl FixedRateCurrency {
    pub fn new(rates: FixedRates) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl Dependency<CurrencyQuery, ExchangeRate> for FixedRateCurrency {
    fn key(&self) -> DependencyKey {
        DependencyKey::currency()
    }

    async fn invoke(
        &self,
        query: &CurrencyQuery,
        _deadline: Instant,
    ) -> Result<ExchangeRate, ToolError> {
        if query.from != query.to && !self.rates.knows(&query.from, &query.to) {
            return Err(ToolError::Dependency(format!(
                "no rate for {} -> {}",
                query.from, query.to
            )));
        }
        Ok(self.rates.rate(&query.from, &query.to))
    }
}
