//! Search queries and result ranking.
//!
//! A planning run issues one query per template, then merges the answers:
//! results without any price hint are dropped, duplicates (by URL) are
//! removed, and the rest are ordered by how clearly they state a price.

use std::collections::HashSet;

use crate::request::TravelRequest;
use crate::types::SearchHit;

/// Hits kept after merging.
pub const MAX_HITS: usize = 20;

/// Any of these marks a result as price-related.
const PRICE_INDICATORS: &[&str] = &[
    "price", "cost", "$", "€", "£", "aed", "usd", "eur", "gbp", "ticket", "booking", "from",
    "starting", "fee", "charge",
];

/// Each of these found in a result counts towards its ranking.
const CLEAR_PRICING: &[&str] = &["$", "aed", "usd", "price:", "cost:", "from ", "starting at"];

/// The price-focused queries for one request.
pub fn queries_for(request: &TravelRequest) -> Vec<String> {
    let destination = request.destination.trim();
    vec![
        format!("{destination} hotel prices {}", request.budget_currency),
        format!("{destination} attraction tickets cost price"),
        format!("{destination} restaurant meal prices"),
        format!("{destination} activities cost booking price"),
        format!("{destination} landmark tickets price cost"),
        format!("{destination} desert safari price cost"),
        format!("{destination} museum entry fee price"),
        format!("{destination} transport taxi metro cost"),
    ]
}

fn text_of(hit: &SearchHit) -> String {
    format!("{} {}", hit.snippet, hit.title).to_lowercase()
}

pub fn is_price_relevant(hit: &SearchHit) -> bool {
    let text = text_of(hit);
    PRICE_INDICATORS.iter().any(|indicator| text.contains(indicator))
}

/// Number of clear pricing patterns in a hit.
pub fn pricing_score(hit: &SearchHit) -> usize {
    let text = text_of(hit);
    CLEAR_PRICING
        .iter()
        .filter(|pattern| text.contains(*pattern))
        .count()
}

/// Filter, de-duplicate by URL, rank and cap the hits of all queries.
///
/// The sort is stable, so equally ranked hits keep query order.
pub fn merge_hits(batches: impl IntoIterator<Item = Vec<SearchHit>>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    let mut hits: Vec<SearchHit> = batches
        .into_iter()
        .flatten()
        .filter(is_price_relevant)
        .filter(|hit| seen.insert(hit.url.clone()))
        .collect();

    hits.sort_by_key(|hit| std::cmp::Reverse(pricing_score(hit)));
    hits.truncate(MAX_HITS);
    hits
}
