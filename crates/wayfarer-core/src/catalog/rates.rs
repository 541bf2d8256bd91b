//! Fixed exchange-rate table used when live currency lookup is unavailable.

use std::collections::HashMap;

use crate::types::ExchangeRate;

/// Static rates, quoted as "1 `from` = `rate` `to`".
const FIXED_RATES: &[(&str, &str, f64)] = &[
    ("USD", "AED", 3.67),
    ("EUR", "USD", 1.10),
    ("EUR", "AED", 4.04),
    ("GBP", "USD", 1.25),
    ("GBP", "AED", 4.59),
];

/// Lookup table of fixed exchange rates, including inverses.
#[derive(Debug, Clone)]
pub struct FixedRates {
    rates: HashMap<(String, String), f64>,
}

impl FixedRates {
    /// Rate from `from` to `to`. Identity for equal currencies,
    /// 1:1 for pairs the table does not know.
    pub fn rate(&self, from: &str, to: &str) -> ExchangeRate {
        let from = from.to_ascii_uppercase();
        let to = to.to_ascii_uppercase();

        let rate = if from == to {
            1.0
        } else {
            match self.rates.get(&(from.clone(), to.clone())) {
                Some(rate) => *rate,
                None => {
                    tracing::warn!(%from, %to, "No fixed exchange rate, using 1:1");
                    1.0
                }
            }
        };

        ExchangeRate { from, to, rate }
    }

    pub fn knows(&self, from: &str, to: &str) -> bool {
        self.rates
            .contains_key(&(from.to_ascii_uppercase(), to.to_ascii_uppercase()))
    }
}

impl Default for FixedRates {
    fn default() -> Self {
        let mut rates = HashMap::new();
        for (from, to, rate) in FIXED_RATES {
            rates.insert((from.to_string(), to.to_string()), *rate);
            rates.insert((to.to_string(), from.to_string()), 1.0 / rate);
        }
        Self { rates }
    }
}

/// Round a converted amount to cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usd_to_aed() {
        let rates = FixedRates::default();
        let rate = rates.rate("usd", "AED");
        assert_eq!(rate.rate, 3.67);
        assert_eq!(rate.from, "USD");
        assert_eq!(round_cents(rate.convert(10.0)), 36.7);
    }

    #[test]
    fn test_inverse_rates() {
        let rates = FixedRates::default();
        let there = rates.rate("USD", "AED").rate;
        let back = rates.rate("AED", "USD").rate;
        assert!((there * back - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_pair_is_identity() {
        let rates = FixedRates::default();
        assert!(!rates.knows("JPY", "AED"));
        assert_eq!(rates.rate("JPY", "AED").rate, 1.0);
        assert_eq!(rates.rate("AED", "aed").rate, 1.0);
    }
}
