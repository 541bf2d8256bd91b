//! Travel request and its input validation.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    /// ISO 4217 style alphabetic code
    static ref CURRENCY_CODE: Regex = Regex::new(r"^[A-Z]{3}$").expect("Invalid regex");
}

/// Longest trip the planner accepts.
pub const MAX_DAYS: u32 = 7;

/// Errors for malformed travel requests.
///
/// These are caller mistakes, never retried and never covered by fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Destination cannot be empty")]
    EmptyDestination,

    #[error("Days must be between 1 and {MAX_DAYS}, got {0}")]
    DaysOutOfRange(u32),

    #[error("Budget amount must be positive, got {0}")]
    InvalidBudget(f64),

    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),
}

/// What the caller asks the planner for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TravelRequest {
    pub destination: String,
    pub days: u32,
    pub budget_amount: f64,
    pub budget_currency: String,
}

impl TravelRequest {
    /// Create a request. The currency code is upper-cased.
    pub fn new(
        destination: impl Into<String>,
        days: u32,
        budget_amount: f64,
        budget_currency: impl AsRef<str>,
    ) -> Self {
        Self {
            destination: destination.into(),
            days,
            budget_amount,
            budget_currency: budget_currency.as_ref().trim().to_ascii_uppercase(),
        }
    }

    /// Check the request before any dependency is called.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.destination.trim().is_empty() {
            return Err(RequestError::EmptyDestination);
        }

        if !(1..=MAX_DAYS).contains(&self.days) {
            return Err(RequestError::DaysOutOfRange(self.days));
        }

        if !self.budget_amount.is_finite() || self.budget_amount <= 0.0 {
            return Err(RequestError::InvalidBudget(self.budget_amount));
        }

        if !CURRENCY_CODE.is_match(&self.budget_currency.to_ascii_uppercase()) {
            return Err(RequestError::InvalidCurrency(self.budget_currency.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        let request = TravelRequest::new("Dubai", 3, 500.0, "aed");
        assert_eq!(request.budget_currency, "AED");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_rejects_blank_destination() {
        let request = TravelRequest::new("   ", 3, 500.0, "AED");
        assert_eq!(request.validate(), Err(RequestError::EmptyDestination));
    }

    #[test]
    fn test_rejects_day_range() {
        assert_eq!(
            TravelRequest::new("Dubai", 0, 500.0, "AED").validate(),
            Err(RequestError::DaysOutOfRange(0))
        );
        assert_eq!(
            TravelRequest::new("Dubai", 8, 500.0, "AED").validate(),
            Err(RequestError::DaysOutOfRange(8))
        );
        assert!(TravelRequest::new("Dubai", 7, 500.0, "AED").validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_budget() {
        assert!(matches!(
            TravelRequest::new("Dubai", 3, 0.0, "AED").validate(),
            Err(RequestError::InvalidBudget(_))
        ));
        assert!(matches!(
            TravelRequest::new("Dubai", 3, f64::NAN, "AED").validate(),
            Err(RequestError::InvalidBudget(_))
        ));
    }

    #[test]
    fn test_rejects_bad_currency() {
        assert!(matches!(
            TravelRequest::new("Dubai", 3, 100.0, "DIRHAM").validate(),
            Err(RequestError::InvalidCurrency(_))
        ));
        assert!(matches!(
            TravelRequest::new("Dubai", 3, 100.0, "A1D").validate(),
            Err(RequestError::InvalidCurrency(_))
        ));
    }
}
