//! Arithmetic over plan costs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use wayfarer_core::CandidatePlan;

use super::{Dependency, DependencyKey};
use crate::error::ToolError;

/// An arithmetic expression to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostExpression {
    pub expression: String,

    /// Addends of the expression when it is a plain sum; the fallback
    /// total when the calculator cannot be reached
    #[serde(default)]
    pub terms: Vec<f64>,
}

impl CostExpression {
    /// Evaluate an arbitrary expression; it has no fallback terms.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            terms: Vec::new(),
        }
    }

    /// The sum of a plan's item costs.
    pub fn total_of(plan: &CandidatePlan) -> Self {
        let terms: Vec<f64> = plan.items.iter().map(|item| item.approx_cost).collect();
        let expression = if terms.is_empty() {
            "0.0".to_string()
        } else {
            terms
                .iter()
                .map(|cost| format!("{cost:.2}"))
                .collect::<Vec<_>>()
                .join(" + ")
        };
        Self { expression, terms }
    }

    pub fn sum_of_terms(&self) -> f64 {
        self.terms.iter().sum()
    }
}

/// Evaluates expressions with `evalexpr`.
///
/// A malformed expression, or one without a finite numeric value, is
/// invalid input: no retry or fallback can fix it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

impl Calculator {
    pub fn evaluate(expression: &str) -> Result<f64, ToolError> {
        let value = evalexpr::eval(expression)
            .and_then(|value| value.as_number())
            .map_err(|err| ToolError::InvalidInput(format!("{expression:?}: {err}")))?;

        if !value.is_finite() {
            return Err(ToolError::InvalidInput(format!(
                "{expression:?} does not evaluate to a finite number"
            )));
        }
        Ok(value)
    }
}

#[async_trait]
impl Dependency<CostExpression, f64> for Calculator {
    fn key(&self) -> DependencyKey {
        DependencyKey::calculator()
    }

    async fn invoke(&self, input: &CostExpression, _deadline: Instant) -> Result<f64, ToolError> {
        Self::evaluate(&input.expression)
    }
}
