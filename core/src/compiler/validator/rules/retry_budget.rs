//! Rule: Retry Budget
//!
//! A retry strategy with zero retries behaves like `throw` after one
//! attempt. Legal, but rarely what the author meant.

use crate::catalog::Catalog;
use crate::flow::Flow;
use crate::types::FailureStrategy;

use super::super::{ValidationIssue, ValidationRule};

pub struct RetryBudgetRule;

impl ValidationRule for RetryBudgetRule {
    fn id(&self) -> &'static str {
        "retry-without-budget"
    }

    fn description(&self) -> &'static str {
        "retry strategy should allow at least one retry"
    }

    fn validate(&self, flow: &Flow, _catalog: &Catalog) -> Vec<ValidationIssue> {
        flow.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| !step.disabled)
            .filter(|(_, step)| {
                step.failure_strategy == Some(FailureStrategy::Retry)
                    && step.retry_count.unwrap_or(0) == 0
            })
            .map(|(index, step)| {
                ValidationIssue::warning(
                    index,
                    format!("'{}' retries on failure but allows 0 retries", step.display()),
                    self.id(),
                )
            })
            .collect()
    }
}
