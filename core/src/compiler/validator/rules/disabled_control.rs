//! Rule: Disabled Control
//!
//! Switching off a structural step would leave its construct half open, so
//! only plain steps (and break/continue) may be disabled.

use crate::catalog::Catalog;
use crate::flow::Flow;

use super::super::{role_of, Role, ValidationIssue, ValidationRule};

pub struct DisabledControlRule;

impl ValidationRule for DisabledControlRule {
    fn id(&self) -> &'static str {
        "disabled-control"
    }

    fn description(&self) -> &'static str {
        "control-flow markers cannot be disabled"
    }

    fn validate(&self, flow: &Flow, catalog: &Catalog) -> Vec<ValidationIssue> {
        flow.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.disabled)
            .filter(|(_, step)| {
                matches!(
                    role_of(step, catalog),
                    Role::Open { .. } | Role::Middle { .. } | Role::Close { .. }
                )
            })
            .map(|(index, step)| {
                ValidationIssue::error(
                    index,
                    format!("control step '{}' cannot be disabled", step.display()),
                    self.id(),
                )
            })
            .collect()
    }
}
