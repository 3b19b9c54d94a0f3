//! Rule: Output Name
//!
//! Output bindings become program variables, so each must be a plain
//! identifier that is neither a keyword nor in the reserved `__` prefix.

use crate::catalog::Catalog;
use crate::flow::Flow;
use crate::parser::is_identifier;

use super::super::{ValidationIssue, ValidationRule};

pub struct OutputNameRule;

impl ValidationRule for OutputNameRule {
    fn id(&self) -> &'static str {
        "invalid-output-name"
    }

    fn description(&self) -> &'static str {
        "output variables must be valid identifiers"
    }

    fn validate(&self, flow: &Flow, _catalog: &Catalog) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (index, step) in flow.steps.iter().enumerate() {
            if step.disabled {
                continue;
            }
            for (key, output) in &step.outputs {
                let name = output.name.trim();
                if name.is_empty() {
                    continue;
                }
                if !is_identifier(name) || name.starts_with("__") || name == "robot" {
                    issues.push(ValidationIssue::error(
                        index,
                        format!("output '{}' binds invalid variable name '{}'", key, name),
                        self.id(),
                    ));
                }
            }
        }
        issues
    }
}
