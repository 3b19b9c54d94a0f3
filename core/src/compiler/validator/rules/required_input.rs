//! Rule: Required Input
//!
//! Inputs the catalog template marks as required must carry a non-empty
//! value on the step. The template is authoritative: step instances are
//! saved without the editor configuration.

use crate::catalog::Catalog;
use crate::flow::Flow;

use super::super::{ValidationIssue, ValidationRule};

pub struct RequiredInputRule;

impl ValidationRule for RequiredInputRule {
    fn id(&self) -> &'static str {
        "required-input"
    }

    fn description(&self) -> &'static str {
        "required inputs must have a value"
    }

    fn validate(&self, flow: &Flow, catalog: &Catalog) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (index, step) in flow.steps.iter().enumerate() {
            if step.disabled {
                continue;
            }
            let Some(entry) = catalog.get(step.lookup_key()) else {
                continue;
            };
            for (name, template) in &entry.descriptor.inputs {
                let required = template.add_config.as_ref().is_some_and(|c| c.required);
                if !required {
                    continue;
                }
                let missing = step.inputs.get(name).map_or(true, |slot| slot.is_empty());
                if missing {
                    let label = template
                        .add_config
                        .as_ref()
                        .map(|c| c.label.as_str())
                        .filter(|l| !l.is_empty())
                        .unwrap_or(name);
                    issues.push(ValidationIssue::error(
                        index,
                        format!("{}: required input '{}' is empty", step.display(), label),
                        self.id(),
                    ));
                }
            }
        }
        issues
    }
}
