//! Rule: Unsupported Input Type

use crate::catalog::{Catalog, InputSlot, InputType};
use crate::flow::Flow;

use super::super::{ValidationIssue, ValidationRule};

pub struct InputTypeRule;

impl ValidationRule for InputTypeRule {
    fn id(&self) -> &'static str {
        "unsupported-input-type"
    }

    fn description(&self) -> &'static str {
        "input types must be ones the coder can emit"
    }

    fn validate(&self, flow: &Flow, _catalog: &Catalog) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (index, step) in flow.steps.iter().enumerate() {
            if step.disabled {
                continue;
            }
            let plain = step.inputs.iter().map(|(k, s)| (k.as_str(), s));
            let grouped = step
                .inputs2
                .iter()
                .flatten()
                .flat_map(|(k, g)| g.values.iter().flatten().flatten().map(move |s| (k.as_str(), s)));
            for (name, slot) in plain.chain(grouped) {
                if let Some(kind) = unknown_kind(slot) {
                    issues.push(ValidationIssue::error(
                        index,
                        format!("input '{}' has unsupported type '{}'", name, kind),
                        self.id(),
                    ));
                }
            }
        }
        issues
    }
}

fn unknown_kind(slot: &InputSlot) -> Option<&str> {
    match &slot.kind {
        InputType::Unknown(kind) => Some(kind),
        _ => None,
    }
}
