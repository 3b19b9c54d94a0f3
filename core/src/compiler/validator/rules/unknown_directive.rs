//! Rule: Unknown Directive
//!
//! Every enabled step must name a directive the catalog knows, and its key
//! must be a dotted path of plain identifiers so it can address the
//! operation namespace.

use crate::catalog::Catalog;
use crate::flow::Flow;
use crate::parser::is_identifier_name;

use super::super::{ValidationIssue, ValidationRule};

pub struct UnknownDirectiveRule;

impl ValidationRule for UnknownDirectiveRule {
    fn id(&self) -> &'static str {
        "unknown-directive"
    }

    fn description(&self) -> &'static str {
        "steps must reference a directive in the catalog"
    }

    fn validate(&self, flow: &Flow, catalog: &Catalog) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (index, step) in flow.steps.iter().enumerate() {
            if step.disabled {
                continue;
            }
            let key = step.lookup_key();
            if !key.split('.').all(is_identifier_name) {
                issues.push(ValidationIssue::error(
                    index,
                    format!("directive key '{}' is not a dotted identifier path", key),
                    self.id(),
                ));
            } else if !catalog.contains(key) {
                issues.push(ValidationIssue::error(
                    index,
                    format!("no directive named '{}' in the catalog", key),
                    self.id(),
                ));
            }
        }
        issues
    }
}
