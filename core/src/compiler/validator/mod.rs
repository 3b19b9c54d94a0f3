//! Flow validation
//!
//! Rule-based checks that run before any code is emitted. A flow with at
//! least one error-severity finding produces no program text.
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `validator/rules/`
//! 2. Implement `ValidationRule` for your struct
//! 3. Add it to `Validator::new()`

pub mod rules;

use crate::catalog::{builtin, Catalog, Directive};
use crate::errors::StepIssue;
use crate::flow::Flow;

/// Severity levels for validation findings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Blocks compilation
    Error,
    /// Reported, compilation proceeds
    Warning,
}

/// A finding attributed to one step of a flow.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Zero-based step index
    pub step: usize,
    pub message: String,
    pub severity: Severity,
    pub rule_id: &'static str,
}

impl ValidationIssue {
    pub fn error(step: usize, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            step,
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(step: usize, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            step,
            message: message.into(),
            severity: Severity::Warning,
            rule_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    pub fn into_step_issue(self, flow: &str) -> StepIssue {
        StepIssue {
            flow: flow.to_string(),
            step: self.step,
            rule_id: self.rule_id.to_string(),
            message: self.message,
        }
    }
}

/// Trait that all validation rules implement.
pub trait ValidationRule: Send + Sync {
    /// Unique identifier, e.g. "control-balance"
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn validate(&self, flow: &Flow, catalog: &Catalog) -> Vec<ValidationIssue>;
}

/// Runs every registered rule.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::UnknownDirectiveRule),
                Box::new(rules::RequiredInputRule),
                Box::new(rules::InputTypeRule),
                Box::new(rules::OutputNameRule),
                Box::new(rules::ControlBalanceRule),
                Box::new(rules::DisabledControlRule),
                Box::new(rules::RetryBudgetRule),
            ],
        }
    }

    /// Findings sorted by step, then rule.
    pub fn validate(&self, flow: &Flow, catalog: &Catalog) -> Vec<ValidationIssue> {
        let mut issues: Vec<ValidationIssue> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(flow, catalog))
            .collect();
        issues.sort_by(|a, b| a.step.cmp(&b.step).then(a.rule_id.cmp(b.rule_id)));
        issues
    }

    /// Checks that apply to a step compiled on its own (no structure).
    pub fn validate_step(&self, flow: &Flow, index: usize, catalog: &Catalog) -> Vec<ValidationIssue> {
        let Some(step) = flow.steps.get(index) else {
            return vec![ValidationIssue::error(index, "no such step", "unknown-directive")];
        };
        let single = Flow {
            name: flow.name.clone(),
            alias_name: flow.alias_name.clone(),
            steps: vec![step.clone()],
            breakpoints: Default::default(),
        };
        let standalone: [&dyn ValidationRule; 4] = [
            &rules::UnknownDirectiveRule,
            &rules::RequiredInputRule,
            &rules::InputTypeRule,
            &rules::OutputNameRule,
        ];
        standalone
            .iter()
            .flat_map(|rule| rule.validate(&single, catalog))
            .map(|mut issue| {
                issue.step = index;
                issue
            })
            .collect()
    }

    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/* ===================== Step Roles ===================== */

/// Structural role of a step, taken from its catalog template when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Open { construct: String, is_loop: bool },
    Middle { construct: String, key: String },
    Close { construct: String },
    Break,
    Continue,
    Plain,
}

pub fn role_of(step: &Directive, catalog: &Catalog) -> Role {
    let template = catalog
        .get(step.lookup_key())
        .map(|e| &e.descriptor)
        .unwrap_or(step);
    let key = template.lookup_key();
    if key == builtin::BREAK {
        return Role::Break;
    }
    if key == builtin::CONTINUE {
        return Role::Continue;
    }
    let construct = template.construct_name();
    if template.is_control {
        Role::Open {
            construct,
            is_loop: template.is_loop || step.is_loop,
        }
    } else if template.is_else {
        Role::Middle {
            construct,
            key: key.to_string(),
        }
    } else if template.is_control_end {
        Role::Close { construct }
    } else {
        Role::Plain
    }
}

#[cfg(test)]
mod tests;
