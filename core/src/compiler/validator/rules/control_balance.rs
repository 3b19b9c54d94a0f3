//! Rule: Control Balance
//!
//! Structural markers must nest: every opener has one closer of the same
//! construct, middle markers (else, else-if, catch) sit directly inside
//! their own construct, and break/continue only appear inside a loop.
//!
//! # Invalid
//!
//! ```text
//! if
//!   while
//! end if          // closes if while the while is still open
//! else            // no open if
//! break           // not inside a loop
//! ```

use crate::catalog::{builtin, Catalog};
use crate::flow::Flow;

use super::super::{role_of, Role, ValidationIssue, ValidationRule};

pub struct ControlBalanceRule;

struct Frame {
    construct: String,
    step: usize,
    is_loop: bool,
    has_else: bool,
    has_catch: bool,
}

impl ValidationRule for ControlBalanceRule {
    fn id(&self) -> &'static str {
        "control-balance"
    }

    fn description(&self) -> &'static str {
        "control markers must be balanced and properly nested"
    }

    fn validate(&self, flow: &Flow, catalog: &Catalog) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let id = self.id();

        for (index, step) in flow.steps.iter().enumerate() {
            if step.disabled {
                continue;
            }
            match role_of(step, catalog) {
                Role::Plain => {}
                Role::Open { construct, is_loop } => stack.push(Frame {
                    construct,
                    step: index,
                    is_loop,
                    has_else: false,
                    has_catch: false,
                }),
                Role::Middle { construct, key } => {
                    let Some(top) = stack.last_mut().filter(|f| f.construct == construct) else {
                        issues.push(ValidationIssue::error(
                            index,
                            format!("'{}' has no open '{}' to belong to", step.display(), construct),
                            id,
                        ));
                        continue;
                    };
                    if key == builtin::CATCH {
                        if top.has_catch {
                            issues.push(ValidationIssue::error(index, "try already has a catch", id));
                        }
                        top.has_catch = true;
                    } else if key == builtin::ELSE {
                        if top.has_else {
                            issues.push(ValidationIssue::error(index, "if already has an else", id));
                        }
                        top.has_else = true;
                    } else if key == builtin::ELSE_IF && top.has_else {
                        issues.push(ValidationIssue::error(index, "else-if after else", id));
                    }
                }
                Role::Close { construct } => {
                    match stack.iter().rposition(|f| f.construct == construct) {
                        None => issues.push(ValidationIssue::error(
                            index,
                            format!("'{}' closes a '{}' that is not open", step.display(), construct),
                            id,
                        )),
                        Some(position) => {
                            for unclosed in stack.drain(position + 1..).rev() {
                                issues.push(ValidationIssue::error(
                                    unclosed.step,
                                    format!("'{}' is not closed before step {}", unclosed.construct, index + 1),
                                    id,
                                ));
                            }
                            if let Some(frame) = stack.pop() {
                                if frame.construct == builtin::TRY && !frame.has_catch {
                                    issues.push(ValidationIssue::error(
                                        frame.step,
                                        "try has no catch",
                                        id,
                                    ));
                                }
                            }
                        }
                    }
                }
                Role::Break | Role::Continue => {
                    if !stack.iter().any(|f| f.is_loop) {
                        issues.push(ValidationIssue::error(
                            index,
                            format!("'{}' outside of a loop", step.display()),
                            id,
                        ));
                    }
                }
            }
        }

        for unclosed in stack {
            issues.push(ValidationIssue::error(
                unclosed.step,
                format!("'{}' is never closed", unclosed.construct),
                id,
            ));
        }
        issues
    }
}
