//! Emission strategies.
//!
//! Every step compiles to exactly one line. The line starts by assigning the
//! step's block context to the block slot, then performs whatever the
//! directive does. Structural directives (if, loops, try) open or close a
//! brace on their line instead of calling an operation.

use std::collections::BTreeSet;

use crate::catalog::{Directive, InputType};
use crate::errors::CompileError;
use crate::types::BlockContext;

use super::coder::{code_value, quote_name};

/// Name of the program variable holding the current block context.
pub const BLOCK_SLOT: &str = "__block";

/// Root object of the instrumented operation namespace in generated programs.
pub const NAMESPACE_ROOT: &str = "robot";

/// State threaded through the emission of one flow.
pub struct EmitContext<'a> {
    pub flow: &'a str,
    /// Zero-based step index
    pub step: usize,
    /// Statement assigning this step's block context
    pub block: String,
    declared: &'a mut BTreeSet<String>,
}

impl<'a> EmitContext<'a> {
    pub fn new(flow: &'a str, step: usize, block: String, declared: &'a mut BTreeSet<String>) -> Self {
        Self {
            flow,
            step,
            block,
            declared,
        }
    }

    /// Record that `name` is bound. Returns true the first time, when the
    /// caller must emit a declaration.
    pub fn declare(&mut self, name: &str) -> bool {
        self.declared.insert(name.to_string())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    pub fn error(&self, step: &Directive, message: impl Into<String>) -> CompileError {
        CompileError::Emit {
            flow: self.flow.to_string(),
            step: self.step,
            directive: step.lookup_key().to_string(),
            message: message.into(),
        }
    }
}

/// Produces the program line for one step.
pub trait Emitter: Send + Sync {
    fn emit(&self, step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError>;
}

impl<F> Emitter for F
where
    F: Fn(&Directive, &mut EmitContext<'_>) -> Result<String, CompileError> + Send + Sync,
{
    fn emit(&self, step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        self(step, ctx)
    }
}

/// Generic strategy: call `robot.<key>(params, __block)` and bind outputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEmitter;

impl Emitter for DefaultEmitter {
    fn emit(&self, step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        let call = format!(
            "{}.{}({}, {})",
            NAMESPACE_ROOT,
            step.lookup_key(),
            params_literal(step, ctx)?,
            BLOCK_SLOT
        );
        let bound = bind_outputs(step, ctx, &call);
        Ok(format!("{}; {}", ctx.block, bound))
    }
}

/// Object literal of coded inputs, keyed by input name, followed by any row-group inputs.
pub fn params_literal(step: &Directive, ctx: &EmitContext<'_>) -> Result<String, CompileError> {
    let mut parts = Vec::new();
    for (key, slot) in &step.inputs {
        parts.push(format!("{}: {}", quote_name(key), code_slot(step, key, slot, ctx)?));
    }
    if let Some(groups) = &step.inputs2 {
        for (key, group) in groups {
            let mut rows = Vec::new();
            for row in group.values.iter().flatten() {
                let mut cells = Vec::new();
                for cell in row {
                    cells.push(code_slot(step, key, cell, ctx)?);
                }
                rows.push(format!("[{}]", cells.join(", ")));
            }
            parts.push(format!("{}: [{}]", quote_name(key), rows.join(", ")));
        }
    }
    Ok(format!("{{{}}}", parts.join(", ")))
}

/// Code one input, rejecting unknown types and substituting `undefined` for empty code.
pub fn code_slot(
    step: &Directive,
    key: &str,
    slot: &crate::catalog::InputSlot,
    ctx: &EmitContext<'_>,
) -> Result<String, CompileError> {
    let code = code_value(slot);
    if code.trim().is_empty() {
        if let InputType::Unknown(kind) = &slot.kind {
            return Err(ctx.error(step, format!("input {} has unsupported type {}", key, kind)));
        }
        return Ok("undefined".to_string());
    }
    Ok(code)
}

/// `let` declarations for first-time outputs, then the call, destructured into
/// the output names when there are any.
pub fn bind_outputs(step: &Directive, ctx: &mut EmitContext<'_>, call: &str) -> String {
    let bound: Vec<(&String, &str)> = step
        .outputs
        .iter()
        .map(|(key, slot)| (key, slot.name.trim()))
        .filter(|(_, name)| !name.is_empty())
        .collect();

    if bound.is_empty() {
        return format!("{};", call);
    }

    let mut line = String::new();
    let fresh: Vec<&str> = bound
        .iter()
        .map(|(_, name)| *name)
        .filter(|name| ctx.declare(name))
        .collect();
    if !fresh.is_empty() {
        line.push_str(&format!("let {}; ", fresh.join(", ")));
    }
    let pattern: Vec<String> = bound
        .iter()
        .map(|(key, name)| format!("{}: {}", quote_name(key), name))
        .collect();
    line.push_str(&format!("({{ {} }} = {});", pattern.join(", "), call));
    line
}

/// Block-context constructor call: `block(line, flow, alias, name, display, strategy, interval, retries)`.
pub fn block_literal(block: &BlockContext) -> String {
    format!(
        "block({}, {}, {}, {}, {}, {}, {}, {})",
        block.block_line,
        quote_name(&block.flow_name),
        quote_name(&block.flow_alias_name),
        quote_name(&block.directive_name),
        quote_name(&block.directive_display_name),
        quote_name(block.failure_strategy.as_str()),
        block.interval_time,
        block.retry_count
    )
}

/// Statement assigning a block context to the block slot.
pub fn block_statement(block: &BlockContext) -> String {
    format!("{} = {}", BLOCK_SLOT, block_literal(block))
}
