//! Global functions and methods available to programs.
//!
//! Everything here is pure: failures come back as [`ErrorInfo`] and the
//! interpreter turns them into thrown values.

use crate::types::{BlockContext, FailureStrategy};

use super::errors::{ErrorInfo, RANGE_ERROR, SYNTAX_ERROR, TYPE_ERROR};
use super::types::values::format_number;
use super::types::Val;

/// Largest list `range()` will build.
pub const RANGE_LIMIT: f64 = 1_000_000.0;

/// Names callable as plain functions, besides `runFlow`.
pub const GLOBAL_FUNCTIONS: &[&str] = &["Number", "String", "Boolean", "block", "range"];

/// Call a plain global function. `None` if `name` is not one.
pub fn call_global(name: &str, args: &[Val]) -> Option<Result<Val, ErrorInfo>> {
    let first = args.first().cloned().unwrap_or(Val::Undefined);
    let result = match name {
        "Number" => Ok(Val::Num(first.to_number())),
        "String" => Ok(Val::Str(first.to_display())),
        "Boolean" => Ok(Val::Bool(first.is_truthy())),
        "block" => block(args),
        "range" => range(&first, args.get(1).unwrap_or(&Val::Undefined)),
        _ => return None,
    };
    Some(result)
}

/// `block(line, flow, alias, name, display, strategy, interval, retries)`
pub fn block(args: &[Val]) -> Result<Val, ErrorInfo> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Val::Undefined);
    let text = |i: usize| match arg(i) {
        Val::Undefined | Val::Null => String::new(),
        other => other.to_display(),
    };
    let line = arg(0).to_number();
    if !line.is_finite() {
        return Err(ErrorInfo::new(TYPE_ERROR, "block line must be a number"));
    }
    let interval = arg(6).to_number();
    let retries = arg(7).to_number();
    let context = BlockContext {
        block_line: line as i64,
        flow_name: text(1),
        flow_alias_name: text(2),
        directive_name: text(3),
        directive_display_name: text(4),
        failure_strategy: FailureStrategy::parse(&text(5)),
        interval_time: if interval.is_finite() && interval > 0.0 {
            interval
        } else {
            0.0
        },
        retry_count: if retries.is_finite() && retries > 0.0 {
            retries as u32
        } else {
            0
        },
    };
    Ok(block_to_val(&context))
}

pub fn block_to_val(block: &BlockContext) -> Val {
    serde_json::to_value(block)
        .map(|json| Val::from_json(&json))
        .unwrap_or(Val::Undefined)
}

/// Read a block context back from a program value.
pub fn val_to_block(value: &Val) -> Option<BlockContext> {
    match value {
        Val::Obj(_) => serde_json::from_value(value.to_json()).ok(),
        _ => None,
    }
}

/// `range(start, end)`: whole numbers from `start` up to, not including, `end`.
pub fn range(start: &Val, end: &Val) -> Result<Val, ErrorInfo> {
    let (start, end) = (start.to_number(), end.to_number());
    if !start.is_finite() || !end.is_finite() {
        return Err(ErrorInfo::new(
            RANGE_ERROR,
            format!(
                "range bounds must be finite numbers, got {} and {}",
                format_number(start),
                format_number(end)
            ),
        ));
    }
    let (start, end) = (start.ceil(), end.ceil());
    if end - start > RANGE_LIMIT {
        return Err(ErrorInfo::new(
            RANGE_ERROR,
            format!("range of {} items exceeds the limit of {}", end - start, RANGE_LIMIT),
        ));
    }
    let mut items = Vec::new();
    let mut n = start;
    while n < end {
        items.push(Val::Num(n));
        n += 1.0;
    }
    Ok(Val::List(items))
}

/// `JSON.parse` / `JSON.stringify`
pub fn call_json(method: &str, args: &[Val]) -> Option<Result<Val, ErrorInfo>> {
    let first = args.first().cloned().unwrap_or(Val::Undefined);
    let result = match method {
        "parse" => {
            let text = first.to_display();
            serde_json::from_str::<serde_json::Value>(&text)
                .map(|json| Val::from_json(&json))
                .map_err(|e| ErrorInfo::new(SYNTAX_ERROR, format!("JSON.parse: {}", e)))
        }
        "stringify" => Ok(match first {
            Val::Undefined => Val::Undefined,
            other => Val::Str(other.to_json().to_string()),
        }),
        _ => return None,
    };
    Some(result)
}

/// Methods on strings and lists. `None` if the receiver has no such method.
pub fn call_method(receiver: &Val, method: &str, args: &[Val]) -> Option<Result<Val, ErrorInfo>> {
    let first = args.first().cloned().unwrap_or(Val::Undefined);
    let value = match (receiver, method) {
        (Val::Str(s), "toLowerCase") => Val::Str(s.to_lowercase()),
        (Val::Str(s), "toUpperCase") => Val::Str(s.to_uppercase()),
        (Val::Str(s), "trim") => Val::Str(s.trim().to_string()),
        (Val::Str(s), "includes") => Val::Bool(s.contains(first.to_display().as_str())),
        (Val::Str(s), "startsWith") => Val::Bool(s.starts_with(first.to_display().as_str())),
        (Val::Str(s), "endsWith") => Val::Bool(s.ends_with(first.to_display().as_str())),
        (Val::Str(s), "split") => {
            let sep = first.to_display();
            let parts: Vec<Val> = if sep.is_empty() {
                s.chars().map(|c| Val::Str(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Val::str).collect()
            };
            Val::List(parts)
        }
        (Val::List(items), "includes") => Val::Bool(items.iter().any(|v| v == &first)),
        (Val::List(items), "join") => {
            let sep = match first {
                Val::Undefined => ",".to_string(),
                other => other.to_display(),
            };
            Val::Str(
                items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        (Val::Obj(map), "hasOwnProperty") => Val::Bool(map.contains_key(&first.to_display())),
        _ => return None,
    };
    Some(Ok(value))
}

/// Keys of an object, for `Object.keys`.
pub fn object_keys(value: &Val) -> Result<Val, ErrorInfo> {
    match value {
        Val::Obj(map) => Ok(Val::List(map.keys().cloned().map(Val::Str).collect())),
        other => Err(ErrorInfo::new(
            TYPE_ERROR,
            format!("Object.keys called on {}", other.type_name()),
        )),
    }
}
