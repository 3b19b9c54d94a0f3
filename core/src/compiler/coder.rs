//! Value/type coder: turns a typed input slot into an expression fragment.
//!
//! Raw editor values are always text. The slot's declared type decides how
//! that text is embedded so that the program evaluates it the way the editor
//! meant it.

use serde_json::Value as JsonValue;

use crate::catalog::{InputSlot, InputType, ObjectMode};

/// Code fragment for a slot. Returns an empty string for types the coder does
/// not know; callers decide whether that is an error.
pub fn code_value(slot: &InputSlot) -> String {
    let raw = slot.raw_text();
    match &slot.kind {
        InputType::String | InputType::Textarea => quote_text(&raw),
        InputType::Number => format!("Number({})", quote_text(&raw)),
        InputType::Boolean => format!("String({}).toLowerCase() == \"true\"", quote_text(&raw)),
        InputType::Object => code_object(slot, raw),
        InputType::Array => format!("[{}]", raw),
        InputType::ArrayObject => raw,
        InputType::Variable => {
            let name = raw.trim();
            if name.is_empty() {
                "undefined".to_string()
            } else {
                name.to_string()
            }
        }
        InputType::Unknown(_) => String::new(),
    }
}

fn code_object(slot: &InputSlot, raw: String) -> String {
    match slot.object_mode {
        Some(ObjectMode::String) => format!("String({})", quote_text(&raw)),
        Some(ObjectMode::Expression) => raw,
        Some(ObjectMode::StringRaw) => match &slot.value {
            JsonValue::Null => "\"\"".to_string(),
            // Structured values serialize to a data literal; text becomes a string literal
            other => other.to_string(),
        },
        None if slot.enable_expression.unwrap_or(false) => raw,
        None => format!("String({})", quote_text(&raw)),
    }
}

/// Backtick literal that evaluates to exactly `text`.
///
/// Escapes the backslash, the backtick and line breaks, so the literal always
/// stays on one physical line.
pub fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('`');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out.push('`');
    out
}

/// Double-quoted literal (JSON string syntax), used for names and keys.
pub fn quote_name(text: &str) -> String {
    JsonValue::String(text.to_string()).to_string()
}
