//! Runtime value types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::super::errors::ErrorInfo;

/// Runtime value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Val>),
    Obj(BTreeMap<String, Val>),
    /// Error value with code, message and causal chain
    Error(ErrorInfo),
}

impl Val {
    pub fn empty_obj() -> Self {
        Val::Obj(BTreeMap::new())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Val::Str(s.into())
    }

    /// Truthiness used by conditions and `!`
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Undefined | Val::Null => false,
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            Val::List(_) | Val::Obj(_) | Val::Error(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Undefined => "undefined",
            Val::Null => "null",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::List(_) => "array",
            Val::Obj(_) => "object",
            Val::Error(_) => "error",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Val::Undefined | Val::Null)
    }

    /// Numeric conversion; text that is not a number becomes NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Val::Undefined => f64::NAN,
            Val::Null => 0.0,
            Val::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Val::Num(n) => *n,
            Val::Str(s) => parse_number(s),
            Val::List(items) if items.is_empty() => 0.0,
            Val::List(items) if items.len() == 1 => items[0].to_number(),
            _ => f64::NAN,
        }
    }

    /// Text conversion. Objects render as JSON.
    pub fn to_display(&self) -> String {
        match self {
            Val::Undefined => "undefined".to_string(),
            Val::Null => "null".to_string(),
            Val::Bool(b) => b.to_string(),
            Val::Num(n) => format_number(*n),
            Val::Str(s) => s.clone(),
            Val::List(items) => items
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                .collect::<Vec<_>>()
                .join(","),
            Val::Obj(_) => self.to_json().to_string(),
            Val::Error(info) => info.to_string(),
        }
    }

    /// Equality of `==`: null and undefined are equal to each other, numbers
    /// compare with numeric text and booleans by value.
    pub fn loose_eq(&self, other: &Val) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Val::Num(a), Val::Num(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Num(_), Val::Str(_)) | (Val::Str(_), Val::Num(_)) => {
                self.to_number() == other.to_number()
            }
            (Val::Bool(_), _) | (_, Val::Bool(_)) => self.to_number() == other.to_number(),
            (a, b) => a == b,
        }
    }

    /// Property read: object keys, list/string `length` and indices, error fields.
    pub fn get_property(&self, key: &str) -> Val {
        match self {
            Val::Obj(map) => map.get(key).cloned().unwrap_or(Val::Undefined),
            Val::List(items) => match key {
                "length" => Val::Num(items.len() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or(Val::Undefined),
            },
            Val::Str(s) => match key {
                "length" => Val::Num(s.chars().count() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Val::Str(c.to_string()))
                    .unwrap_or(Val::Undefined),
            },
            Val::Error(info) => match key {
                "message" => Val::Str(info.message.clone()),
                "code" | "name" => Val::Str(info.code.clone()),
                "chain" => Val::List(info.chain.iter().cloned().map(Val::Str).collect()),
                "block" => info
                    .block
                    .as_ref()
                    .and_then(|b| serde_json::to_value(b).ok())
                    .map(|j| Val::from_json(&j))
                    .unwrap_or(Val::Undefined),
                _ => Val::Undefined,
            },
            _ => Val::Undefined,
        }
    }

    pub fn from_json(value: &JsonValue) -> Val {
        match value {
            JsonValue::Null => Val::Null,
            JsonValue::Bool(b) => Val::Bool(*b),
            JsonValue::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Val::Str(s.clone()),
            JsonValue::Array(items) => Val::List(items.iter().map(Val::from_json).collect()),
            JsonValue::Object(map) => Val::Obj(
                map.iter()
                    .map(|(k, v)| (k.clone(), Val::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON form. Undefined and non-finite numbers become null; whole numbers
    /// serialize without a fraction.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Val::Undefined | Val::Null => JsonValue::Null,
            Val::Bool(b) => JsonValue::Bool(*b),
            Val::Num(n) => number_to_json(*n),
            Val::Str(s) => JsonValue::String(s.clone()),
            Val::List(items) => JsonValue::Array(items.iter().map(Val::to_json).collect()),
            Val::Obj(map) => JsonValue::Object(
                map.iter()
                    .filter(|(_, v)| !matches!(v, Val::Undefined))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Val::Error(info) => serde_json::json!({
                "code": info.code,
                "message": info.message,
                "chain": info.chain,
            }),
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if !n.is_finite() {
        return JsonValue::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return JsonValue::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Whole numbers print without a fraction; NaN and infinities by name.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Text to number. Blank text is 0; anything that is not plain decimal
/// notation is NaN.
pub fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let plain = t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !plain {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_conversion() {
        assert_eq!(Val::str("5").to_number(), 5.0);
        assert_eq!(Val::str(" 2.5 ").to_number(), 2.5);
        assert_eq!(Val::str("").to_number(), 0.0);
        assert!(Val::str("abc").to_number().is_nan());
        assert!(Val::str("inf").to_number().is_nan());
        assert_eq!(Val::Bool(true).to_number(), 1.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Val::Num(5.0).to_display(), "5");
        assert_eq!(Val::Num(-0.5).to_display(), "-0.5");
        assert_eq!(Val::Num(f64::NAN).to_display(), "NaN");
        assert_eq!(
            Val::List(vec![Val::Num(1.0), Val::Null, Val::str("a")]).to_display(),
            "1,,a"
        );
        let obj = Val::from_json(&json!({"a": 1}));
        assert_eq!(obj.to_display(), r#"{"a":1}"#);
    }

    #[test]
    fn test_loose_equality() {
        assert!(Val::Null.loose_eq(&Val::Undefined));
        assert!(!Val::Null.loose_eq(&Val::Num(0.0)));
        assert!(Val::Num(5.0).loose_eq(&Val::str("5")));
        assert!(Val::Bool(true).loose_eq(&Val::Num(1.0)));
        assert!(!Val::Num(f64::NAN).loose_eq(&Val::Num(f64::NAN)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Val::str("").is_truthy());
        assert!(!Val::Num(f64::NAN).is_truthy());
        assert!(Val::empty_obj().is_truthy());
        assert!(Val::List(vec![]).is_truthy());
    }

    #[test]
    fn test_json_integers_and_undefined() {
        let v = Val::Obj(BTreeMap::from([
            ("n".to_string(), Val::Num(3.0)),
            ("f".to_string(), Val::Num(0.25)),
            ("u".to_string(), Val::Undefined),
        ]));
        assert_eq!(v.to_json(), json!({"n": 3, "f": 0.25}));
    }

    #[test]
    fn test_properties() {
        let list = Val::List(vec![Val::str("a"), Val::str("b")]);
        assert_eq!(list.get_property("length"), Val::Num(2.0));
        assert_eq!(list.get_property("1"), Val::str("b"));
        assert_eq!(Val::str("héllo").get_property("length"), Val::Num(5.0));
        assert_eq!(Val::Null.get_property("x"), Val::Undefined);
    }
}
