//! Application variables.
//!
//! `variables.json` in the build directory holds the values the compiler
//! assigned. Launch overrides only reach variables flagged `exposed`; the
//! rest keep their compiled values.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::errors::RuntimeError;
use crate::executor::types::values::parse_number;
use crate::executor::Val;
use crate::flow::AppVariable;

#[derive(Debug, Clone, Default)]
pub struct Variables {
    vars: Vec<AppVariable>,
}

impl Variables {
    pub fn new(vars: Vec<AppVariable>) -> Self {
        Self { vars }
    }

    /// Load `path`; a missing file means no variables.
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let vars = serde_json::from_str(&text).map_err(|source| RuntimeError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { vars })
    }

    /// Apply `{name: value}` overrides. Returns how many were applied.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, JsonValue>) -> usize {
        let mut applied = 0;
        for (name, value) in overrides {
            match self.vars.iter_mut().find(|v| &v.name == name) {
                Some(var) if var.exposed => {
                    var.value = coerce(&var.kind, value.clone());
                    applied += 1;
                }
                Some(_) => debug!(variable = %name, "skipping override of unexposed variable"),
                None => debug!(variable = %name, "skipping override of unknown variable"),
            }
        }
        applied
    }

    pub fn get(&self, name: &str) -> Option<&AppVariable> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Interpreter globals, one per variable.
    pub fn to_globals(&self) -> BTreeMap<String, Val> {
        self.vars
            .iter()
            .map(|v| (v.name.clone(), Val::from_json(&v.value)))
            .collect()
    }
}

/// Text overrides take the variable's declared type.
fn coerce(kind: &str, value: JsonValue) -> JsonValue {
    let JsonValue::String(text) = &value else {
        return value;
    };
    match kind {
        "number" => {
            let n = parse_number(text);
            serde_json::Number::from_f64(n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null)
        }
        "boolean" => JsonValue::Bool(text.trim().eq_ignore_ascii_case("true")),
        _ => value,
    }
}

/// Parse a `name=value` launch argument. The value is read as JSON when it
/// parses, else taken as text.
pub fn parse_override(arg: &str) -> Result<(String, JsonValue), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", arg));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()));
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use serde_json::json;

    fn sample() -> Variables {
        Variables::new(vec![
            AppVariable::new("url", "string", "http://a").exposed(),
            AppVariable::new("retries", "number", 3).exposed(),
            AppVariable::new("secret", "string", "compiled"),
        ])
    }

    #[test]
    fn test_only_exposed_variables_change() {
        let mut vars = sample();
        let applied = vars.apply_overrides(&btreemap! {
            "url".to_string() => json!("http://b"),
            "secret".to_string() => json!("leaked"),
            "ghost".to_string() => json!(1),
        });
        assert_eq!(applied, 1);
        assert_eq!(vars.get("url").unwrap().value, json!("http://b"));
        assert_eq!(vars.get("secret").unwrap().value, json!("compiled"));
        assert!(vars.get("ghost").is_none());
    }

    #[test]
    fn test_text_override_takes_declared_type() {
        let mut vars = sample();
        vars.apply_overrides(&btreemap! { "retries".to_string() => json!("5") });
        assert_eq!(vars.to_globals()["retries"], Val::Num(5.0));
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(parse_override("n=5").unwrap(), ("n".to_string(), json!(5)));
        assert_eq!(parse_override("s=hello").unwrap(), ("s".to_string(), json!("hello")));
        assert_eq!(parse_override("e=").unwrap(), ("e".to_string(), json!("")));
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=1").is_err());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = Variables::load(&dir.path().join("variables.json")).unwrap();
        assert!(vars.to_globals().is_empty());
    }
}
