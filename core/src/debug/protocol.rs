//! Debug wire protocol.
//!
//! One JSON object per line in both directions. Requests carry an `id` and
//! get exactly one response with the same `id`; notifications carry a
//! `method` and no `id`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::executor::{PauseReason, Val};
use crate::types::BlockContext;

/// Written to stdout by a runtime waiting for a debugger.
pub const HANDSHAKE_PREFIX: &str = "Debugger listening on ";

pub const SCOPE_LOCALS: &str = "locals";
pub const SCOPE_GLOBALS: &str = "globals";

pub fn handshake_line(host: &str, port: u16, session: Uuid) -> String {
    format!("{}tcp://{}:{}/{}", HANDSHAKE_PREFIX, host, port, session)
}

/// `host:port` advertised by a handshake line.
pub fn parse_handshake(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(HANDSHAKE_PREFIX)?;
    let rest = rest.strip_prefix("tcp://")?;
    let (addr, _session) = rest.split_once('/')?;
    addr.contains(':').then(|| addr.to_string())
}

/// One line on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub params: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    pub fn request(id: u64, request: &Request) -> Self {
        Self {
            id: Some(id),
            method: Some(request.method().to_string()),
            params: request.params(),
            ..Self::default()
        }
    }

    pub fn response(id: u64, result: Result<JsonValue, String>) -> Self {
        match result {
            Ok(result) => Self {
                id: Some(id),
                result: Some(result),
                ..Self::default()
            },
            Err(error) => Self {
                id: Some(id),
                error: Some(error),
                ..Self::default()
            },
        }
    }

    pub fn notification(notification: &Notification) -> Self {
        let (method, params) = notification.parts();
        Self {
            method: Some(method.to_string()),
            params,
            ..Self::default()
        }
    }

    pub fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }

    pub fn encode(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        line
    }

    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}

/// A generated-program location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    /// 1-based generated line
    pub line: usize,
}

impl Location {
    pub fn new(file: impl AsRef<Path>, line: usize) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    SetBreakpoint(Location),
    RemoveBreakpoint(Location),
    /// Start executing; sent once after the initial breakpoints
    Run,
    Resume,
    StepOver,
    GetProperties { object_id: String },
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Request::SetBreakpoint(_) => "setBreakpoint",
            Request::RemoveBreakpoint(_) => "removeBreakpoint",
            Request::Run => "run",
            Request::Resume => "resume",
            Request::StepOver => "stepOver",
            Request::GetProperties { .. } => "getProperties",
        }
    }

    pub fn params(&self) -> JsonValue {
        match self {
            Request::SetBreakpoint(location) | Request::RemoveBreakpoint(location) => {
                serde_json::to_value(location).unwrap_or(JsonValue::Null)
            }
            Request::GetProperties { object_id } => json!({ "objectId": object_id }),
            Request::Run | Request::Resume | Request::StepOver => JsonValue::Null,
        }
    }

    pub fn parse(method: &str, params: &JsonValue) -> Result<Self, String> {
        let location = || {
            serde_json::from_value::<Location>(params.clone())
                .map_err(|e| format!("invalid params for {}: {}", method, e))
        };
        match method {
            "setBreakpoint" => Ok(Request::SetBreakpoint(location()?)),
            "removeBreakpoint" => Ok(Request::RemoveBreakpoint(location()?)),
            "run" => Ok(Request::Run),
            "resume" => Ok(Request::Resume),
            "stepOver" => Ok(Request::StepOver),
            "getProperties" => params
                .get("objectId")
                .and_then(JsonValue::as_str)
                .map(|id| Request::GetProperties {
                    object_id: id.to_string(),
                })
                .ok_or_else(|| "getProperties requires objectId".to_string()),
            other => Err(format!("unknown method {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paused {
    pub file: PathBuf,
    pub line: usize,
    pub reason: PauseReason,
    /// Object id of the paused scope's locals
    pub scope_id: String,
    pub block: BlockContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Paused(Paused),
    Resumed,
    Exited { code: i32 },
}

impl Notification {
    fn parts(&self) -> (&'static str, JsonValue) {
        match self {
            Notification::Paused(paused) => (
                "paused",
                serde_json::to_value(paused).unwrap_or(JsonValue::Null),
            ),
            Notification::Resumed => ("resumed", JsonValue::Null),
            Notification::Exited { code } => ("exited", json!({ "code": code })),
        }
    }

    pub fn parse(method: &str, params: &JsonValue) -> Option<Self> {
        match method {
            "paused" => serde_json::from_value(params.clone())
                .ok()
                .map(Notification::Paused),
            "resumed" => Some(Notification::Resumed),
            "exited" => Some(Notification::Exited {
                code: params
                    .get("code")
                    .and_then(JsonValue::as_i64)
                    .map(|c| c as i32)
                    .unwrap_or(1),
            }),
            _ => None,
        }
    }
}

/// One entry of a `getProperties` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: JsonValue,
    /// Set for lists and objects, which can be expanded further
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

/// Properties of the value at `object_id` (`locals/order/items/0`) inside
/// the paused scopes.
pub fn properties(object_id: &str, locals: &Val, globals: &Val) -> Result<Vec<Property>, String> {
    let mut segments = object_id.split('/').filter(|s| !s.is_empty());
    let mut value = match segments.next() {
        Some(SCOPE_LOCALS) => locals.clone(),
        Some(SCOPE_GLOBALS) => globals.clone(),
        _ => return Err(format!("unknown object {}", object_id)),
    };
    for segment in segments {
        value = value.get_property(segment);
    }
    let base = object_id.trim_end_matches('/');
    let entries: Vec<(String, Val)> = match value {
        Val::Obj(map) => map.into_iter().collect(),
        Val::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        other => {
            return Err(format!(
                "object {} is a {}, not an object",
                object_id,
                other.type_name()
            ))
        }
    };
    Ok(entries
        .into_iter()
        .map(|(name, value)| Property {
            object_id: matches!(value, Val::Obj(_) | Val::List(_))
                .then(|| format!("{}/{}", base, name)),
            kind: value.type_name().to_string(),
            value: value.to_json(),
            name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn test_handshake() {
        let session = Uuid::new_v4();
        let line = handshake_line("127.0.0.1", 9339, session);
        assert!(line.ends_with(&session.to_string()));
        assert_eq!(parse_handshake(&line).as_deref(), Some("127.0.0.1:9339"));
        assert_eq!(parse_handshake("hello"), None);
    }

    #[test]
    fn test_request_wire_format() {
        let request = Request::SetBreakpoint(Location::new("/b/main.rflow", 4));
        let line = Message::request(7, &request).encode();
        assert_eq!(
            line,
            "{\"id\":7,\"method\":\"setBreakpoint\",\"params\":{\"file\":\"/b/main.rflow\",\"line\":4}}\n"
        );
        let message = Message::decode(&line).unwrap();
        let method = message.method.as_deref().unwrap();
        assert_eq!(Request::parse(method, &message.params).unwrap(), request);

        let run = Message::request(8, &Request::Run).encode();
        assert_eq!(run, "{\"id\":8,\"method\":\"run\"}\n");
    }

    #[test]
    fn test_bad_requests() {
        assert!(Request::parse("setBreakpoint", &json!({"file": "x"})).is_err());
        assert!(Request::parse("getProperties", &JsonValue::Null).is_err());
        assert!(Request::parse("evaluate", &JsonValue::Null).is_err());
    }

    #[test]
    fn test_response_and_notification() {
        let ok = Message::response(3, Ok(json!(true)));
        assert!(ok.is_response());
        let err = Message::decode(&Message::response(4, Err("nope".into())).encode()).unwrap();
        assert_eq!(err.error.as_deref(), Some("nope"));

        let exited = Message::notification(&Notification::Exited { code: 0 });
        assert!(!exited.is_response());
        let parsed = Notification::parse("exited", &exited.params).unwrap();
        assert_eq!(parsed, Notification::Exited { code: 0 });
    }

    #[test]
    fn test_properties_navigation() {
        let locals = Val::Obj(btreemap! {
            "order".to_string() => Val::Obj(btreemap! {
                "items".to_string() => Val::List(vec![Val::str("a"), Val::Num(2.0)]),
            }),
            "n".to_string() => Val::Num(1.0),
        });
        let globals = Val::empty_obj();

        let top = properties("locals", &locals, &globals).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].name, "order");
        assert_eq!(top[1].object_id.as_deref(), Some("locals/order"));
        assert_eq!(top[0].object_id, None);

        let items = properties("locals/order/items", &locals, &globals).unwrap();
        assert_eq!(items[1].kind, "number");
        assert_eq!(items[1].value, json!(2));

        assert!(properties("locals/n", &locals, &globals).is_err());
        assert!(properties("heap/1", &locals, &globals).is_err());
    }
}
