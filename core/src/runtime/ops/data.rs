use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::OpError;
use crate::executor::types::Val;
use crate::runtime::context;
use crate::runtime::events::EventSink;
use crate::runtime::namespace::{OpCall, Operation};
use crate::types::{LogEvent, LogLevel};

fn single(key: &str, value: Val) -> Val {
    Val::Obj(BTreeMap::from([(key.to_string(), value)]))
}

/// `{value}` → `{value}`
pub struct SetVariable;

#[async_trait]
impl Operation for SetVariable {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        Ok(single("value", call.param("value")))
    }
}

/// Emits an info (or `level`) event attributed to the ambient step.
pub struct Log {
    sink: Arc<dyn EventSink>,
}

impl Log {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Operation for Log {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        let message = call.param("message").to_display();
        let level = match call.param("level") {
            Val::Str(level) => match level.to_ascii_lowercase().as_str() {
                "debug" => LogLevel::Debug,
                "warn" | "warning" => LogLevel::Warn,
                "error" => LogLevel::Error,
                _ => LogLevel::Info,
            },
            _ => LogLevel::Info,
        };
        self.sink
            .emit(LogEvent::new(level, message, context::current_block()));
        Ok(Val::empty_obj())
    }
}

/// `{left, right}` → `{result}`
pub struct Concat;

#[async_trait]
impl Operation for Concat {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        let text = |name: &str| match call.param(name) {
            Val::Undefined | Val::Null => String::new(),
            other => other.to_display(),
        };
        Ok(single("result", Val::Str(text("left") + &text("right"))))
    }
}

/// `{text}` → `{value}`
pub struct ParseJson;

#[async_trait]
impl Operation for ParseJson {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        let text = call.text("text")?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| OpError::failed(format!("invalid JSON: {}", e)))?;
        Ok(single("value", Val::from_json(&json)))
    }
}

/// `{value}` → `{text}`
pub struct ToJson;

#[async_trait]
impl Operation for ToJson {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        Ok(single("text", Val::Str(call.param("value").to_json().to_string())))
    }
}
