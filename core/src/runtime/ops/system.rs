use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::OpError;
use crate::executor::types::Val;
use crate::runtime::namespace::{OpCall, Operation};

/// `{name, default}` → `{value}`
pub struct GetEnv;

#[async_trait]
impl Operation for GetEnv {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        let name = call.text("name")?;
        let value = match std::env::var(&name) {
            Ok(value) => Val::Str(value),
            Err(_) => match call.param("default") {
                Val::Undefined => Val::Undefined,
                other => Val::Str(other.to_display()),
            },
        };
        Ok(Val::Obj(BTreeMap::from([("value".to_string(), value)])))
    }
}

/// `{message}`: always fails with `message`.
pub struct Fail;

#[async_trait]
impl Operation for Fail {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        let message = call
            .text("message")
            .unwrap_or_else(|_| "failed on purpose".to_string());
        Err(OpError::failed(message))
    }
}
