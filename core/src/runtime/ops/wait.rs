use std::time::Duration;

use async_trait::async_trait;

use crate::errors::OpError;
use crate::executor::types::Val;
use crate::runtime::namespace::{OpCall, Operation};

/// `{seconds}`: suspends the flow.
pub struct Sleep;

#[async_trait]
impl Operation for Sleep {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        let seconds = call.number("seconds")?;
        if seconds < 0.0 {
            return Err(OpError::invalid("seconds", "must not be negative"));
        }
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(Val::empty_obj())
    }
}
