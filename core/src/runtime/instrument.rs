//! Instrumentation combinator.
//!
//! `Instrumented` wraps an operation with the failure policy of the step that
//! calls it. The step's block context arrives with every call; the wrapper
//! scopes it as the ambient context, reports the step, and on failure
//! applies the step's strategy:
//!
//! - `terminate`: fatal event, then `OpError::Terminated`, which the program
//!   cannot catch
//! - `throw`: the wrapped error propagates to the enclosing `try`
//! - `ignore`: warning event, the call yields an empty object
//! - `retry` (and anything unrecognised): sleep `intervalTime` seconds and
//!   call again, until the attempt count exceeds `retryCount`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::OpError;
use crate::executor::types::Val;
use crate::types::{FailureStrategy, LogEvent, LogLevel};

use super::context;
use super::events::EventSink;
use super::namespace::{OpCall, Operation};

pub struct Instrumented {
    path: String,
    inner: Arc<dyn Operation>,
    sink: Arc<dyn EventSink>,
}

impl Instrumented {
    pub fn new(path: &str, inner: Arc<dyn Operation>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            path: path.to_string(),
            inner,
            sink,
        }
    }

    async fn invoke(&self, call: &OpCall) -> Result<Val, OpError> {
        let block = &call.block;
        // Attempts are counted per call, never shared between calls.
        let mut retries = 0u32;

        loop {
            self.sink.emit(LogEvent::new(
                LogLevel::Debug,
                format!("run directive {}", block.directive_display_name),
                Some(block.clone()),
            ));
            debug!(op = %self.path, line = block.block_line, attempt = retries + 1, "calling operation");

            let err = match self.inner.call(call).await {
                Ok(value) => return Ok(value),
                // Already fatal further down; pass through untouched.
                Err(err @ OpError::Terminated { .. }) => return Err(err),
                Err(err) => err,
            };

            let wrapped = OpError::wrap(block, err);
            self.sink.emit(
                LogEvent::new(LogLevel::Error, wrapped.to_string(), Some(block.clone()))
                    .with_error(wrapped.chain()),
            );

            match block.failure_strategy {
                FailureStrategy::Terminate => {
                    self.sink.emit(
                        LogEvent::new(
                            LogLevel::Fatal,
                            format!("flow terminated: {}", wrapped),
                            Some(block.clone()),
                        )
                        .with_error(wrapped.chain()),
                    );
                    return Err(OpError::Terminated {
                        block: Box::new(block.clone()),
                        cause: Box::new(wrapped),
                    });
                }
                FailureStrategy::Throw => return Err(wrapped),
                FailureStrategy::Ignore => {
                    self.sink.emit(LogEvent::new(
                        LogLevel::Warn,
                        format!("ignored failure: {}", wrapped),
                        Some(block.clone()),
                    ));
                    return Ok(Val::empty_obj());
                }
                FailureStrategy::Retry => {
                    retries += 1;
                    if retries > block.retry_count {
                        self.sink.emit(LogEvent::new(
                            LogLevel::Error,
                            "retry limit reached",
                            Some(block.clone()),
                        ));
                        return Err(OpError::retries_exhausted(block, wrapped));
                    }
                    self.sink.emit(LogEvent::new(
                        LogLevel::Warn,
                        format!(
                            "retry {} of {} in {} seconds",
                            retries, block.retry_count, block.interval_time
                        ),
                        Some(block.clone()),
                    ));
                    warn!(op = %self.path, retry = retries, "operation failed, retrying");
                    tokio::time::sleep(interval(block.interval_time)).await;
                }
            }
        }
    }
}

fn interval(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}

#[async_trait]
impl Operation for Instrumented {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        context::scope(call.block.clone(), self.invoke(call)).await
    }
}
