//! Error values raised inside running programs.
//!
//! These are program-level errors: they travel as [`Val::Error`] through
//! `try`/`catch` and only become fatal when nothing catches them.

use serde::{Deserialize, Serialize};

use crate::errors::OpError;
use crate::types::BlockContext;

pub const TYPE_ERROR: &str = "TypeError";
pub const REFERENCE_ERROR: &str = "ReferenceError";
pub const RANGE_ERROR: &str = "RangeError";
pub const SYNTAX_ERROR: &str = "SyntaxError";
pub const OPERATION_ERROR: &str = "OperationError";
pub const FLOW_ERROR: &str = "FlowError";

/// Error payload carried by [`Val::Error`](super::types::Val::Error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    /// Causal chain, outermost first; starts with `message`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
    /// Step the failure was attributed to, when it came from an operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockContext>,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: code.to_string(),
            chain: vec![message.clone()],
            message,
            block: None,
        }
    }

    pub fn from_op(err: &OpError) -> Self {
        Self {
            code: OPERATION_ERROR.to_string(),
            message: err.to_string(),
            chain: err.chain(),
            block: err.block().cloned(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
