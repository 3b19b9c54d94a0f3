use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

/// What an instrumented call does when the wrapped operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailureStrategy {
    /// Log a fatal event and end the program with a non-zero status.
    #[default]
    Terminate,
    /// Swallow the error and hand back an empty result object.
    Ignore,
    /// Sleep `intervalTime` seconds and call again, up to `retryCount` times.
    Retry,
    /// Propagate the wrapped error to the enclosing construct.
    Throw,
}

impl FailureStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStrategy::Terminate => "terminate",
            FailureStrategy::Ignore => "ignore",
            FailureStrategy::Retry => "retry",
            FailureStrategy::Throw => "throw",
        }
    }

    /// Parse a strategy name. Anything unrecognised falls through to `Retry`,
    /// which is the else-branch of the failure state machine.
    pub fn parse(s: &str) -> Self {
        match s {
            "terminate" => FailureStrategy::Terminate,
            "ignore" => FailureStrategy::Ignore,
            "throw" => FailureStrategy::Throw,
            _ => FailureStrategy::Retry,
        }
    }
}

impl<'de> Deserialize<'de> for FailureStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(FailureStrategy::parse(&raw))
    }
}

impl std::fmt::Display for FailureStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-step record threaded through execution.
///
/// One is built for every compiled statement, immediately before the
/// instrumented call it describes, so a failure inside that call always
/// resolves to exactly one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockContext {
    /// 1-based line inside the flow body (editor step index + 1); -1 when unknown
    pub block_line: i64,
    pub flow_name: String,
    pub flow_alias_name: String,
    pub directive_name: String,
    pub directive_display_name: String,
    #[serde(default)]
    pub failure_strategy: FailureStrategy,
    /// Seconds between retries
    #[serde(default)]
    pub interval_time: f64,
    #[serde(default)]
    pub retry_count: u32,
}

pub const UNKNOWN_FLOW: &str = "unknown flow";

impl BlockContext {
    /// Synthetic context used when a fatal error cannot be attributed to a step.
    pub fn unknown() -> Self {
        Self {
            block_line: -1,
            flow_name: UNKNOWN_FLOW.to_string(),
            flow_alias_name: UNKNOWN_FLOW.to_string(),
            directive_name: String::new(),
            directive_display_name: String::new(),
            failure_strategy: FailureStrategy::Terminate,
            interval_time: 0.0,
            retry_count: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.block_line < 0
    }
}

/// Severity of a structured log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Structured log event delivered out-of-band to the editor / log viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub level: LogLevel,
    /// Milliseconds since the Unix epoch
    pub time: i64,
    pub message: String,
    pub block_context: Option<BlockContext>,
    /// Causal chain of the failure, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error: Vec<String>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>, block: Option<BlockContext>) -> Self {
        Self {
            level,
            time: Utc::now().timestamp_millis(),
            message: message.into(),
            block_context: block,
            error: Vec::new(),
        }
    }

    pub fn with_error(mut self, chain: Vec<String>) -> Self {
        self.error = chain;
        self
    }
}
