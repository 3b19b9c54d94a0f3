//! Error types shared across the compiler, runtime and debug adapter.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::types::BlockContext;

/* ===================== Catalog ===================== */

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read catalog path {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid directive descriptor in {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/* ===================== Compiler ===================== */

/// One finding of the flow validator, attributed to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepIssue {
    pub flow: String,
    /// Zero-based step index
    pub step: usize,
    pub rule_id: String,
    pub message: String,
}

impl std::fmt::Display for StepIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} step {} [{}]: {}",
            self.flow,
            self.step + 1,
            self.rule_id,
            self.message
        )
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("flow {flow} is invalid: {}", first_issue(.issues))]
    Invalid { flow: String, issues: Vec<StepIssue> },

    #[error("{flow} step {}: directive {directive} produced no code: {message}", .step + 1)]
    Emit {
        flow: String,
        step: usize,
        directive: String,
        message: String,
    },

    #[error("application has no flow named {0}")]
    MissingFlow(String),

    #[error("cannot access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid document {path}")]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CompileError {
    /// Validation findings, empty for non-validation failures.
    pub fn issues(&self) -> &[StepIssue] {
        match self {
            CompileError::Invalid { issues, .. } => issues,
            _ => &[],
        }
    }
}

fn first_issue(issues: &[StepIssue]) -> String {
    match issues {
        [] => "no details".to_string(),
        [one] => one.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

/* ===================== Runtime ===================== */

/// Failure of a runtime operation, possibly wrapped with the step it ran under.
#[derive(Debug, Clone, Error)]
pub enum OpError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    /// Failure annotated with the step that caused it; the cause stays reachable
    /// through `source()`.
    #[error("{message}")]
    Wrapped {
        message: String,
        block: Box<BlockContext>,
        #[source]
        cause: Box<OpError>,
    },

    /// The step's failure strategy ended the program. Not catchable by the
    /// program itself.
    #[error("flow terminated at {}[line: {}]", .block.flow_alias_name, .block.block_line)]
    Terminated {
        block: Box<BlockContext>,
        #[source]
        cause: Box<OpError>,
    },
}

impl OpError {
    pub fn failed(message: impl Into<String>) -> Self {
        OpError::Failed(message.into())
    }

    pub fn invalid(name: &str, message: impl Into<String>) -> Self {
        OpError::InvalidArgument {
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// Wrap a failure with the step it ran under.
    pub fn wrap(block: &BlockContext, cause: OpError) -> Self {
        OpError::Wrapped {
            message: format!(
                "{}[line: {}] directive {} failed",
                block.flow_alias_name, block.block_line, block.directive_display_name
            ),
            block: Box::new(block.clone()),
            cause: Box::new(cause),
        }
    }

    /// Wrap the last failure once the retry budget is spent.
    pub fn retries_exhausted(block: &BlockContext, cause: OpError) -> Self {
        OpError::Wrapped {
            message: format!(
                "{}[line: {}] directive {} still failing after {} retries",
                block.flow_alias_name,
                block.block_line,
                block.directive_display_name,
                block.retry_count
            ),
            block: Box::new(block.clone()),
            cause: Box::new(cause),
        }
    }

    /// Step context of the outermost wrapper, if any.
    pub fn block(&self) -> Option<&BlockContext> {
        match self {
            OpError::Wrapped { block, .. } | OpError::Terminated { block, .. } => Some(block),
            _ => None,
        }
    }

    /// Messages from this error down to its root cause.
    pub fn chain(&self) -> Vec<String> {
        let mut out = vec![self.to_string()];
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            std::error::Error::source(self);
        while let Some(err) = current {
            out.push(err.to_string());
            current = err.source();
        }
        out
    }

    /// The innermost, unwrapped failure.
    pub fn root_cause(&self) -> &OpError {
        match self {
            OpError::Wrapped { cause, .. } | OpError::Terminated { cause, .. } => {
                cause.root_cause()
            }
            other => other,
        }
    }
}

/// Failure to load or prepare a program, as opposed to a failure inside it.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("cannot read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse program {path}: {message}")]
    Parse {
        path: PathBuf,
        message: String,
        /// 1-based line of the syntax error, when known
        line: Option<usize>,
    },

    #[error("invalid JSON in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("operation path {0} is registered both as an operation and as a namespace")]
    NamespaceConflict(String),

    #[error("sub-flow nesting deeper than {0}")]
    TooDeep(usize),

    #[error(transparent)]
    Debug(#[from] DebugError),
}

/* ===================== Debug ===================== */

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("debug session already started")]
    AlreadyStarted,

    #[error("no debug session is running")]
    NotRunning,

    #[error("program is not paused")]
    NotPaused,

    #[error("failed to spawn runtime {program}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("runtime did not announce a debug endpoint within {0} ms")]
    AttachTimeout(u64),

    #[error("runtime exited before the debugger attached")]
    ExitedEarly,

    #[error("debug channel closed")]
    ChannelClosed,

    #[error("no generated line for flow {flow} step {step}")]
    UnmappedBreakpoint { flow: String, step: usize },

    #[error("debug request {method} failed: {message}")]
    Remote { method: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
