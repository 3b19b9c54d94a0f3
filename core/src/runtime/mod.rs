//! Program runtime.
//!
//! Assembles the instrumented operation namespace, loads application
//! variables and runs a compiled program to an outcome. Anything that
//! escapes the program is attributed to a step through the source map and
//! reported as a fatal event before the outcome is returned.

pub mod context;
pub mod events;
pub mod instrument;
pub mod namespace;
pub mod ops;
pub mod variables;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::errors::RuntimeError;
use crate::executor::{Abrupt, DebugHook, Interpreter, Program, Val};
use crate::types::{BlockContext, LogEvent, LogLevel};

use events::EventSink;
use namespace::NamespaceBuilder;

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    /// A step under the terminate strategy failed
    Terminated { block: BlockContext, chain: Vec<String> },
    /// An error escaped the program
    Failed { block: BlockContext, chain: Vec<String> },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Terminated { .. } | RunOutcome::Failed { .. } => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

pub struct Runtime {
    sink: Arc<dyn EventSink>,
    operations: NamespaceBuilder,
    globals: BTreeMap<String, Val>,
    hook: Option<Arc<dyn DebugHook>>,
}

impl Runtime {
    /// Runtime with the built-in operations, reporting to `sink`.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            operations: ops::standard_ops(Arc::clone(&sink)),
            sink,
            globals: BTreeMap::new(),
            hook: None,
        }
    }

    /// Add operations; these win over built-ins on equal paths.
    pub fn with_operations(mut self, operations: NamespaceBuilder) -> Self {
        self.operations = self.operations.merge(operations);
        self
    }

    pub fn with_globals(mut self, globals: BTreeMap<String, Val>) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn DebugHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub async fn run_file(self, path: &Path) -> Result<RunOutcome, RuntimeError> {
        let program = Program::load(path)?;
        self.run_program(program).await
    }

    pub async fn run_program(self, program: Program) -> Result<RunOutcome, RuntimeError> {
        let namespace = Arc::new(self.operations.build(Arc::clone(&self.sink))?);
        let name = program.name.clone();
        let mut interpreter = Interpreter::new(program, namespace).with_globals(self.globals);
        if let Some(hook) = self.hook {
            interpreter = interpreter.with_hook(hook);
        }

        info!(flow = %name, "program started");
        let outcome = match interpreter.run().await {
            Ok(()) => RunOutcome::Completed,
            Err(Abrupt::Terminate(err)) => {
                // The instrumented call already reported the fatal event.
                RunOutcome::Terminated {
                    block: err.block().cloned().unwrap_or_else(|| interpreter.attribute()),
                    chain: err.chain(),
                }
            }
            Err(Abrupt::Throw(value)) => {
                let (block, chain) = match value {
                    Val::Error(info) => (
                        info.block.clone().unwrap_or_else(BlockContext::unknown),
                        if info.chain.is_empty() {
                            vec![info.to_string()]
                        } else {
                            info.chain.clone()
                        },
                    ),
                    other => (interpreter.attribute(), vec![other.to_display()]),
                };
                let message = format!("uncaught error: {}", chain.first().map(String::as_str).unwrap_or(""));
                self.sink.emit(
                    LogEvent::new(LogLevel::Fatal, message, Some(block.clone()))
                        .with_error(chain.clone()),
                );
                RunOutcome::Failed { block, chain }
            }
        };

        match &outcome {
            RunOutcome::Completed => info!(flow = %name, "program completed"),
            RunOutcome::Terminated { block, .. } | RunOutcome::Failed { block, .. } => error!(
                flow = %name,
                step_flow = %block.flow_name,
                line = block.block_line,
                "program failed"
            ),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests;
