//! Program interpreter.
//!
//! Walks the parsed program statement by statement. Operation calls are
//! awaited in place, so a program runs as one task; sub-flows started with
//! `runFlow` run on the same interpreter with their own variables.
//!
//! Before each statement on a new line the interpreter asks the attached
//! [`DebugHook`] whether to pause, which is how breakpoints and stepping are
//! implemented without the interpreter knowing about the debug protocol.

pub mod builtins;
pub mod errors;
pub mod expressions;
pub mod program;
pub mod statements;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compiler::program_file_name;
use crate::errors::{OpError, RuntimeError};
use crate::runtime::namespace::Namespace;
use crate::types::BlockContext;

pub use errors::ErrorInfo;
pub use program::Program;
pub use types::{Expr, Stmt, Val};

/// Deepest `runFlow` nesting allowed. Each level polls through nested
/// boxed futures, so this must stay within a default 2 MiB thread stack.
pub const MAX_FLOW_DEPTH: usize = 16;

/// Non-local exit out of a statement.
#[derive(Debug, Clone)]
pub enum Abrupt {
    /// A program-level error; `try`/`catch` can handle it
    Throw(Val),
    /// An operation failed under the terminate strategy; ends the program
    Terminate(OpError),
}

/// How a statement completed normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Normal,
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    Breakpoint,
    Step,
}

/// Snapshot handed to the debug hook while paused.
#[derive(Debug, Clone)]
pub struct PauseInfo {
    pub file: PathBuf,
    /// 1-based generated line
    pub line: usize,
    pub reason: PauseReason,
    pub block: BlockContext,
    pub locals: Val,
    pub globals: Val,
}

#[async_trait]
pub trait DebugHook: Send + Sync {
    /// Whether to pause before the statement starting at `file:line`.
    fn check(&self, file: &Path, line: usize) -> Option<PauseReason>;

    /// Called while paused; the program resumes when this returns.
    async fn pause(&self, info: PauseInfo);
}

pub struct Interpreter {
    namespace: Arc<Namespace>,
    program: Arc<Program>,
    globals: BTreeMap<String, Val>,
    locals: BTreeMap<String, Val>,
    loaded: HashMap<PathBuf, Arc<Program>>,
    depth: usize,
    /// Line of the statement currently running
    line: usize,
    last_hooked: Option<(PathBuf, usize)>,
    hook: Option<Arc<dyn DebugHook>>,
}

impl Interpreter {
    pub fn new(program: Program, namespace: Arc<Namespace>) -> Self {
        let program = Arc::new(program);
        let mut loaded = HashMap::new();
        loaded.insert(program.path.clone(), Arc::clone(&program));
        Self {
            namespace,
            program,
            globals: BTreeMap::new(),
            locals: BTreeMap::new(),
            loaded,
            depth: 0,
            line: 0,
            last_hooked: None,
            hook: None,
        }
    }

    /// Application variables, visible to every flow.
    pub fn with_globals(mut self, globals: BTreeMap<String, Val>) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn DebugHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Run the program to completion.
    pub async fn run(&mut self) -> Result<(), Abrupt> {
        debug!(program = %self.program.path.display(), "running program");
        self.run_body().await
    }

    pub(crate) async fn run_body(&mut self) -> Result<(), Abrupt> {
        let program = Arc::clone(&self.program);
        for stmt in &program.body {
            // Stray break/continue at the top level just ends the statement.
            self.exec_stmt(stmt).await?;
        }
        Ok(())
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn locals(&self) -> &BTreeMap<String, Val> {
        &self.locals
    }

    pub fn globals(&self) -> &BTreeMap<String, Val> {
        &self.globals
    }

    /// Block context for the statement currently running.
    pub fn attribute(&self) -> BlockContext {
        self.program
            .source_map
            .as_ref()
            .map(|map| map.attribute(self.line))
            .unwrap_or_else(BlockContext::unknown)
    }

    /// A thrown program error attributed to the current statement.
    pub(crate) fn throw(&self, code: &str, message: impl Into<String>) -> Abrupt {
        self.throw_info(ErrorInfo::new(code, message))
    }

    pub(crate) fn throw_info(&self, mut info: ErrorInfo) -> Abrupt {
        if info.block.is_none() {
            info.block = Some(self.attribute());
        }
        Abrupt::Throw(Val::Error(info))
    }

    /// Track the running line and give the debug hook a chance to pause.
    pub(crate) async fn before_stmt(&mut self, stmt: &Stmt) {
        if matches!(stmt, Stmt::Block { .. } | Stmt::Empty { .. }) {
            return;
        }
        let line = stmt.span().line();
        self.line = line;

        let Some(hook) = self.hook.clone() else {
            return;
        };
        let file = &self.program.path;
        if let Some((last_file, last_line)) = &self.last_hooked {
            if last_file == file && *last_line == line {
                return;
            }
        }
        self.last_hooked = Some((file.clone(), line));

        if let Some(reason) = hook.check(file, line) {
            let info = PauseInfo {
                file: file.clone(),
                line,
                reason,
                block: self.attribute(),
                locals: visible(&self.locals),
                globals: visible(&self.globals),
            };
            hook.pause(info).await;
        }
    }

    /// Let the next statement pause again even if it is on the same line,
    /// as when a loop comes back around.
    pub(crate) fn rearm_hook(&mut self) {
        self.last_hooked = None;
    }

    /// Load a sibling program, once per run.
    pub(crate) fn load_sibling(&mut self, name: &str) -> Result<Arc<Program>, RuntimeError> {
        let path = self.program.dir().join(program_file_name(name));
        let key = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if let Some(program) = self.loaded.get(&key) {
            return Ok(Arc::clone(program));
        }
        let program = Arc::new(Program::load(&path)?);
        self.loaded.insert(program.path.clone(), Arc::clone(&program));
        Ok(program)
    }

    /// Run `program` as a sub-flow with fresh locals, then restore the caller.
    pub(crate) async fn run_subflow(&mut self, program: Arc<Program>) -> Result<(), Abrupt> {
        if self.depth >= MAX_FLOW_DEPTH {
            return Err(self.throw(
                errors::RANGE_ERROR,
                RuntimeError::TooDeep(MAX_FLOW_DEPTH).to_string(),
            ));
        }
        debug!(flow = %program.name, depth = self.depth + 1, "entering sub-flow");
        let saved_locals = std::mem::take(&mut self.locals);
        let saved_program = std::mem::replace(&mut self.program, program);
        let saved_line = self.line;
        self.depth += 1;
        self.rearm_hook();

        let result = self.run_body().await;

        self.depth -= 1;
        self.locals = saved_locals;
        self.program = saved_program;
        self.line = saved_line;
        self.rearm_hook();
        result
    }
}

/// Variables a user sees: compiler-internal names are hidden.
fn visible(vars: &BTreeMap<String, Val>) -> Val {
    Val::Obj(
        vars.iter()
            .filter(|(name, _)| !name.starts_with("__"))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests;
