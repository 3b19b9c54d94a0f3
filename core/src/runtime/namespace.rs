//! Operation namespace
//!
//! Operations are registered under dotted paths (`dataProcessing.log`) and
//! assembled once into a tree that programs address as `robot.<path>`. The
//! builder decorates every leaf, so all calls a program can make go through
//! the instrumentation wrapper.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{OpError, RuntimeError};
use crate::executor::types::Val;
use crate::types::BlockContext;

use super::events::EventSink;
use super::instrument::Instrumented;

/// One invocation: the arguments as passed by the program, minus the
/// trailing block context, which travels separately.
#[derive(Debug, Clone)]
pub struct OpCall {
    pub path: String,
    pub args: Vec<Val>,
    pub block: BlockContext,
}

impl OpCall {
    pub fn new(path: &str, args: Vec<Val>, block: BlockContext) -> Self {
        Self {
            path: path.to_string(),
            args,
            block,
        }
    }

    /// Named parameter from the first (params object) argument.
    pub fn param(&self, name: &str) -> Val {
        self.args
            .first()
            .map(|params| params.get_property(name))
            .unwrap_or(Val::Undefined)
    }

    /// Parameter as text; missing parameters are an error.
    pub fn text(&self, name: &str) -> Result<String, OpError> {
        match self.param(name) {
            Val::Undefined => Err(OpError::invalid(name, "missing")),
            other => Ok(other.to_display()),
        }
    }

    /// Parameter as a finite number.
    pub fn number(&self, name: &str) -> Result<f64, OpError> {
        let n = self.param(name).to_number();
        if n.is_finite() {
            Ok(n)
        } else {
            Err(OpError::invalid(name, "expected a number"))
        }
    }
}

#[async_trait]
pub trait Operation: Send + Sync {
    async fn call(&self, call: &OpCall) -> Result<Val, OpError>;
}

/// Operation backed by an async closure.
pub struct FnOperation<F>(F);

pub fn op_fn<F, Fut>(f: F) -> FnOperation<F>
where
    F: Fn(OpCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Val, OpError>> + Send,
{
    FnOperation(f)
}

#[async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(OpCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Val, OpError>> + Send,
{
    async fn call(&self, call: &OpCall) -> Result<Val, OpError> {
        (self.0)(call.clone()).await
    }
}

enum Node {
    Leaf(Arc<dyn Operation>),
    Branch(BTreeMap<String, Node>),
}

/// Immutable tree of (decorated) operations.
pub struct Namespace {
    root: BTreeMap<String, Node>,
}

impl Namespace {
    pub fn empty() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }

    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<Arc<dyn Operation>> {
        let (last, parents) = path.split_last()?;
        let mut level = &self.root;
        for segment in parents {
            match level.get(segment.as_ref())? {
                Node::Branch(children) => level = children,
                Node::Leaf(_) => return None,
            }
        }
        match level.get(last.as_ref())? {
            Node::Leaf(op) => Some(Arc::clone(op)),
            Node::Branch(_) => None,
        }
    }

    /// Every registered path, sorted.
    pub fn paths(&self) -> Vec<String> {
        fn walk(prefix: &str, level: &BTreeMap<String, Node>, out: &mut Vec<String>) {
            for (name, node) in level {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", prefix, name)
                };
                match node {
                    Node::Leaf(_) => out.push(path),
                    Node::Branch(children) => walk(&path, children, out),
                }
            }
        }
        let mut out = Vec::new();
        walk("", &self.root, &mut out);
        out
    }
}

#[derive(Default)]
pub struct NamespaceBuilder {
    ops: BTreeMap<String, Arc<dyn Operation>>,
}

impl NamespaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self, path: &str, op: impl Operation + 'static) -> Self {
        self.register_arc(path, Arc::new(op))
    }

    pub fn register_arc(mut self, path: &str, op: Arc<dyn Operation>) -> Self {
        self.ops.insert(path.to_string(), op);
        self
    }

    /// Add every operation of `other`; its entries win on equal paths.
    pub fn merge(mut self, other: NamespaceBuilder) -> Self {
        self.ops.extend(other.ops);
        self
    }

    /// Wrap every leaf with the instrumentation combinator.
    pub fn build(self, sink: Arc<dyn EventSink>) -> Result<Namespace, RuntimeError> {
        self.build_with(|path, op| Arc::new(Instrumented::new(path, op, Arc::clone(&sink))))
    }

    /// Build with a custom decoration applied to every leaf.
    pub fn build_with<F>(self, decorate: F) -> Result<Namespace, RuntimeError>
    where
        F: Fn(&str, Arc<dyn Operation>) -> Arc<dyn Operation>,
    {
        let mut root = BTreeMap::new();
        for (path, op) in self.ops {
            let leaf = decorate(&path, op);
            insert(&mut root, &path, leaf)?;
        }
        Ok(Namespace { root })
    }
}

fn insert(
    root: &mut BTreeMap<String, Node>,
    path: &str,
    op: Arc<dyn Operation>,
) -> Result<(), RuntimeError> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(RuntimeError::NamespaceConflict(path.to_string()));
    };
    let mut level = root;
    for segment in parents {
        let node = level
            .entry(segment.to_string())
            .or_insert_with(|| Node::Branch(BTreeMap::new()));
        level = match node {
            Node::Branch(children) => children,
            Node::Leaf(_) => return Err(RuntimeError::NamespaceConflict(path.to_string())),
        };
    }
    if level.contains_key(*last) {
        return Err(RuntimeError::NamespaceConflict(path.to_string()));
    }
    level.insert(last.to_string(), Node::Leaf(op));
    Ok(())
}
