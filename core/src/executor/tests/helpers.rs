//! Test helpers for interpreter tests

use std::sync::{Arc, Mutex};

use crate::executor::{Abrupt, Interpreter, Program, Val};
use crate::runtime::namespace::{op_fn, Namespace, NamespaceBuilder, OpCall};

/// Parse program text; panics on syntax errors.
pub fn program(source: &str) -> Program {
    Program::parse("test.rflow", source).expect("Parse program failed")
}

/// Namespace without instrumentation, so operation errors reach the
/// interpreter unchanged.
pub fn plain(builder: NamespaceBuilder) -> Arc<Namespace> {
    Arc::new(builder.build_with(|_, op| op).expect("Namespace build failed"))
}

/// Operations that record every call: `t.echo` returns its params,
/// `t.fail` always fails.
pub fn recording() -> (NamespaceBuilder, Arc<Mutex<Vec<OpCall>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let echo_calls = Arc::clone(&calls);
    let fail_calls = Arc::clone(&calls);
    let builder = NamespaceBuilder::new()
        .register(
            "t.echo",
            op_fn(move |call: OpCall| {
                let calls = Arc::clone(&echo_calls);
                async move {
                    let params = call.args.first().cloned().unwrap_or(Val::Undefined);
                    calls.lock().unwrap().push(call);
                    Ok(params)
                }
            }),
        )
        .register(
            "t.fail",
            op_fn(move |call: OpCall| {
                let calls = Arc::clone(&fail_calls);
                async move {
                    calls.lock().unwrap().push(call);
                    Err(crate::errors::OpError::failed("boom"))
                }
            }),
        );
    (builder, calls)
}

/// Run `source` against the recording operations.
pub async fn run(source: &str) -> (Interpreter, Result<(), Abrupt>) {
    let (builder, _) = recording();
    let mut interpreter = Interpreter::new(program(source), plain(builder));
    let result = interpreter.run().await;
    (interpreter, result)
}

pub fn local(interpreter: &Interpreter, name: &str) -> Val {
    interpreter
        .locals()
        .get(name)
        .cloned()
        .unwrap_or_else(|| panic!("no local {}", name))
}

/// The error value of a thrown result.
pub fn thrown(result: Result<(), Abrupt>) -> crate::executor::ErrorInfo {
    match result {
        Err(Abrupt::Throw(Val::Error(info))) => info,
        other => panic!("Expected a thrown error, got {:?}", other),
    }
}
