use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use maplit::btreemap;

use super::*;
use crate::catalog::{Catalog, Directive, InputSlot, InputType, OutputSlot};
use crate::compiler::Compiler;
use crate::errors::OpError;
use crate::flow::Flow;
use crate::runtime::events::MemorySink;
use crate::runtime::namespace::{op_fn, OpCall};
use crate::types::FailureStrategy;

/// Fails until it has been called `failures` times, then returns `{ok: true}`.
fn flaky(failures: usize, calls: Arc<AtomicUsize>) -> NamespaceBuilder {
    NamespaceBuilder::new().register(
        "test.flaky",
        op_fn(move |_call: OpCall| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(OpError::failed(format!("attempt {} failed", n + 1)))
                } else {
                    Ok(Val::Obj(btreemap! { "ok".to_string() => Val::Bool(true) }))
                }
            }
        }),
    )
}

fn catalog() -> Catalog {
    let mut catalog = Catalog::builtin();
    catalog.insert(
        Directive::new("test.flaky")
            .with_display_name("Flaky")
            .with_output("ok", OutputSlot::new("ok", "boolean")),
        None,
    );
    catalog
}

fn flaky_step(strategy: FailureStrategy, retries: u32) -> Directive {
    Directive::new("test.flaky")
        .with_display_name("Flaky")
        .with_output("ok", OutputSlot::new("ok", "boolean"))
        .with_failure(strategy, 0.0, retries)
}

fn log_step(message: InputSlot) -> Directive {
    Directive::new("dataProcessing.log").with_input("message", message)
}

fn compile(flow: &Flow, dir: &std::path::Path) -> PathBuf {
    let compiler = Compiler::new(Arc::new(catalog()));
    compiler.compile_flow(flow).unwrap().write_to(dir).unwrap()
}

async fn run(flow: Flow, extra: NamespaceBuilder) -> (RunOutcome, Vec<LogEvent>) {
    let dir = tempfile::tempdir().unwrap();
    let path = compile(&flow, dir.path());
    let sink = Arc::new(MemorySink::new());
    let outcome = Runtime::new(sink.clone())
        .with_operations(extra)
        .run_file(&path)
        .await
        .unwrap();
    (outcome, sink.events())
}

fn infos(events: &[LogEvent]) -> Vec<&LogEvent> {
    events.iter().filter(|e| e.level == LogLevel::Info).collect()
}

#[tokio::test]
async fn test_set_variable_then_log() {
    let flow = Flow::new("main")
        .with_step(
            Directive::new("dataProcessing.setVariable")
                .with_input("value", InputSlot::new(InputType::Number, "5"))
                .with_output("value", OutputSlot::new("count", "number")),
        )
        .with_step(log_step(InputSlot::new(InputType::Variable, "count")));
    let (outcome, events) = run(flow, NamespaceBuilder::new()).await;

    assert_eq!(outcome, RunOutcome::Completed);
    let infos = infos(&events);
    assert_eq!(infos.len(), 1, "events: {:?}", events);
    assert!(infos[0].message.contains('5'));
    let block = infos[0].block_context.as_ref().unwrap();
    assert_eq!(block.block_line, 2);
    assert_eq!(block.directive_name, "dataProcessing.log");
}

#[tokio::test]
async fn test_retry_until_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let flow = Flow::new("main")
        .with_step(flaky_step(FailureStrategy::Retry, 2))
        .with_step(log_step(InputSlot::new(InputType::Variable, "ok")));
    let (outcome, events) = run(flow, flaky(2, Arc::clone(&calls))).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(infos(&events)[0].message, "true");
}

#[tokio::test]
async fn test_retry_budget_exhausted_fails_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let flow = Flow::new("main").with_step(flaky_step(FailureStrategy::Retry, 1));
    let (outcome, events) = run(flow, flaky(5, Arc::clone(&calls))).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.exit_code(), 1);
    match outcome {
        RunOutcome::Failed { block, chain } => {
            assert_eq!(block.directive_display_name, "Flaky");
            assert!(chain[0].contains("still failing after 1 retries"));
            assert!(chain.iter().any(|m| m == "attempt 2 failed"));
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
    assert_eq!(events.last().map(|e| e.level), Some(LogLevel::Fatal));
}

#[tokio::test]
async fn test_ignore_continues_with_empty_result() {
    let calls = Arc::new(AtomicUsize::new(0));
    let flow = Flow::new("main")
        .with_step(flaky_step(FailureStrategy::Ignore, 0))
        .with_step(log_step(InputSlot::new(InputType::String, "after")));
    let (outcome, events) = run(flow, flaky(1, Arc::clone(&calls))).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(events.iter().any(|e| e.level == LogLevel::Warn));
    assert_eq!(infos(&events)[0].message, "after");
}

#[tokio::test]
async fn test_terminate_stops_program() {
    let calls = Arc::new(AtomicUsize::new(0));
    let flow = Flow::new("main")
        .with_alias("Main flow")
        .with_step(flaky_step(FailureStrategy::Terminate, 0))
        .with_step(log_step(InputSlot::new(InputType::String, "unreachable")));
    let (outcome, events) = run(flow, flaky(1, Arc::clone(&calls))).await;

    assert_eq!(outcome.exit_code(), 1);
    match &outcome {
        RunOutcome::Terminated { block, .. } => {
            assert_eq!(block.block_line, 1);
            assert_eq!(block.flow_alias_name, "Main flow");
        }
        other => panic!("Expected Terminated, got {:?}", other),
    }
    assert!(infos(&events).is_empty());
    let fatal: Vec<_> = events.iter().filter(|e| e.level == LogLevel::Fatal).collect();
    assert_eq!(fatal.len(), 1);
}

#[tokio::test]
async fn test_throw_is_caught_by_try() {
    use crate::catalog::builtin::{CATCH, TRY, TRY_END};

    let calls = Arc::new(AtomicUsize::new(0));
    let flow = Flow::new("main")
        .with_step(Directive::new(TRY))
        .with_step(flaky_step(FailureStrategy::Throw, 0))
        .with_step(Directive::new(CATCH))
        .with_step(log_step(InputSlot::new(InputType::String, "recovered")))
        .with_step(Directive::new(TRY_END));
    let (outcome, events) = run(flow, flaky(1, Arc::clone(&calls))).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(infos(&events)[0].message, "recovered");
}

#[tokio::test]
async fn test_uncaught_program_error_is_attributed() {
    let dir = tempfile::tempdir().unwrap();
    let flow = Flow::new("main")
        .with_step(log_step(InputSlot::new(InputType::String, "first")))
        .with_step(log_step(InputSlot::new(InputType::Variable, "undeclared")));
    let path = compile(&flow, dir.path());
    let sink = Arc::new(MemorySink::new());
    let outcome = Runtime::new(sink.clone()).run_file(&path).await.unwrap();

    match outcome {
        RunOutcome::Failed { block, chain } => {
            assert_eq!(block.block_line, 2);
            assert!(chain[0].contains("undeclared is not defined"));
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
    let last = sink.events().pop().unwrap();
    assert_eq!(last.level, LogLevel::Fatal);
    assert_eq!(last.block_context.unwrap().block_line, 2);
}

#[tokio::test]
async fn test_globals_reach_program() {
    let dir = tempfile::tempdir().unwrap();
    let flow = Flow::new("main").with_step(log_step(InputSlot::new(InputType::Variable, "greeting")));
    let path = compile(&flow, dir.path());
    let sink = Arc::new(MemorySink::new());
    let outcome = Runtime::new(sink.clone())
        .with_globals(btreemap! { "greeting".to_string() => Val::str("hello") })
        .run_file(&path)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(infos(&sink.events())[0].message, "hello");
}

#[tokio::test]
async fn test_missing_program_is_runtime_error() {
    let sink = Arc::new(MemorySink::new());
    let result = Runtime::new(sink)
        .run_file(std::path::Path::new("/nonexistent/main.rflow"))
        .await;
    assert!(matches!(result, Err(RuntimeError::Io { .. })));
}
