//! Operation calls, builtins and sub-flows

use maplit::btreemap;

use super::helpers::{local, plain, program, recording, run, thrown};
use crate::errors::OpError;
use crate::executor::errors::{FLOW_ERROR, OPERATION_ERROR, RANGE_ERROR, TYPE_ERROR};
use crate::executor::{Abrupt, Interpreter, Program, Val, MAX_FLOW_DEPTH};
use crate::runtime::namespace::{op_fn, NamespaceBuilder, OpCall};
use crate::types::{BlockContext, FailureStrategy};

const BLOCK: &str = r#"block(7, "main", "Main", "t.echo", "Echo", "throw", 0, 0)"#;

#[tokio::test]
async fn test_operation_receives_block_separately() {
    let (builder, calls) = recording();
    let source = format!(
        "let __block = undefined; __block = {}; let out = robot.t.echo({{ \"in\": 1 }}, __block);",
        BLOCK
    );
    let mut vm = Interpreter::new(program(&source), plain(builder));
    vm.run().await.unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path, "t.echo");
    assert_eq!(calls[0].args.len(), 1);
    assert_eq!(calls[0].block.block_line, 7);
    assert_eq!(calls[0].block.directive_display_name, "Echo");
    assert_eq!(calls[0].block.failure_strategy, FailureStrategy::Throw);
    assert_eq!(local(&vm, "out").get_property("in"), Val::Num(1.0));
}

#[tokio::test]
async fn test_operation_without_block_is_attributed_to_current_line() {
    let (builder, calls) = recording();
    let mut vm = Interpreter::new(program("robot.t.echo({});"), plain(builder));
    vm.run().await.unwrap();
    assert!(calls.lock().unwrap()[0].block.is_unknown());
}

#[tokio::test]
async fn test_unknown_operation_is_type_error() {
    let (_, result) = run("robot.t.nothing({});").await;
    let info = thrown(result);
    assert_eq!(info.code, TYPE_ERROR);
    assert_eq!(info.message, "robot.t.nothing is not a function");
}

#[tokio::test]
async fn test_failed_operation_throws_operation_error() {
    let (_, result) = run("robot.t.fail({});").await;
    let info = thrown(result);
    assert_eq!(info.code, OPERATION_ERROR);
    assert_eq!(info.chain, vec!["boom".to_string()]);
}

#[tokio::test]
async fn test_terminated_operation_is_not_catchable() {
    let builder = NamespaceBuilder::new().register(
        "t.stop",
        op_fn(|call: OpCall| async move {
            Err(OpError::Terminated {
                block: Box::new(call.block.clone()),
                cause: Box::new(OpError::failed("fatal")),
            })
        }),
    );
    let source = "let caught = false; try { robot.t.stop({}); } catch (e) { caught = true; }";
    let mut vm = Interpreter::new(program(source), plain(builder));
    let result = vm.run().await;
    assert!(matches!(result, Err(Abrupt::Terminate(OpError::Terminated { .. }))));
    assert_eq!(local(&vm, "caught"), Val::Bool(false));
}

#[tokio::test]
async fn test_builtin_conversions() {
    let source = r#"
        let n = Number(`41`) + 1;
        let s = String(n) + "!";
        let b = String(`TRUE`).toLowerCase() == "true";
        let parsed = JSON.parse('{"k": [1, 2, 3]}');
        let count = parsed.k.length;
        let text = JSON.stringify({ b: 1, a: "x" });
        let keys = Object.keys(parsed);
    "#;
    let (vm, result) = run(source).await;
    result.unwrap();
    assert_eq!(local(&vm, "n"), Val::Num(42.0));
    assert_eq!(local(&vm, "s"), Val::str("42!"));
    assert_eq!(local(&vm, "b"), Val::Bool(true));
    assert_eq!(local(&vm, "count"), Val::Num(3.0));
    assert_eq!(local(&vm, "text"), Val::str(r#"{"a":"x","b":1}"#));
    assert_eq!(local(&vm, "keys"), Val::List(vec![Val::str("k")]));
}

#[tokio::test]
async fn test_unknown_method_is_type_error() {
    let (_, result) = run("let n = 1; n.frobnicate();").await;
    assert_eq!(thrown(result).code, TYPE_ERROR);
    let (_, result) = run("let r = range(0, 'x');").await;
    assert_eq!(thrown(result).code, RANGE_ERROR);
}

#[tokio::test]
async fn test_globals_are_visible_and_assignable() {
    let (builder, _) = recording();
    let globals = btreemap! {
        "greeting".to_string() => Val::str("hi"),
        "count".to_string() => Val::Num(1.0),
    };
    let source = "let msg = greeting + ' there'; count = count + 1;";
    let mut vm = Interpreter::new(program(source), plain(builder)).with_globals(globals);
    vm.run().await.unwrap();
    assert_eq!(local(&vm, "msg"), Val::str("hi there"));
    assert_eq!(vm.globals().get("count"), Some(&Val::Num(2.0)));
    assert!(vm.locals().get("count").is_none());
}

fn write_program(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(format!("{}.rflow", name));
    let text = format!("// robotflow program {}\nlet __block = undefined;\n{}\n", name, body);
    std::fs::write(&path, text).unwrap();
    path
}

#[tokio::test]
async fn test_run_flow_isolates_locals() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_program(
        dir.path(),
        "main",
        "let x = 1; runFlow(\"child\", undefined); let after = x;",
    );
    write_program(dir.path(), "child", "let x = 99; shared = x;");

    let (builder, _) = recording();
    let globals = btreemap! { "shared".to_string() => Val::Null };
    let program = Program::load(&main).unwrap();
    assert_eq!(program.name, "main");
    let mut vm = Interpreter::new(program, plain(builder)).with_globals(globals);
    vm.run().await.unwrap();

    assert_eq!(local(&vm, "after"), Val::Num(1.0));
    assert_eq!(vm.globals().get("shared"), Some(&Val::Num(99.0)));
    assert_eq!(vm.program().name, "main");
}

#[tokio::test]
async fn test_run_flow_missing_is_catchable() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_program(
        dir.path(),
        "main",
        "let code; try { runFlow(\"ghost\", undefined); } catch (e) { code = e.code; }",
    );
    let (builder, _) = recording();
    let mut vm = Interpreter::new(Program::load(&main).unwrap(), plain(builder));
    vm.run().await.unwrap();
    assert_eq!(local(&vm, "code"), Val::str(FLOW_ERROR));
}

#[tokio::test]
async fn test_run_flow_depth_limit() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_program(dir.path(), "main", "runFlow(\"main\", undefined);");
    let (builder, _) = recording();
    let mut vm = Interpreter::new(Program::load(&main).unwrap(), plain(builder));
    let info = thrown(vm.run().await);
    assert_eq!(info.code, RANGE_ERROR);
    assert!(info.message.contains(&MAX_FLOW_DEPTH.to_string()));
}

#[tokio::test]
async fn test_thrown_errors_use_source_map_attribution() {
    use crate::compiler::SourceMap;

    let mut block = BlockContext::unknown();
    block.block_line = 3;
    block.flow_name = "main".into();
    block.directive_display_name = "Compute".into();
    let map = SourceMap {
        file: "main.rflow".into(),
        flow: "main".into(),
        preamble_lines: 2,
        digest: String::new(),
        lines: btreemap! { 3 => block.clone() },
    };
    let source = "// robotflow program main\nlet __block = undefined;\nlet y = missing;\n";
    let (builder, _) = recording();
    let program = program(source).with_source_map(map);
    let mut vm = Interpreter::new(program, plain(builder));
    let info = thrown(vm.run().await);
    assert_eq!(info.block, Some(block));
}
