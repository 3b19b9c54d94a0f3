use std::sync::Arc;

use super::*;
use crate::catalog::builtin::*;
use crate::catalog::{InputSlot, InputType, ObjectMode, OutputSlot};
use crate::flow::AppVariable;

fn compiler() -> Compiler {
    Compiler::new(Arc::new(Catalog::builtin()))
}

fn set_var(name: &str, value: &str) -> Directive {
    Directive::new("dataProcessing.setVariable")
        .with_input("value", InputSlot::new(InputType::Number, value))
        .with_output("value", OutputSlot::new(name, "number"))
}

fn log(message: InputSlot) -> Directive {
    Directive::new("dataProcessing.log").with_input("message", message)
}

fn expr(code: &str) -> InputSlot {
    InputSlot::new(InputType::Object, code).with_object_mode(ObjectMode::Expression)
}

fn marker(key: &str) -> Directive {
    Directive::new(key)
}

fn if_step(condition: &str) -> Directive {
    Directive::new(IF).with_input("condition", expr(condition))
}

#[test]
fn test_steps_land_on_fixed_lines() {
    let flow = Flow::new("main")
        .with_alias("Main")
        .with_step(set_var("x", "5"))
        .with_step(log(InputSlot::new(InputType::Variable, "x")));
    let compiled = compiler().compile_flow(&flow).unwrap();
    let lines: Vec<&str> = compiled.source.lines().collect();

    assert_eq!(lines.len(), PREAMBLE_LINES + 2);
    assert_eq!(lines[0], "// robotflow program main");
    assert_eq!(lines[1], "let __block = undefined;");
    assert_eq!(
        lines[step_line(0) - 1],
        "__block = block(1, \"main\", \"Main\", \"dataProcessing.setVariable\", \"Set variable\", \"terminate\", 0, 0); let x; ({ \"value\": x } = robot.dataProcessing.setVariable({\"value\": Number(`5`)}, __block));"
    );
    assert!(lines[step_line(1) - 1].contains("robot.dataProcessing.log({\"message\": x}, __block)"));

    let block = compiled.source_map.block_at(step_line(1)).unwrap();
    assert_eq!(block.block_line, 2);
    assert_eq!(block.directive_display_name, "Log");
}

#[test]
fn test_compilation_is_deterministic() {
    let flow = Flow::new("main")
        .with_step(set_var("a", "1"))
        .with_step(set_var("b", "2"))
        .with_step(log(InputSlot::new(InputType::String, "done")));
    let c = compiler();
    let first = c.compile_flow(&flow).unwrap();
    let second = c.compile_flow(&flow).unwrap();
    assert_eq!(first.source, second.source);
    assert_eq!(first.digest(), second.digest());
    assert_eq!(first.digest(), digest_hex(&first.source));
}

#[test]
fn test_step_settings_reach_block_literal() {
    let step = log(InputSlot::new(InputType::String, "hi"))
        .with_display_name("Say hi")
        .with_failure(FailureStrategy::Retry, 2.5, 3);
    let compiled = compiler()
        .compile_flow(&Flow::new("main").with_step(step))
        .unwrap();
    assert!(compiled
        .source
        .contains("block(1, \"main\", \"main\", \"dataProcessing.log\", \"Say hi\", \"retry\", 2.5, 3)"));
}

#[test]
fn test_control_flow_markers_emit_braces() {
    let flow = Flow::new("main")
        .with_step(set_var("n", "3"))
        .with_step(if_step("n > 2"))
        .with_step(log(InputSlot::new(InputType::String, "big")))
        .with_step(Directive::new(ELSE_IF).with_input("condition", expr("n > 1")))
        .with_step(log(InputSlot::new(InputType::String, "medium")))
        .with_step(marker(ELSE))
        .with_step(log(InputSlot::new(InputType::String, "small")))
        .with_step(marker(IF_END));
    let compiled = compiler().compile_flow(&flow).unwrap();
    let lines: Vec<&str> = compiled.source.lines().collect();
    assert!(lines[step_line(1) - 1].ends_with("; if (n > 2) {"));
    assert_eq!(lines[step_line(3) - 1], "} else if (n > 1) {");
    assert_eq!(lines[step_line(5) - 1], "} else {");
    assert_eq!(lines[step_line(7) - 1], "}");
}

#[test]
fn test_loops_declare_their_bindings() {
    let flow = Flow::new("main")
        .with_step(
            Directive::new(FOR_EACH)
                .with_input("list", expr("[1, 2]"))
                .with_output("item", OutputSlot::new("row", "any")),
        )
        .with_step(
            Directive::new("dataProcessing.setVariable")
                .with_input("value", InputSlot::new(InputType::Variable, "row"))
                .with_output("value", OutputSlot::new("row", "any")),
        )
        .with_step(marker(BREAK))
        .with_step(marker(FOR_EACH_END));
    let compiled = compiler().compile_flow(&flow).unwrap();
    assert!(compiled.source.contains("for (let row of [1, 2]) {"));
    // already bound by the loop
    assert!(!compiled.source.contains("let row;"));
    assert!(compiled.source.contains("break;"));
}

#[test]
fn test_try_catch_and_invoke_flow() {
    let flow = Flow::new("main")
        .with_step(marker(TRY))
        .with_step(
            Directive::new(INVOKE_FLOW).with_input("flow", InputSlot::new(InputType::String, "child")),
        )
        .with_step(Directive::new(CATCH).with_output("error", OutputSlot::new("err", "error")))
        .with_step(log(InputSlot::new(InputType::Variable, "err")))
        .with_step(marker(TRY_END));
    let compiled = compiler().compile_flow(&flow).unwrap();
    let lines: Vec<&str> = compiled.source.lines().collect();
    assert!(lines[step_line(0) - 1].ends_with("; try {"));
    assert!(lines[step_line(1) - 1].ends_with("; runFlow(`child`, __block);"));
    assert_eq!(lines[step_line(2) - 1], "} catch (err) {");
}

#[test]
fn test_disabled_step_keeps_numbering() {
    let mut skipped = log(InputSlot::new(InputType::String, "skip me"));
    skipped.disabled = true;
    let flow = Flow::new("main")
        .with_step(skipped)
        .with_step(log(InputSlot::new(InputType::String, "kept")));
    let compiled = compiler().compile_flow(&flow).unwrap();
    let lines: Vec<&str> = compiled.source.lines().collect();
    assert_eq!(lines[step_line(0) - 1], "// disabled: Log");
    assert!(lines[step_line(1) - 1].contains("`kept`"));
    assert!(compiled.source_map.block_at(step_line(0)).is_none());
}

#[test]
fn test_invalid_flow_emits_nothing() {
    let flow = Flow::new("main")
        .with_step(if_step("true"))
        .with_step(Directive::new("no.suchThing"));
    let err = compiler().compile_flow(&flow).unwrap_err();
    let issues = err.issues();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].step, 0);
    assert_eq!(issues[0].rule_id, "control-balance");
    assert_eq!(issues[1].rule_id, "unknown-directive");
}

struct Overridden;

impl Emitter for Overridden {
    fn emit(&self, _step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        Ok(format!("{}; overridden();", ctx.block))
    }
}

#[test]
fn test_emitter_priority() {
    let mut catalog = Catalog::builtin();
    catalog.insert(Directive::new("custom.op"), None);
    let mut c = Compiler::new(Arc::new(catalog));

    c.register_override("custom.op", Arc::new(Overridden));
    // built-ins keep their own emitter even when an override is registered
    c.register_override(ELSE, Arc::new(Overridden));

    let flow = Flow::new("main")
        .with_step(Directive::new("custom.op"))
        .with_step(if_step("true"))
        .with_step(marker(ELSE))
        .with_step(marker(IF_END));
    let compiled = c.compile_flow(&flow).unwrap();
    assert!(compiled.source.contains("overridden();"));
    assert!(compiled.source.contains("} else {"));
}

#[test]
fn test_step_snippet_forces_ignore() {
    let flow = Flow::new("main")
        .with_step(set_var("x", "1"))
        .with_step(log(InputSlot::new(InputType::String, "hi")).with_failure(FailureStrategy::Terminate, 0.0, 0));
    let snippet = compiler().compile_step_snippet(&flow, 1).unwrap();
    let lines: Vec<&str> = snippet.source.lines().collect();
    assert_eq!(lines.len(), PREAMBLE_LINES + 1);
    assert!(lines[2].contains("block(2, \"main\", \"main\", \"dataProcessing.log\", \"Log\", \"ignore\", 0, 0)"));
    assert_eq!(
        snippet.source_map.block_at(step_line(0)).map(|b| b.failure_strategy),
        Some(FailureStrategy::Ignore)
    );

    let control = Flow::new("main").with_step(if_step("true"));
    assert!(compiler().compile_step_snippet(&control, 0).is_err());
}

#[test]
fn test_attribute_uses_nearest_preceding_line() {
    let flow = Flow::new("main")
        .with_step(set_var("x", "1"))
        .with_step(set_var("y", "2"));
    let compiled = compiler().compile_flow(&flow).unwrap();
    let map = &compiled.source_map;
    assert_eq!(map.attribute(step_line(1)).block_line, 2);
    assert_eq!(map.attribute(step_line(1) + 5).block_line, 2);
    assert!(map.attribute(1).is_unknown());
}

#[test]
fn test_line_step_inverts_step_line() {
    for index in [0, 1, 17] {
        assert_eq!(line_step(step_line(index)), Some(index));
    }
    assert_eq!(line_step(PREAMBLE_LINES), None);
}

#[test]
fn test_compile_application_writes_build() {
    let dir = tempfile::tempdir().unwrap();
    let app = Application::new("demo")
        .with_variable(AppVariable::new("limit", "number", 3).exposed())
        .with_flow(Flow::new("main").with_step(set_var("x", "5")))
        .with_flow(Flow::new("child").with_step(log(InputSlot::new(InputType::String, "child"))));

    let manifest = compiler().compile_application(&app, dir.path()).unwrap();
    assert_eq!(manifest.programs["main"], "main.rflow");
    assert_eq!(manifest.main_program(dir.path()), Some(dir.path().join("main.rflow")));

    let text = std::fs::read_to_string(dir.path().join("child.rflow")).unwrap();
    assert_eq!(digest_hex(&text), manifest.digests["child"]);

    let map: SourceMap =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("main.rflow.map.json")).unwrap()).unwrap();
    assert_eq!(map.preamble_lines, PREAMBLE_LINES);
    assert_eq!(map.block_at(step_line(0)).unwrap().flow_name, "main");

    let loaded = BuildManifest::load(dir.path()).unwrap();
    assert_eq!(loaded, manifest);
    assert!(dir.path().join(VARIABLES_FILE).exists());
}

#[test]
fn test_compile_application_fails_whole_build() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("build");
    let app = Application::new("demo")
        .with_flow(Flow::new("main").with_step(set_var("x", "5")))
        .with_flow(Flow::new("broken").with_step(marker(IF_END)));
    assert!(compiler().compile_application(&app, &out).is_err());
    assert!(!out.join("main.rflow").exists());
}
