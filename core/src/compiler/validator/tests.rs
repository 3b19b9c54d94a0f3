use super::*;
use crate::catalog::builtin::*;
use crate::catalog::{InputSlot, InputType, ObjectMode, OutputSlot};
use crate::types::FailureStrategy;

fn catalog() -> Catalog {
    Catalog::builtin()
}

fn cond(key: &str) -> Directive {
    Directive::new(key).with_input(
        "condition",
        InputSlot::new(InputType::Object, "true").with_object_mode(ObjectMode::Expression),
    )
}

fn log() -> Directive {
    Directive::new("dataProcessing.log").with_input("message", InputSlot::new(InputType::String, "hi"))
}

fn errors(flow: &Flow) -> Vec<(usize, &'static str)> {
    Validator::new()
        .validate(flow, &catalog())
        .into_iter()
        .filter(|i| i.is_error())
        .map(|i| (i.step, i.rule_id))
        .collect()
}

#[test]
fn test_valid_nested_constructs() {
    let flow = Flow::new("main")
        .with_step(cond(WHILE))
        .with_step(cond(IF))
        .with_step(Directive::new(BREAK))
        .with_step(Directive::new(ELSE))
        .with_step(Directive::new(CONTINUE))
        .with_step(Directive::new(IF_END))
        .with_step(Directive::new(WHILE_END));
    assert!(errors(&flow).is_empty());
}

#[test]
fn test_crossed_constructs() {
    let flow = Flow::new("main")
        .with_step(cond(IF))
        .with_step(cond(WHILE))
        .with_step(Directive::new(IF_END))
        .with_step(Directive::new(WHILE_END));
    assert_eq!(
        errors(&flow),
        vec![(1, "control-balance"), (3, "control-balance")]
    );
}

#[test]
fn test_stray_markers() {
    let flow = Flow::new("main")
        .with_step(Directive::new(ELSE))
        .with_step(Directive::new(BREAK))
        .with_step(Directive::new(CATCH));
    assert_eq!(errors(&flow).len(), 3);
}

#[test]
fn test_else_ordering() {
    let flow = Flow::new("main")
        .with_step(cond(IF))
        .with_step(Directive::new(ELSE))
        .with_step(cond(ELSE_IF))
        .with_step(Directive::new(ELSE))
        .with_step(Directive::new(IF_END));
    assert_eq!(
        errors(&flow),
        vec![(2, "control-balance"), (3, "control-balance")]
    );
}

#[test]
fn test_try_needs_catch() {
    let flow = Flow::new("main")
        .with_step(Directive::new(TRY))
        .with_step(log())
        .with_step(Directive::new(TRY_END));
    assert_eq!(errors(&flow), vec![(0, "control-balance")]);
}

#[test]
fn test_required_input_uses_template() {
    let flow = Flow::new("main")
        .with_step(Directive::new("dataProcessing.log"))
        .with_step(Directive::new("dataProcessing.log").with_input("message", InputSlot::new(InputType::String, "  ")));
    assert_eq!(
        errors(&flow),
        vec![(0, "required-input"), (1, "required-input")]
    );
}

#[test]
fn test_unknown_and_malformed_keys() {
    let flow = Flow::new("main")
        .with_step(Directive::new("nope.missing"))
        .with_step(Directive::new("bad key!"));
    let found = errors(&flow);
    assert_eq!(found, vec![(0, "unknown-directive"), (1, "unknown-directive")]);
}

#[test]
fn test_unsupported_type_and_output_names() {
    let flow = Flow::new("main")
        .with_step(log().with_input("extra", InputSlot::new(InputType::Unknown("color".into()), "red")))
        .with_step(
            Directive::new("dataProcessing.setVariable")
                .with_input("value", InputSlot::new(InputType::Number, "1"))
                .with_output("value", OutputSlot::new("let", "number")),
        );
    assert_eq!(
        errors(&flow),
        vec![(0, "unsupported-input-type"), (1, "invalid-output-name")]
    );
}

#[test]
fn test_disabled_control_rejected_plain_allowed() {
    let mut disabled_if = cond(IF);
    disabled_if.disabled = true;
    let mut disabled_log = log();
    disabled_log.disabled = true;
    let flow = Flow::new("main")
        .with_step(disabled_log)
        .with_step(disabled_if);
    assert_eq!(errors(&flow), vec![(1, "disabled-control")]);
}

#[test]
fn test_retry_without_budget_is_warning() {
    let flow = Flow::new("main").with_step(log().with_failure(FailureStrategy::Retry, 1.0, 0));
    let issues = Validator::new().validate(&flow, &catalog());
    assert_eq!(issues.len(), 1);
    assert!(!issues[0].is_error());
    assert_eq!(issues[0].rule_id, "retry-without-budget");
}

#[test]
fn test_rules_are_listed() {
    let ids: Vec<_> = Validator::new().rules().map(|(id, _)| id).collect();
    assert!(ids.contains(&"control-balance"));
    assert!(ids.contains(&"required-input"));
}
