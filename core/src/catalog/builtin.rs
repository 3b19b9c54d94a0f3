//! Built-in directives: control flow markers with their emitters, and the
//! templates of the operations every runtime provides.

use std::sync::Arc;

use crate::catalog::{Catalog, Directive, InputSlot, InputType, ObjectMode, OutputSlot};
use crate::compiler::coder::code_value;
use crate::compiler::emit::{code_slot, EmitContext, Emitter, BLOCK_SLOT};
use crate::errors::CompileError;

pub const IF: &str = "flowControl.if";
pub const ELSE_IF: &str = "flowControl.elseIf";
pub const ELSE: &str = "flowControl.else";
pub const IF_END: &str = "flowControl.if.end";
pub const WHILE: &str = "flowControl.while";
pub const WHILE_END: &str = "flowControl.while.end";
pub const FOR_EACH: &str = "flowControl.forEach";
pub const FOR_EACH_END: &str = "flowControl.forEach.end";
pub const FOR_COUNT: &str = "flowControl.forCount";
pub const FOR_COUNT_END: &str = "flowControl.forCount.end";
pub const BREAK: &str = "flowControl.break";
pub const CONTINUE: &str = "flowControl.continue";
pub const TRY: &str = "flowControl.try";
pub const CATCH: &str = "flowControl.catch";
pub const TRY_END: &str = "flowControl.try.end";
pub const INVOKE_FLOW: &str = "flowControl.invokeFlow";

pub fn register_all(catalog: &mut Catalog) {
    register_control(catalog);
    register_operations(catalog);
}

/* ===================== Control Emitters ===================== */

/// `if (cond) {` / `while (cond) {`, preceded by the block assignment.
struct ConditionOpen(&'static str);

impl Emitter for ConditionOpen {
    fn emit(&self, step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        let condition = required_code(step, "condition", ctx)?;
        Ok(format!("{}; {} ({}) {{", ctx.block, self.0, condition))
    }
}

struct ElseIf;

impl Emitter for ElseIf {
    fn emit(&self, step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        let condition = required_code(step, "condition", ctx)?;
        Ok(format!("}} else if ({}) {{", condition))
    }
}

/// Fixed text, optionally after the block assignment.
struct Fixed {
    text: &'static str,
    with_block: bool,
}

impl Emitter for Fixed {
    fn emit(&self, _step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        if self.with_block {
            Ok(format!("{}; {}", ctx.block, self.text))
        } else {
            Ok(self.text.to_string())
        }
    }
}

struct ForEach;

impl Emitter for ForEach {
    fn emit(&self, step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        let list = required_code(step, "list", ctx)?;
        let item = output_name(step, "item", "item");
        ctx.declare(&item);
        Ok(format!("{}; for (let {} of {}) {{", ctx.block, item, list))
    }
}

struct ForCount;

impl Emitter for ForCount {
    fn emit(&self, step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        let count = required_code(step, "count", ctx)?;
        let index = output_name(step, "index", "index");
        ctx.declare(&index);
        Ok(format!(
            "{}; for (let {} of range(0, {})) {{",
            ctx.block, index, count
        ))
    }
}

struct Catch;

impl Emitter for Catch {
    fn emit(&self, step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        let name = output_name(step, "error", "error");
        ctx.declare(&name);
        Ok(format!("}} catch ({}) {{", name))
    }
}

struct InvokeFlow;

impl Emitter for InvokeFlow {
    fn emit(&self, step: &Directive, ctx: &mut EmitContext<'_>) -> Result<String, CompileError> {
        let flow = required_code(step, "flow", ctx)?;
        Ok(format!("{}; runFlow({}, {});", ctx.block, flow, BLOCK_SLOT))
    }
}

fn required_code(
    step: &Directive,
    input: &str,
    ctx: &EmitContext<'_>,
) -> Result<String, CompileError> {
    match step.inputs.get(input) {
        Some(slot) if !code_value(slot).trim().is_empty() => code_slot(step, input, slot, ctx),
        _ => Err(ctx.error(step, format!("missing {} input", input))),
    }
}

fn output_name(step: &Directive, key: &str, fallback: &str) -> String {
    step.outputs
        .get(key)
        .map(|o| o.name.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/* ===================== Registration ===================== */

fn control(key: &str, display: &str, construct: &str) -> Directive {
    let mut d = Directive::new(key).with_display_name(display);
    d.construct = Some(construct.to_string());
    d
}

fn opener(key: &str, display: &str, is_loop: bool) -> Directive {
    let mut d = control(key, display, key);
    d.is_control = true;
    d.is_loop = is_loop;
    d
}

fn middle(key: &str, display: &str, construct: &str) -> Directive {
    let mut d = control(key, display, construct);
    d.is_else = true;
    d
}

fn closer(key: &str, display: &str, construct: &str) -> Directive {
    let mut d = control(key, display, construct);
    d.is_control_end = true;
    d
}

fn expression_input(label: &str) -> InputSlot {
    InputSlot::new(InputType::Object, "")
        .with_object_mode(ObjectMode::Expression)
        .required(label)
}

fn register_control(catalog: &mut Catalog) {
    catalog.insert(
        opener(IF, "If", false).with_input("condition", expression_input("Condition")),
        Some(Arc::new(ConditionOpen("if"))),
    );
    catalog.insert(
        middle(ELSE_IF, "Else if", IF).with_input("condition", expression_input("Condition")),
        Some(Arc::new(ElseIf)),
    );
    catalog.insert(
        middle(ELSE, "Else", IF),
        Some(Arc::new(Fixed {
            text: "} else {",
            with_block: false,
        })),
    );
    catalog.insert(
        closer(IF_END, "End if", IF),
        Some(Arc::new(Fixed {
            text: "}",
            with_block: false,
        })),
    );

    catalog.insert(
        opener(WHILE, "While", true).with_input("condition", expression_input("Condition")),
        Some(Arc::new(ConditionOpen("while"))),
    );
    catalog.insert(
        closer(WHILE_END, "End while", WHILE),
        Some(Arc::new(Fixed {
            text: "}",
            with_block: false,
        })),
    );

    catalog.insert(
        opener(FOR_EACH, "For each", true)
            .with_input("list", expression_input("List"))
            .with_output("item", OutputSlot::new("item", "any")),
        Some(Arc::new(ForEach)),
    );
    catalog.insert(
        closer(FOR_EACH_END, "End for each", FOR_EACH),
        Some(Arc::new(Fixed {
            text: "}",
            with_block: false,
        })),
    );

    catalog.insert(
        opener(FOR_COUNT, "Repeat", true)
            .with_input("count", InputSlot::new(InputType::Number, "").required("Times"))
            .with_output("index", OutputSlot::new("index", "number")),
        Some(Arc::new(ForCount)),
    );
    catalog.insert(
        closer(FOR_COUNT_END, "End repeat", FOR_COUNT),
        Some(Arc::new(Fixed {
            text: "}",
            with_block: false,
        })),
    );

    catalog.insert(
        control(BREAK, "Break", BREAK),
        Some(Arc::new(Fixed {
            text: "break;",
            with_block: true,
        })),
    );
    catalog.insert(
        control(CONTINUE, "Continue", CONTINUE),
        Some(Arc::new(Fixed {
            text: "continue;",
            with_block: true,
        })),
    );

    catalog.insert(
        opener(TRY, "Try", false),
        Some(Arc::new(Fixed {
            text: "try {",
            with_block: true,
        })),
    );
    catalog.insert(
        middle(CATCH, "Catch", TRY).with_output("error", OutputSlot::new("error", "error")),
        Some(Arc::new(Catch)),
    );
    catalog.insert(
        closer(TRY_END, "End try", TRY),
        Some(Arc::new(Fixed {
            text: "}",
            with_block: false,
        })),
    );

    catalog.insert(
        Directive::new(INVOKE_FLOW)
            .with_display_name("Run sub-flow")
            .with_input("flow", InputSlot::new(InputType::String, "").required("Flow")),
        Some(Arc::new(InvokeFlow)),
    );
}

fn operation(key: &str, display: &str) -> Directive {
    Directive::new(key).with_display_name(display)
}

fn register_operations(catalog: &mut Catalog) {
    let templates = [
        operation("dataProcessing.setVariable", "Set variable")
            .with_input(
                "value",
                InputSlot::new(InputType::Object, "")
                    .with_object_mode(ObjectMode::Expression)
                    .required("Value"),
            )
            .with_output("value", OutputSlot::new("", "any")),
        operation("dataProcessing.log", "Log")
            .with_input("message", InputSlot::new(InputType::String, "").required("Message"))
            .with_input("level", InputSlot::new(InputType::String, "info")),
        operation("dataProcessing.concat", "Concatenate text")
            .with_input("left", InputSlot::new(InputType::String, ""))
            .with_input("right", InputSlot::new(InputType::String, ""))
            .with_output("result", OutputSlot::new("", "string")),
        operation("dataProcessing.parseJson", "Parse JSON")
            .with_input("text", InputSlot::new(InputType::String, "").required("Text"))
            .with_output("value", OutputSlot::new("", "any")),
        operation("dataProcessing.toJson", "To JSON")
            .with_input(
                "value",
                InputSlot::new(InputType::Object, "")
                    .with_object_mode(ObjectMode::Expression)
                    .required("Value"),
            )
            .with_output("text", OutputSlot::new("", "string")),
        operation("wait.sleep", "Wait")
            .with_input("seconds", InputSlot::new(InputType::Number, "1").required("Seconds")),
        operation("system.getEnv", "Read environment variable")
            .with_input("name", InputSlot::new(InputType::String, "").required("Name"))
            .with_input("default", InputSlot::new(InputType::String, ""))
            .with_output("value", OutputSlot::new("", "string")),
        operation("system.fail", "Fail")
            .with_input("message", InputSlot::new(InputType::String, "").required("Message")),
    ];
    for template in templates {
        catalog.insert(template, None);
    }
}
