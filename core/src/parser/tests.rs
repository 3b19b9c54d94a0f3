use super::*;

fn parse_one(source: &str) -> Stmt {
    let program = parse_program(source).unwrap();
    assert_eq!(program.body.len(), 1, "expected one statement in {:?}", source);
    program.body.into_iter().next().unwrap()
}

#[test]
fn test_generated_step_line() {
    let source = "// robotflow program main\nlet __block = undefined;\n__block = block(1, \"main\", \"Main\", \"dataProcessing.setVariable\", \"Set\", \"terminate\", 0, 0); let x; ({ \"value\": x } = robot.dataProcessing.setVariable({\"value\": Number(`5`)}, __block));\n";
    let program = parse_program(source).unwrap();
    assert_eq!(program.body.len(), 4);
    // all step statements share line 3
    for stmt in &program.body[1..] {
        assert_eq!(stmt.span().line(), 3);
    }
    match &program.body[3] {
        Stmt::Destructure { bindings, value, .. } => {
            assert_eq!(bindings[0].key, "value");
            assert_eq!(bindings[0].name, "x");
            match value {
                Expr::Call { callee, args, .. } => {
                    assert_eq!(
                        callee.member_path().unwrap(),
                        vec!["robot", "dataProcessing", "setVariable"]
                    );
                    assert_eq!(args.len(), 2);
                }
                other => panic!("expected call, got {:?}", other),
            }
        }
        other => panic!("expected destructure, got {:?}", other),
    }
}

#[test]
fn test_let_prefix_is_not_a_declaration() {
    match parse_one("letter = 5;") {
        Stmt::Assign { var, .. } => assert_eq!(var, "letter"),
        other => panic!("expected assignment, got {:?}", other),
    }
    match parse_one("let a, b = 2;") {
        Stmt::Declare { declarators, .. } => {
            assert_eq!(declarators.len(), 2);
            assert!(declarators[0].init.is_none());
            assert!(declarators[1].init.is_some());
        }
        other => panic!("expected declaration, got {:?}", other),
    }
}

#[test]
fn test_equality_is_not_assignment() {
    match parse_one("x == 1;") {
        Stmt::Expr {
            expr: Expr::BinaryOp { op, .. },
            ..
        } => assert_eq!(op, BinaryOp::Eq),
        other => panic!("expected comparison, got {:?}", other),
    }
}

#[test]
fn test_precedence() {
    match parse_expression("1 + 2 * 3 < 10 && !done").unwrap() {
        Expr::BinaryOp {
            op: BinaryOp::And,
            left,
            right,
            ..
        } => {
            assert!(matches!(*left, Expr::BinaryOp { op: BinaryOp::Lt, .. }));
            assert!(matches!(*right, Expr::Unary { op: UnaryOp::Not, .. }));
        }
        other => panic!("unexpected tree {:?}", other),
    }
}

#[test]
fn test_string_escapes() {
    match parse_expression(r#"`a\`b\nc\\d`"#).unwrap() {
        Expr::LitStr { v, .. } => assert_eq!(v, "a`b\nc\\d"),
        other => panic!("expected string, got {:?}", other),
    }
    match parse_expression(r#""say \"hi\" é""#).unwrap() {
        Expr::LitStr { v, .. } => assert_eq!(v, "say \"hi\" é"),
        other => panic!("expected string, got {:?}", other),
    }
    assert_eq!(unescape(r"😀").unwrap(), "😀");
}

#[test]
fn test_control_statements() {
    let source = "if (a) {\n x = 1;\n} else if (b) {\n x = 2;\n} else {\n x = 3;\n}\nwhile (true) {\n break;\n}\nfor (let item of [1, 2]) {\n continue;\n}\ntry {\n y = 1;\n} catch (err) {\n y = 2;\n}\n";
    let program = parse_program(source).unwrap();
    assert_eq!(program.body.len(), 4);
    match &program.body[0] {
        Stmt::If { else_s: Some(else_s), .. } => {
            assert!(matches!(**else_s, Stmt::If { else_s: Some(_), .. }))
        }
        other => panic!("expected if/else-if, got {:?}", other),
    }
    assert!(matches!(program.body[1], Stmt::While { .. }));
    match &program.body[2] {
        Stmt::ForOf { binding, span, .. } => {
            assert_eq!(binding, "item");
            assert_eq!(span.line(), 10);
        }
        other => panic!("expected for, got {:?}", other),
    }
    match &program.body[3] {
        Stmt::Try { catch_var, .. } => assert_eq!(catch_var, "err"),
        other => panic!("expected try, got {:?}", other),
    }
}

#[test]
fn test_member_and_index_assignment() {
    match parse_one("user.tags[0] = `x`;") {
        Stmt::Assign { var, path, .. } => {
            assert_eq!(var, "user");
            assert_eq!(path.len(), 2);
            assert!(matches!(&path[0], MemberAccess::Prop { property, .. } if property == "tags"));
            assert!(matches!(&path[1], MemberAccess::Index { .. }));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_object_keys_and_comments() {
    let expr = parse_expression("{ \"a b\": 1, c: [true, null, undefined], /* note */ d: {} }").unwrap();
    match expr {
        Expr::LitObj { properties, .. } => {
            let keys: Vec<_> = properties.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(keys, vec!["a b", "c", "d"]);
        }
        other => panic!("expected object, got {:?}", other),
    }
}

#[test]
fn test_syntax_error_reports_line() {
    let err = parse_program("x = 1;\ny = ;\n").unwrap_err();
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_identifier_helpers() {
    assert!(is_identifier("total_1"));
    assert!(is_identifier("$el"));
    assert!(!is_identifier("let"));
    assert!(!is_identifier("1abc"));
    assert!(is_identifier_name("for"));
    assert!(!is_identifier_name("a-b"));
}
