//! Translator tests - statement recognition, hoisting order and diagnostics
//!
//! These only check the produced instructions. Execution is covered by the
//! executor tests.

use crate::interpreter::translator::{translate, try_translate};
use crate::interpreter::types::{
    AssignTarget, BinaryOp, CallbackExpr, ConsoleMethod, DeclKind, Expr, Instruction,
    InstructionKind, Literal, PromiseSource, ReactionKind, TemplatePart,
};

fn body(source: &str) -> Vec<Instruction> {
    let program = translate(source);
    assert!(
        program.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        program.diagnostics
    );
    // drop the marker
    program.instructions.into_iter().skip(1).collect()
}

/* ===================== Hoisting ===================== */

#[test]
fn test_marker_lists_functions_and_vars() {
    let program = translate(
        r#"console.log(a);
var a = 1;
function greet() { return "hi"; }
let b = 2;
var c;"#,
    );

    assert!(program.diagnostics.is_empty());
    match &program.instructions[0].kind {
        InstructionKind::HoistingMarker {
            functions,
            variables,
        } => {
            assert_eq!(functions, &vec!["greet".to_string()]);
            assert_eq!(variables, &vec!["a".to_string(), "c".to_string()]);
        }
        other => panic!("Expected marker first, got {:?}", other),
    }

    let labels: Vec<&str> = program.instructions.iter().map(|i| i.kind.label()).collect();
    assert_eq!(
        labels,
        vec![
            "hoisting",
            "function-declaration",
            "hoisted-var",
            "hoisted-var",
            "console",
            "variable-declaration",
            "variable-declaration",
            "variable-declaration",
        ]
    );

    // initializers keep their source lines
    assert_eq!(program.instructions[4].line, 1);
    assert_eq!(program.instructions[5].line, 2);
    assert_eq!(program.instructions[1].line, 3);
}

#[test]
fn test_function_bodies_are_hoisted_too() {
    let instructions = body(
        r#"function outer() {
  inner();
  var x = 5;
  function inner() {
    console.log("inner");
  }
}"#,
    );

    assert_eq!(instructions.len(), 1);
    let InstructionKind::FunctionDeclaration { function } = &instructions[0].kind else {
        panic!("Expected function declaration, got {:?}", instructions[0]);
    };
    assert_eq!(function.display_name(), "outer");
    assert_eq!(function.start_line, 1);
    assert_eq!(function.end_line, 7);

    let labels: Vec<&str> = function.body.iter().map(|i| i.kind.label()).collect();
    assert_eq!(
        labels,
        vec![
            "function-declaration",
            "hoisted-var",
            "function-call",
            "variable-declaration"
        ]
    );
    assert!(function.body_source.starts_with("inner();"));
}

#[test]
fn test_var_object_construction_is_hoisted() {
    let program = translate("var list = new Array();");
    match &program.instructions[0].kind {
        InstructionKind::HoistingMarker { variables, .. } => {
            assert_eq!(variables, &vec!["list".to_string()]);
        }
        other => panic!("Expected marker, got {:?}", other),
    }
    assert!(matches!(
        &program.instructions[2].kind,
        InstructionKind::ObjectConstruction { declaration: Some(DeclKind::Var), name, constructor, .. }
            if name == "list" && constructor == "Array"
    ));
}

/* ===================== Statement Shapes ===================== */

#[test]
fn test_timer_registrations() {
    let instructions = body(
        r#"setTimeout(() => console.log("t"), 100);
setTimeout(tick);"#,
    );

    match &instructions[0].kind {
        InstructionKind::TimerRegistration {
            callback: CallbackExpr::Inline { function },
            delay: Some(Expr::Literal { value: Literal::Num(d) }),
            ..
        } => {
            assert_eq!(*d, 100.0);
            assert!(function.is_arrow);
            assert!(matches!(
                function.body[0].kind,
                InstructionKind::Console { method: ConsoleMethod::Log, .. }
            ));
        }
        other => panic!("Expected inline timer, got {:?}", other),
    }

    assert!(matches!(
        &instructions[1].kind,
        InstructionKind::TimerRegistration { callback: CallbackExpr::Named { name }, delay: None, .. }
            if name == "tick"
    ));
}

#[test]
fn test_promise_chain() {
    let instructions = body(
        r#"Promise.resolve(1).then(v => v + 1).catch(handle).finally(() => console.log("done"));"#,
    );

    match &instructions[0].kind {
        InstructionKind::PromiseThen {
            source: PromiseSource::Resolve(Some(Expr::Literal { value: Literal::Num(v) })),
            reactions,
        } => {
            assert_eq!(*v, 1.0);
            let kinds: Vec<ReactionKind> = reactions.iter().map(|r| r.kind).collect();
            assert_eq!(
                kinds,
                vec![ReactionKind::Then, ReactionKind::Catch, ReactionKind::Finally]
            );
            assert!(matches!(&reactions[1].callback, CallbackExpr::Named { name } if name == "handle"));
        }
        other => panic!("Expected promise chain, got {:?}", other),
    }
}

#[test]
fn test_reject_and_queue_microtask() {
    let instructions = body(
        r#"Promise.reject("bad").catch(e => console.error(e));
queueMicrotask(() => console.log("m"));"#,
    );

    assert!(matches!(
        &instructions[0].kind,
        InstructionKind::PromiseThen { source: PromiseSource::Reject(Some(_)), reactions }
            if reactions.len() == 1 && reactions[0].kind == ReactionKind::Catch
    ));
    assert!(matches!(
        &instructions[1].kind,
        InstructionKind::PromiseThen { source: PromiseSource::QueueMicrotask, reactions }
            if reactions.len() == 1
    ));
}

#[test]
fn test_console_methods() {
    let instructions = body(r#"console.warn("a", 1); console.info(); console.error(x);"#);
    let methods: Vec<(ConsoleMethod, usize)> = instructions
        .iter()
        .map(|i| match &i.kind {
            InstructionKind::Console { method, args } => (*method, args.len()),
            other => panic!("Expected console, got {:?}", other),
        })
        .collect();
    assert_eq!(
        methods,
        vec![
            (ConsoleMethod::Warn, 2),
            (ConsoleMethod::Info, 0),
            (ConsoleMethod::Error, 1)
        ]
    );
}

#[test]
fn test_assignment_shapes() {
    let instructions = body(
        r#"x = 5;
x += 2;
count++;
obj.value = 3;
arr[0] = 1;
p = new Bar();"#,
    );

    assert!(matches!(
        &instructions[0].kind,
        InstructionKind::Assignment { target: AssignTarget::Variable { name }, value: Expr::Literal { .. } }
            if name == "x"
    ));
    assert!(matches!(
        &instructions[1].kind,
        InstructionKind::Assignment { value: Expr::Binary { op: BinaryOp::Add, .. }, .. }
    ));
    assert!(matches!(
        &instructions[2].kind,
        InstructionKind::Assignment { target: AssignTarget::Variable { name }, value: Expr::Binary { op: BinaryOp::Add, .. } }
            if name == "count"
    ));
    assert!(matches!(
        &instructions[3].kind,
        InstructionKind::Assignment { target: AssignTarget::Property { property, .. }, .. }
            if property == "value"
    ));
    assert!(matches!(
        &instructions[4].kind,
        InstructionKind::Assignment { target: AssignTarget::Index { .. }, .. }
    ));
    assert!(matches!(
        &instructions[5].kind,
        InstructionKind::ObjectConstruction { declaration: None, name, constructor, .. }
            if name == "p" && constructor == "Bar"
    ));
}

#[test]
fn test_calls_and_method_calls() {
    let instructions = body("run(1, 2);\narr.push(4);\nuser.profile.save();");

    assert!(matches!(
        &instructions[0].kind,
        InstructionKind::FunctionCall { callee, args } if callee == "run" && args.len() == 2
    ));
    assert!(matches!(
        &instructions[1].kind,
        InstructionKind::MethodCall { method, .. } if method == "push"
    ));
    match &instructions[2].kind {
        InstructionKind::MethodCall { object, method, .. } => {
            assert_eq!(method, "save");
            assert_eq!(object.dotted_path().as_deref(), Some("user.profile"));
        }
        other => panic!("Expected method call, got {:?}", other),
    }
}

#[test]
fn test_multiple_statements_per_line() {
    let instructions = body("let a = 1; let b = 2; console.log(a, b);");
    assert_eq!(instructions.len(), 3);
    assert!(instructions.iter().all(|i| i.line == 1));
}

#[test]
fn test_multiple_declarators() {
    let instructions = body("let a = 1, b;");
    assert!(matches!(
        &instructions[..],
        [
            Instruction { kind: InstructionKind::VariableDeclaration { kind: DeclKind::Let, init: Some(_), .. }, .. },
            Instruction { kind: InstructionKind::VariableDeclaration { kind: DeclKind::Let, init: None, .. }, .. },
        ]
    ));
}

#[test]
fn test_return_without_value() {
    let instructions = body("function f() { return }");
    let InstructionKind::FunctionDeclaration { function } = &instructions[0].kind else {
        panic!("Expected function declaration");
    };
    assert!(matches!(function.body[0].kind, InstructionKind::Return { value: None }));
}

/* ===================== Expressions ===================== */

#[test]
fn test_template_literal() {
    let instructions = body("console.log(`sum: ${a + b}`);");
    let InstructionKind::Console { args, .. } = &instructions[0].kind else {
        panic!("Expected console");
    };
    match &args[0] {
        Expr::Template { parts } => {
            assert!(matches!(&parts[0], TemplatePart::Text(t) if t == "sum: "));
            assert!(matches!(
                &parts[1],
                TemplatePart::Expr(Expr::Binary { op: BinaryOp::Add, .. })
            ));
        }
        other => panic!("Expected template, got {:?}", other),
    }
}

#[test]
fn test_object_literal_properties() {
    let instructions =
        body(r#"const obj = { name: "x", count, greet() { return 1; }, inc: () => 1 };"#);
    let InstructionKind::VariableDeclaration {
        init: Some(Expr::Object { properties }),
        ..
    } = &instructions[0].kind
    else {
        panic!("Expected object declaration, got {:?}", instructions[0]);
    };

    let keys: Vec<&str> = properties.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["name", "count", "greet", "inc"]);
    assert!(matches!(&properties[2].1, Expr::Function { function } if function.display_name() == "greet"));
    assert!(matches!(&properties[3].1, Expr::Function { function } if function.display_name() == "inc"));
}

#[test]
fn test_arrow_names_are_inferred() {
    let instructions = body("const add = (a, b) => a + b;");
    match &instructions[0].kind {
        InstructionKind::VariableDeclaration {
            kind: DeclKind::Const,
            init: Some(Expr::Function { function }),
            ..
        } => {
            assert_eq!(function.display_name(), "add");
            assert_eq!(function.params, vec!["a".to_string(), "b".to_string()]);
            assert!(matches!(
                function.body[0].kind,
                InstructionKind::Return { value: Some(Expr::Binary { .. }) }
            ));
        }
        other => panic!("Expected arrow declaration, got {:?}", other),
    }
}

#[test]
fn test_operator_precedence() {
    let instructions = body("let r = 1 + 2 * 3;");
    match &instructions[0].kind {
        InstructionKind::VariableDeclaration {
            init: Some(Expr::Binary { op, right, .. }),
            ..
        } => {
            assert_eq!(*op, BinaryOp::Add);
            assert!(matches!(right.as_ref(), Expr::Binary { op: BinaryOp::Mul, .. }));
        }
        other => panic!("Expected binary, got {:?}", other),
    }
}

#[test]
fn test_string_escapes_and_negative_numbers() {
    let instructions = body(r#"let s = "a\"b\n"; let n = -4;"#);
    assert!(matches!(
        &instructions[0].kind,
        InstructionKind::VariableDeclaration { init: Some(Expr::Literal { value: Literal::Str(s) }), .. }
            if s == "a\"b\n"
    ));
    assert!(matches!(
        &instructions[1].kind,
        InstructionKind::VariableDeclaration { init: Some(Expr::Literal { value: Literal::Num(n) }), .. }
            if *n == -4.0
    ));
}

/* ===================== Diagnostics ===================== */

#[test]
fn test_unrecognized_statements_become_diagnostics() {
    let program = translate(
        r#"let a = 1;
if (a > 0) { console.log("pos"); }
for (let i = 0; i < 3; i++) {
  console.log(i);
}
let b = a ? 1 : 2;
console.log("end");"#,
    );

    let lines: Vec<usize> = program.diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![2, 3, 6]);
    assert_eq!(program.diagnostics[2].text, "let b = a ? 1 : 2;");

    let labels: Vec<&str> = program.instructions.iter().map(|i| i.kind.label()).collect();
    assert_eq!(labels, vec!["hoisting", "variable-declaration", "console"]);
    assert_eq!(program.instructions[2].line, 7);
}

#[test]
fn test_garbage_never_fails() {
    let program = try_translate("}}} (((").expect("Should parse");
    assert_eq!(program.instructions.len(), 1);
    assert_eq!(program.diagnostics.len(), 4);
}

#[test]
fn test_async_function_flag() {
    let program = translate("async function load() {\n  await fetch();\n}");
    let InstructionKind::FunctionDeclaration { function } = &program.instructions[1].kind else {
        panic!("Expected function declaration");
    };
    assert!(function.is_async);
    assert_eq!(program.diagnostics.len(), 1);
    assert_eq!(program.diagnostics[0].line, 2);
}

#[test]
fn test_comments_are_ignored() {
    let instructions = body(
        r#"// leading comment
let a = 1; // trailing
/* block
   comment */
console.log(a);"#,
    );
    assert_eq!(instructions.len(), 2);
    assert_eq!(instructions[1].line, 5);
}

#[test]
fn test_instruction_json_shape() {
    let program = translate("");
    let json = serde_json::to_value(&program.instructions[0]).expect("Should serialize");
    assert_eq!(json["type"], "hoistingMarker");
    assert_eq!(json["line"], 0);
}
