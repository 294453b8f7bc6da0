//! Tests for runtime faults

use tokio_test::assert_ok;

use super::helpers::{console_of, load, settings, stack_names};
use crate::interpreter::executor::{Interpreter, Phase, RunOutcome, RuntimeError, Settings};
use crate::interpreter::translator::translate;
use crate::interpreter::types::{ConsoleMethod, Diagnostic, Program};

const RUNAWAY: &str = r#"
function recurse() {
  recurse();
}
recurse();
console.log("after");
"#;

#[tokio::test(start_paused = true)]
async fn test_call_depth_limit_halts_step() {
    let mut interpreter = load(RUNAWAY);

    // marker and declaration
    assert!(interpreter.step().await.unwrap());
    assert!(interpreter.step().await.unwrap());

    let err = interpreter.step().await.unwrap_err();
    assert_eq!(
        err,
        RuntimeError::CallDepthExceeded {
            depth: 64,
            function: "recurse".to_string(),
        }
    );

    let state = interpreter.state();
    assert_eq!(interpreter.phase(), Phase::Completed);
    assert_eq!(stack_names(state), vec!["(global)"]);
    assert_eq!(state.scopes.len(), 1);

    let last = state.console.last().unwrap();
    assert_eq!(last.method, ConsoleMethod::Error);
    assert!(last.text().starts_with("RangeError: Maximum call stack size exceeded"));

    // nothing after the fault runs
    assert!(!interpreter.step().await.unwrap());
    assert!(!interpreter.state().console_lines().contains(&"after".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_call_depth_limit_halts_run() {
    let mut interpreter = load(RUNAWAY);
    interpreter.set_speed(0);

    let outcome = assert_ok!(interpreter.run().await);

    assert_eq!(outcome, RunOutcome::Halted);
    assert_eq!(interpreter.state().console_lines().len(), 1);
    assert!(!interpreter.state().is_running);
}

#[tokio::test(start_paused = true)]
async fn test_script_errors_do_not_halt() {
    let mut interpreter = load(
        r#"
const fixed = 1;
fixed = 2;
undefinedFunction();
console.log("ok");
"#,
    );
    interpreter.set_speed(0);

    let outcome = assert_ok!(interpreter.run().await);

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(interpreter.state().console_lines().last().unwrap(), "ok");
    let errors = interpreter
        .state()
        .console
        .iter()
        .filter(|e| e.method == ConsoleMethod::Error)
        .count();
    assert_eq!(errors, 2);
}

#[tokio::test(start_paused = true)]
async fn test_default_depth_limit_is_reached_before_the_stack_runs_out() {
    let mut interpreter = Interpreter::new(Settings::default());
    interpreter.init(translate(RUNAWAY));

    assert!(interpreter.step().await.unwrap());
    assert!(interpreter.step().await.unwrap());

    let err = interpreter.step().await.unwrap_err();
    assert_eq!(
        err,
        RuntimeError::CallDepthExceeded {
            depth: Settings::default().max_call_depth,
            function: "recurse".to_string(),
        }
    );
    assert_eq!(stack_names(interpreter.state()), vec!["(global)"]);
    assert_eq!(interpreter.state().scopes.len(), 1);
}

fn unparsable() -> Program {
    Program {
        instructions: Vec::new(),
        diagnostics: vec![Diagnostic {
            line: 2,
            text: String::new(),
            message: "syntax error at line 2: expected statement".to_string(),
            fatal: true,
        }],
    }
}

#[tokio::test(start_paused = true)]
async fn test_parse_failure_halts_run() {
    let mut interpreter = Interpreter::new(settings());
    interpreter.init(unparsable());
    interpreter.set_speed(0);

    let outcome = assert_ok!(interpreter.run().await);

    assert_eq!(outcome, RunOutcome::Halted);
    let last = interpreter.state().console.last().unwrap();
    assert_eq!(last.method, ConsoleMethod::Error);
    assert_eq!(last.text(), "syntax error at line 2: expected statement");
}

#[tokio::test(start_paused = true)]
async fn test_parse_failure_fails_first_step() {
    let mut interpreter = Interpreter::new(settings());
    interpreter.init(unparsable());

    let err = interpreter.step().await.unwrap_err();

    assert!(matches!(err, RuntimeError::Translation(_)));
    assert_eq!(interpreter.phase(), Phase::Completed);
    assert!(!interpreter.step().await.unwrap());
    assert_eq!(interpreter.state().console.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_builtin_in_expression_is_reported() {
    let lines = console_of(
        r#"
let id = setTimeout();
console.log("after");
"#,
    )
    .await;

    assert_eq!(lines, vec!["TypeError: setTimeout needs a callback", "after"]);
}
