//! Tests for hoisted functions and `var` bindings

use super::helpers::{console_of, load};
use crate::state::{HeapPayload, Value};

#[tokio::test(start_paused = true)]
async fn test_var_reads_undefined_before_its_initializer() {
    let lines = console_of(
        r#"
console.log(x);
var x = 5;
console.log(x);
"#,
    )
    .await;

    assert_eq!(lines, vec!["undefined", "5"]);
}

#[tokio::test(start_paused = true)]
async fn test_function_callable_before_declaration() {
    let lines = console_of(
        r#"
greet("world");

function greet(name) {
  console.log("hello " + name);
}
"#,
    )
    .await;

    assert_eq!(lines, vec!["hello world"]);
}

#[tokio::test(start_paused = true)]
async fn test_hoisted_bindings_exist_after_the_first_instructions() {
    let mut interpreter = load(
        r#"
console.log(typeof later, typeof helper);
var later = 1;
function helper() {}
"#,
    );

    // marker, function declaration, hoisted var
    for _ in 0..3 {
        assert!(interpreter.step().await.unwrap());
    }

    let state = interpreter.state();
    let global = &state.scopes[0];
    assert_eq!(global.variables["later"].value, Value::Undefined);
    let helper = global.variables["helper"].value.as_ref_id().unwrap();
    assert!(matches!(
        state.heap[&helper].payload,
        HeapPayload::Function(_)
    ));
    assert_eq!(state.call_stack[0].variables["later"].value, Value::Undefined);

    assert!(interpreter.step().await.unwrap());
    assert_eq!(interpreter.state().console_lines(), vec!["undefined function"]);
}

#[tokio::test(start_paused = true)]
async fn test_redeclared_var_without_initializer_keeps_value() {
    let lines = console_of(
        r#"
var count = 2;
var count;
console.log(count);
"#,
    )
    .await;

    assert_eq!(lines, vec!["2"]);
}

#[tokio::test(start_paused = true)]
async fn test_function_bodies_are_hoisted() {
    let lines = console_of(
        r#"
function outer() {
  console.log(inner(), local);
  var local = "set";
  function inner() {
    return "inner";
  }
}
outer();
"#,
    )
    .await;

    assert_eq!(lines, vec!["inner undefined"]);
}
