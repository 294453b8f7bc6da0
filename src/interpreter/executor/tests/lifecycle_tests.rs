//! Tests for run(), pause/resume, stop and reset

use std::time::Duration;

use tokio_test::assert_ok;

use super::helpers::{load, record, STEP_DELAY_MS};
use crate::interpreter::executor::{Interpreter, Phase, RunOutcome, RuntimeError};
use crate::state::{StoreEvent, Topic};

const THREE_LOGS: &str = r#"
console.log("one");
console.log("two");
console.log("three");
"#;

#[tokio::test(start_paused = true)]
async fn test_run_paces_and_completes() {
    let mut interpreter = load(THREE_LOGS);
    assert_eq!(interpreter.phase(), Phase::Idle);

    let started = tokio::time::Instant::now();
    let outcome = assert_ok!(interpreter.run().await);

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(interpreter.phase(), Phase::Completed);
    // marker plus three statements, one delay each
    assert!(started.elapsed() >= Duration::from_millis(4 * STEP_DELAY_MS));

    let state = interpreter.state();
    assert_eq!(state.console_lines(), vec!["one", "two", "three"]);
    assert!(!state.is_running);
    assert!(!state.is_paused);
    assert_eq!(state.current_line, 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_drains_timers_and_reports_flags() {
    let mut interpreter = load(
        r#"
setTimeout(() => {
  console.log("later");
}, 5000);
console.log("now");
"#,
    );
    let flags = record(&mut interpreter, Topic::Execution, |event, _| match event {
        StoreEvent::Execution(f) => Some((f.is_running, f.is_paused)),
        _ => None,
    });

    let outcome = assert_ok!(interpreter.run().await);

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(interpreter.state().console_lines(), vec!["now", "later"]);
    assert_eq!(*flags.lock().unwrap(), vec![(true, false), (false, false)]);
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_through_controller() {
    let mut interpreter = load(THREE_LOGS);
    let lines = record(&mut interpreter, Topic::Console, |event, _| match event {
        StoreEvent::Console(entry) => Some(entry.text()),
        _ => None,
    });
    let flags = record(&mut interpreter, Topic::Execution, |event, _| match event {
        StoreEvent::Execution(f) => Some((f.is_running, f.is_paused)),
        _ => None,
    });

    let controller = interpreter.controller();
    controller.pause();

    let observer = {
        let lines = lines.clone();
        let controller = controller.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            // nothing ran while paused
            assert!(lines.lock().unwrap().is_empty());
            assert!(controller.is_paused());
            controller.resume();
        }
    };

    let (outcome, ()) = tokio::join!(interpreter.run(), observer);

    assert_eq!(assert_ok!(outcome), RunOutcome::Completed);
    assert_eq!(*lines.lock().unwrap(), vec!["one", "two", "three"]);
    let flags = flags.lock().unwrap();
    assert_eq!(flags[..3], [(true, false), (true, true), (true, false)]);
    assert_eq!(flags.last(), Some(&(false, false)));
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_the_run() {
    let mut interpreter = load(THREE_LOGS);
    let controller = interpreter.controller();

    let stopper = async {
        // marker and the first statement
        tokio::time::sleep(Duration::from_millis(2 * STEP_DELAY_MS + STEP_DELAY_MS / 2)).await;
        controller.stop();
    };
    let (outcome, ()) = tokio::join!(interpreter.run(), stopper);

    assert_eq!(assert_ok!(outcome), RunOutcome::Stopped);
    assert_eq!(interpreter.phase(), Phase::Completed);
    assert_eq!(interpreter.state().console_lines(), vec!["one"]);
    assert!(!interpreter.state().is_running);
}

#[tokio::test(start_paused = true)]
async fn test_step_phases() {
    let mut interpreter = load("let a = 1;");
    assert_eq!(interpreter.phase(), Phase::Idle);

    assert!(interpreter.step().await.unwrap());
    assert_eq!(interpreter.phase(), Phase::Running);
    assert!(interpreter.state().is_running);

    assert!(!interpreter.step().await.unwrap());
    assert_eq!(interpreter.phase(), Phase::Completed);

    // finished programs stay finished until reset
    assert!(!interpreter.step().await.unwrap());
    assert_eq!(assert_ok!(interpreter.run().await), RunOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_pending_timers() {
    let mut interpreter = load(
        r#"
setTimeout(() => {
  console.log("late");
}, 100);
"#,
    );
    assert!(interpreter.step().await.unwrap());
    assert!(interpreter.step().await.unwrap());
    assert_eq!(interpreter.state().event_loop.web_apis.len(), 1);
    let session = interpreter.session_id();

    interpreter.reset();

    assert_eq!(interpreter.phase(), Phase::Idle);
    assert!(interpreter.state().event_loop.is_empty());
    assert!(interpreter.state().scopes.is_empty());
    assert!(interpreter.state().call_stack.is_empty());
    assert_ne!(interpreter.session_id(), session);
    assert_eq!(interpreter.step().await, Err(RuntimeError::NotInitialized));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(interpreter.state().console.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_init_replaces_previous_program() {
    let mut interpreter = load("console.log(\"first\");");
    interpreter.step().await.unwrap();
    interpreter.step().await.unwrap();

    interpreter.init(crate::interpreter::translator::translate("console.log(\"second\");"));
    while interpreter.step().await.unwrap() {}

    assert_eq!(interpreter.state().console_lines(), vec!["second"]);
    assert_eq!(interpreter.state().scopes.len(), 1);
}

#[tokio::test]
async fn test_uninitialized_interpreter() {
    let mut interpreter = Interpreter::default();

    assert_eq!(interpreter.step().await, Err(RuntimeError::NotInitialized));
    assert_eq!(interpreter.run().await, Err(RuntimeError::NotInitialized));
}
