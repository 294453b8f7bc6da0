//! Test helpers for interpreter tests
//!
//! Common utilities for translating sources and driving interpreters

use std::sync::{Arc, Mutex};

use crate::interpreter::executor::{Interpreter, Settings};
use crate::interpreter::translator::translate;
use crate::state::{RuntimeState, StoreEvent, Topic};

/// Step delay used by the helpers. Timer sleepers wait `min(delay, this)`,
/// so with a paused clock timers still fire in delay order.
pub const STEP_DELAY_MS: u64 = 1_000;

pub fn settings() -> Settings {
    Settings {
        step_delay_ms: STEP_DELAY_MS,
        max_call_depth: 64,
    }
}

/// Translate `source` and load it into a fresh interpreter
pub fn load(source: &str) -> Interpreter {
    let mut interpreter = Interpreter::new(settings());
    interpreter.init(translate(source));
    interpreter
}

/// Step until no work remains. Panics on a runtime fault.
pub async fn step_to_end(interpreter: &mut Interpreter) {
    let mut steps = 0;
    while interpreter.step().await.expect("step failed") {
        steps += 1;
        assert!(steps < 10_000, "program did not finish");
    }
}

/// Run `source` to completion with `step()` and return the console lines
pub async fn console_of(source: &str) -> Vec<String> {
    let mut interpreter = load(source);
    step_to_end(&mut interpreter).await;
    interpreter.state().console_lines()
}

pub fn scope_names(state: &RuntimeState) -> Vec<String> {
    state.scopes.iter().map(|s| s.name.clone()).collect()
}

pub fn stack_names(state: &RuntimeState) -> Vec<String> {
    state.call_stack.iter().map(|f| f.name.clone()).collect()
}

/// Record one value per event on `topic`
pub fn record<T, F>(interpreter: &mut Interpreter, topic: Topic, mut extract: F) -> Arc<Mutex<Vec<T>>>
where
    T: Send + 'static,
    F: FnMut(&StoreEvent, &RuntimeState) -> Option<T> + Send + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    interpreter.subscribe(
        topic,
        Box::new(move |event, state| {
            if let Some(value) = extract(event, state) {
                sink.lock().unwrap().push(value);
            }
        }),
    );
    seen
}
