//! Tests for timers, promise chains and microtask ordering

use super::helpers::{console_of, load, record, step_to_end};
use crate::state::{EventLoopAction, StoreEvent, TaskKind, Topic};

#[tokio::test(start_paused = true)]
async fn test_microtasks_run_before_timers() {
    let lines = console_of(
        r#"
console.log("Start");
setTimeout(() => {
  console.log("Timeout");
}, 0);
Promise.resolve().then(() => {
  console.log("Promise");
});
console.log("End");
"#,
    )
    .await;

    assert_eq!(lines, vec!["Start", "End", "Promise", "Timeout"]);
}

#[tokio::test(start_paused = true)]
async fn test_timers_fire_in_delay_order() {
    let lines = console_of(
        r#"
setTimeout(() => {
  console.log("slow");
}, 200);
setTimeout(() => {
  console.log("fast");
}, 50);
queueMicrotask(() => {
  console.log("micro");
});
"#,
    )
    .await;

    assert_eq!(lines, vec!["micro", "fast", "slow"]);
}

#[tokio::test(start_paused = true)]
async fn test_callback_microtasks_drain_before_next_callback() {
    let lines = console_of(
        r#"
setTimeout(() => {
  console.log("t1");
  Promise.resolve().then(() => {
    console.log("p1");
  });
}, 0);
setTimeout(() => {
  console.log("t2");
}, 0);
"#,
    )
    .await;

    assert_eq!(lines, vec!["t1", "p1", "t2"]);
}

#[tokio::test(start_paused = true)]
async fn test_timer_arguments_are_passed() {
    let lines = console_of("setTimeout((a, b) => { console.log(a + b); }, 10, 2, 3);").await;

    assert_eq!(lines, vec!["5"]);
}

#[tokio::test(start_paused = true)]
async fn test_promise_chain_threads_values() {
    let lines = console_of(
        r#"
Promise.resolve(1)
  .then((v) => {
    console.log("got", v);
    return v + 1;
  })
  .catch((e) => {
    console.log("never");
  })
  .then((v) => {
    console.log("next", v);
  });
"#,
    )
    .await;

    assert_eq!(lines, vec!["got 1", "next 2"]);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_skips_to_catch() {
    let lines = console_of(
        r#"
Promise.reject("boom")
  .then(() => {
    console.log("skipped");
  })
  .catch((e) => {
    console.log("caught", e);
  })
  .finally(() => {
    console.log("done");
  });
"#,
    )
    .await;

    assert_eq!(lines, vec!["caught boom", "done"]);
}

#[tokio::test(start_paused = true)]
async fn test_unhandled_rejection_is_reported() {
    let lines = console_of(
        r#"
Promise.reject("bad").then(() => {
  console.log("skipped");
});
"#,
    )
    .await;

    assert_eq!(lines, vec!["Uncaught (in promise) bad"]);
}

#[tokio::test(start_paused = true)]
async fn test_named_callbacks_and_queue_state() {
    let mut interpreter = load(
        r#"
function tick() {
  console.log("tick");
}
setTimeout(tick, 100);
Promise.resolve("v").then(tick);
"#,
    );

    // marker, declaration, timer registration, promise
    for _ in 0..4 {
        assert!(interpreter.step().await.unwrap());
    }

    let queues = &interpreter.state().event_loop;
    assert_eq!(queues.web_apis.len(), 1);
    assert_eq!(queues.web_apis[0].name, "tick");
    assert_eq!(queues.web_apis[0].delay_ms, Some(100));
    assert_eq!(queues.microtask_queue.len(), 1);
    assert_eq!(queues.microtask_queue[0].kind, TaskKind::Promise);
    assert!(queues.callback_queue.is_empty());

    step_to_end(&mut interpreter).await;
    assert_eq!(interpreter.state().console_lines(), vec!["tick", "tick"]);
    assert!(interpreter.state().event_loop.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_event_loop_events() {
    let mut interpreter = load(
        r#"
setTimeout(() => {}, 0);
Promise.resolve().then(() => {});
"#,
    );
    let actions = record(&mut interpreter, Topic::EventLoop, |event, _| match event {
        StoreEvent::EventLoop(e) => Some(e.action),
        _ => None,
    });
    step_to_end(&mut interpreter).await;

    let actions = actions.lock().unwrap();
    assert_eq!(actions[0], EventLoopAction::AddWebApi);
    assert_eq!(actions[1], EventLoopAction::AddMicrotask);
    let position = |wanted| actions.iter().position(|a| *a == wanted).unwrap();
    assert!(position(EventLoopAction::ProcessMicrotask) < position(EventLoopAction::ProcessCallback));
    assert!(position(EventLoopAction::MoveToCallback) < position(EventLoopAction::ProcessCallback));
}

#[tokio::test(start_paused = true)]
async fn test_finished_callbacks_release_their_scopes() {
    let mut interpreter = load(
        r#"
function schedule(label) {
  setTimeout(() => {
    console.log(label);
  }, 10);
}
function makeLogger(prefix) {
  return (text) => {
    console.log(prefix + text);
  };
}
schedule("a");
schedule("b");
const log = makeLogger("> ");
setTimeout(() => {
  log("later");
}, 20);
"#,
    );
    step_to_end(&mut interpreter).await;

    assert_eq!(interpreter.state().console_lines(), vec!["a", "b", "> later"]);
    // only the logger's scope is still reachable, through its function object
    let kept: Vec<String> = interpreter.retained.values().map(|s| s.name.clone()).collect();
    assert_eq!(kept, vec!["makeLogger"]);
}
