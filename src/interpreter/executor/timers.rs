//! Timer migrations
//!
//! Each `setTimeout` spawns a tokio task that sleeps and then reports back
//! over a channel. The interpreter applies the report (web-API queue to
//! callback queue) itself, so the store is never touched from another task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::errors::{RuntimeError, RuntimeResult};
use crate::state::{RuntimeStore, TaskId};

#[derive(Debug, Clone, Copy)]
struct TimerFired {
    task: TaskId,
    delay_ms: u64,
}

#[derive(Debug)]
pub(super) struct TimerWheel {
    tx: mpsc::UnboundedSender<TimerFired>,
    rx: mpsc::UnboundedReceiver<TimerFired>,
}

impl Default for TimerWheel {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }
}

impl TimerWheel {
    /// Spawn the sleeper for a task already sitting in the web-API queue
    pub(super) fn schedule(&self, store: &mut RuntimeStore, task: TaskId, delay_ms: u64, wait: Duration) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = tx.send(TimerFired { task, delay_ms });
        });
        store.track_timer(handle.abort_handle());
        debug!(%task, delay_ms, wait_ms = wait.as_millis() as u64, "timer scheduled");
    }

    /// Apply every migration that already fired. Returns how many moved.
    pub(super) fn absorb(&mut self, store: &mut RuntimeStore) -> usize {
        let mut fired = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            fired.push(event);
        }
        migrate(store, fired)
    }

    /// Block until the next timer fires, then apply it together with any
    /// other timer due at the same instant.
    pub(super) async fn wait_next(&mut self, store: &mut RuntimeStore, cancel: &CancellationToken) -> RuntimeResult<usize> {
        let first = tokio::select! {
            _ = cancel.cancelled() => return Err(RuntimeError::Interrupted),
            event = self.rx.recv() => event,
        };
        let Some(first) = first else {
            return Ok(0);
        };

        // Sleepers woken by the same clock tick get a chance to report first
        tokio::task::yield_now().await;

        let mut fired = vec![first];
        while let Ok(event) = self.rx.try_recv() {
            fired.push(event);
        }
        Ok(migrate(store, fired))
    }
}

/// Same-batch firings go in (declared delay, registration) order
fn migrate(store: &mut RuntimeStore, mut fired: Vec<TimerFired>) -> usize {
    fired.sort_by_key(|event| (event.delay_ms, event.task));
    let mut moved = 0;
    for event in fired {
        if store.move_to_callback(event.task) {
            moved += 1;
        }
    }
    moved
}
