//! Lifecycle types and the pause/stop handle

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Interpreter lifecycle
///
/// `Idle -> Running -> Paused -> Running -> Completed`, back to `Idle` only
/// through `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Running,
    Paused,
    Completed,
}

/// Whether instruction boundaries wait for the step delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// `step()`: never suspends except to wait for a pending timer
    Immediate,
    /// `run()`: sleeps the step delay and honors pause/stop between instructions
    Paced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    /// Program and every queue ran dry
    Completed,
    /// A runtime fault ended the run; it was reported to the console
    Halted,
    /// `Controller::stop` was called
    Stopped,
}

/// Cloneable handle for pausing or stopping a run from another future
///
/// Bound to one session: `reset` hands out a fresh controller.
#[derive(Debug, Clone)]
pub struct Controller {
    paused: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
            cancel: CancellationToken::new(),
        }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(super) fn pause_signal(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    pub(super) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
