//! Core execution loop
//!
//! `step()` advances by one top-level instruction, or by one event-loop drain
//! pass once the sequence is exhausted. `run()` repeats it with pacing.
//!
//! ## Drain pass
//! 1. Absorb fired timers, waiting for one only when nothing else can run
//! 2. Drain the whole microtask queue
//! 3. Run at most one callback task

use std::time::Duration;

use tracing::{debug, error, info, Instrument};

use super::control::{Pacing, Phase, RunOutcome};
use super::errors::{RuntimeError, RuntimeResult};
use super::vm::Interpreter;
use crate::interpreter::types::ConsoleMethod;
use crate::state::ScopeId;

/* ===================== Public API ===================== */

impl Interpreter {
    /// Execute one unit of work without pacing. Returns whether work remains.
    ///
    /// A fault is written to the console, ends the program and is returned.
    pub async fn step(&mut self) -> RuntimeResult<bool> {
        let global = self.global_scope()?;
        if self.phase == Phase::Completed {
            return Ok(false);
        }
        self.pacing = Pacing::Immediate;
        if self.phase == Phase::Idle {
            self.phase = Phase::Running;
            self.store.set_execution(true, false);
        }

        let span = self.span.clone();
        match self.advance(global).instrument(span).await {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.finish();
                Ok(false)
            }
            Err(err) => {
                self.report(&err);
                self.finish();
                Err(err)
            }
        }
    }

    /// Step until done, sleeping the step delay between instructions and
    /// honoring pause and stop from the [`Controller`](super::Controller).
    pub async fn run(&mut self) -> RuntimeResult<RunOutcome> {
        let global = self.global_scope()?;
        if self.phase == Phase::Completed {
            return Ok(RunOutcome::Completed);
        }
        self.pacing = Pacing::Paced;
        self.phase = Phase::Running;
        self.store.set_execution(true, false);

        let span = self.span.clone();
        let outcome = async {
            info!(speed_ms = self.store.state().speed_ms, "run started");
            loop {
                match self.advance(global).await {
                    Ok(true) => continue,
                    Ok(false) => break RunOutcome::Completed,
                    Err(RuntimeError::Interrupted) => break RunOutcome::Stopped,
                    Err(err) => {
                        self.report(&err);
                        break RunOutcome::Halted;
                    }
                }
            }
        }
        .instrument(span.clone())
        .await;

        self.pacing = Pacing::Immediate;
        self.finish();
        span.in_scope(|| {
            info!(?outcome, steps = self.store.state().step_count, "run finished");
        });
        Ok(outcome)
    }

    /* ===================== Advancing ===================== */

    async fn advance(&mut self, global: ScopeId) -> RuntimeResult<bool> {
        if let Some(message) = self.fault.take() {
            return Err(RuntimeError::Translation(message));
        }
        self.pace().await?;
        self.timers.absorb(&mut self.store);

        let program = self.program.clone();
        match program.get(self.cursor) {
            Some(instruction) => {
                self.cursor += 1;
                // a top-level `return` has nothing to return to
                self.execute(instruction, global).await?;
            }
            None => self.drain_pass().await?,
        }

        self.store.increment_step(self.cursor);
        Ok(self.has_work())
    }

    async fn drain_pass(&mut self) -> RuntimeResult<()> {
        self.timers.absorb(&mut self.store);

        let queues = &self.store.state().event_loop;
        let idle = queues.microtask_queue.is_empty() && queues.callback_queue.is_empty();
        if idle && !queues.web_apis.is_empty() {
            debug!(pending = queues.web_apis.len(), "waiting for a timer");
            let cancel = self.control.cancel_token();
            self.timers.wait_next(&mut self.store, &cancel).await?;
        }

        while let Some(task) = self.store.dequeue_microtask() {
            self.run_task(task).await?;
        }
        if let Some(task) = self.store.dequeue_callback() {
            self.run_task(task).await?;
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.phase = Phase::Completed;
        self.store.set_current_line(0);
        self.store.set_execution(false, false);
    }

    fn report(&mut self, err: &RuntimeError) {
        if *err == RuntimeError::Interrupted {
            return;
        }
        let _guard = self.span.clone().entered();
        error!(%err, cursor = self.cursor, "runtime fault");
        self.store.log_console(ConsoleMethod::Error, vec![err.to_string()]);
    }

    /* ===================== Pacing ===================== */

    /// Suspension point between instructions. A no-op for `step()`.
    pub(super) async fn pace(&mut self) -> RuntimeResult<()> {
        if self.pacing == Pacing::Immediate {
            return Ok(());
        }
        let cancel = self.control.cancel_token();
        if cancel.is_cancelled() {
            return Err(RuntimeError::Interrupted);
        }

        self.wait_if_paused().await?;
        let delay = Duration::from_millis(self.store.state().speed_ms);
        tokio::select! {
            _ = cancel.cancelled() => return Err(RuntimeError::Interrupted),
            _ = tokio::time::sleep(delay) => {}
        }
        self.wait_if_paused().await
    }

    async fn wait_if_paused(&mut self) -> RuntimeResult<()> {
        let mut signal = self.control.pause_signal();
        if !*signal.borrow_and_update() {
            return Ok(());
        }

        self.phase = Phase::Paused;
        self.store.set_execution(true, true);
        debug!(cursor = self.cursor, "paused");

        let cancel = self.control.cancel_token();
        loop {
            let changed = tokio::select! {
                _ = cancel.cancelled() => return Err(RuntimeError::Interrupted),
                changed = signal.changed() => changed,
            };
            if changed.is_err() || !*signal.borrow_and_update() {
                break;
            }
        }

        self.phase = Phase::Running;
        self.store.set_execution(true, false);
        debug!(cursor = self.cursor, "resumed");
        Ok(())
    }
}
