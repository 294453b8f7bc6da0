//! Step interpreter
//!
//! Executes a translated [`Program`](crate::interpreter::types::Program)
//! against a [`RuntimeStore`](crate::state::RuntimeStore), one instruction or
//! one event-loop pass at a time.
//!
//! ## Module Organization
//! - `vm` - interpreter state, settings and lifecycle
//! - `exec_loop` - `step()`, `run()` and pacing
//! - `statements` - per-instruction semantics
//! - `expressions` - expression evaluation
//! - `calls` - invocation, scope chain and task callbacks
//! - `timers` - timer migrations from the web-API queue
//! - `format` - console display and coercions

mod calls;
pub mod control;
pub mod errors;
mod exec_loop;
mod expressions;
pub mod format;
mod statements;
mod timers;
pub mod vm;

#[cfg(test)]
mod tests;

pub use control::{Controller, Phase, RunOutcome};
pub use errors::{RuntimeError, RuntimeResult};
pub use vm::{Interpreter, Settings};
