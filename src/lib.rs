//! Loopscope: a step-by-step simulator of the JavaScript execution model
//!
//! A script is translated into hoisted instructions
//! ([`interpreter::translator`]), then executed by an [`Interpreter`] that
//! records every change to the call stack, heap, scopes, event-loop queues and
//! console in a [`RuntimeStore`](state::RuntimeStore) observers subscribe to.

pub mod cli;
pub mod config;
pub mod interpreter;
pub mod state;

pub use config::{Config, ConfigError};
pub use interpreter::executor::{Controller, Interpreter, Phase, RunOutcome, RuntimeError, Settings};
pub use interpreter::translator::{translate, try_translate, TranslateError};
pub use interpreter::types::{Diagnostic, Instruction, InstructionKind, Program};
pub use state::{RuntimeState, RuntimeStore, StoreEvent, SubscriptionId, Topic};
