//! Script translation and execution
//!
//! - `types` - instruction and expression nodes
//! - `translator` - source text to hoisted instructions
//! - `executor` - the step interpreter

pub mod executor;
pub mod translator;
pub mod types;

pub use executor::{Interpreter, RunOutcome, RuntimeError};
pub use translator::{translate, TranslateError};
