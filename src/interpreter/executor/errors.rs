//! Runtime faults
//!
//! Script-level problems (unknown names, const reassignment) are not errors
//! here: they are written to the console and execution continues. A
//! `RuntimeError` ends the current run.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("RangeError: Maximum call stack size exceeded (depth {depth} calling {function})")]
    CallDepthExceeded { depth: usize, function: String },

    #[error("{0}")]
    Translation(String),

    #[error("execution interrupted")]
    Interrupted,

    #[error("interpreter not initialized")]
    NotInitialized,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
