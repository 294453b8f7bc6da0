//! Type definitions shared by the translator and the executor
//!
//! - Instructions (the translator's output)
//! - Value expressions
//! - Function definitions (parsed once, shared by `Arc`)

pub mod ast;

pub use ast::{
    AssignTarget, BinaryOp, CallbackExpr, ConsoleMethod, DeclKind, Diagnostic, Expr,
    FunctionDef, Instruction, InstructionKind, Literal, Program, PromiseSource, ReactionExpr,
    ReactionKind, TemplatePart, UnaryOp, UpdateOp,
};
