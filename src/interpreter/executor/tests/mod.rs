//! Tests for the step interpreter
//!
//! Organized by feature area

mod error_tests;
mod event_loop_tests;
mod helpers;
mod hoisting_tests;
mod lifecycle_tests;
