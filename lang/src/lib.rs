//! A small expression language with first-class closures.
//!
//! Source text goes through the lexer and parser, then the resolver assigns
//! every identifier a frame slot and works out closure captures, the code
//! generator lowers the tree into executable program nodes, and the stack
//! machine evaluates them.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod runner;
pub mod vm;

pub use error::SeError;
pub use runner::Interpreter;
pub use vm::{MachineConfig, Program, Value};

/// Stack growth parameters for deep recursion
const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// Runs `f`, moving onto a fresh stack segment when the native stack is
/// nearly exhausted. Every recursive pass (parse, resolve, compile, exec)
/// goes through here.
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, f)
}

/// Compile `source` with the standard prelude.
pub fn compile(source: &str) -> Result<Program, SeError> {
    Interpreter::default().compile(source)
}

/// Evaluate a compiled program with the default machine limits.
pub fn eval(program: &Program) -> Result<Value, SeError> {
    Interpreter::default().eval(program)
}
