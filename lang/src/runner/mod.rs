// RuntimeError carries a stack trace; boxing it would cost on every fallible step.
#![allow(clippy::result_large_err)]

use crate::error::SeError;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::resolver::resolve;
use crate::vm::compiler::Compiler;
use crate::vm::prelude::Prelude;
use crate::vm::program::Program;
use crate::vm::runtime::{Machine, MachineConfig};
use crate::vm::value::Value;
use log::debug;
use std::rc::Rc;


/// Compiles and evaluates source text against a shared, read-only prelude.
///
/// Every `compile` and `eval` is independent: a failure in one leaves nothing
/// behind for the next.
pub struct Interpreter {
    prelude: Rc<Prelude>,
    config: MachineConfig,
}

impl Interpreter {
    pub fn new(config: MachineConfig) -> Self {
        Self::with_prelude(Rc::new(Prelude::standard()), config)
    }

    pub fn with_prelude(prelude: Rc<Prelude>, config: MachineConfig) -> Self {
        Self { prelude, config }
    }

    pub fn prelude(&self) -> &Rc<Prelude> {
        &self.prelude
    }

    /// Lex, parse, resolve and generate code. The first error from any stage
    /// is returned and no partial program is produced.
    pub fn compile(&self, source: &str) -> Result<Program, SeError> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut expr = Parser::new(tokens).parse_program()?;
        debug!("parsed: {}", expr.node);

        let scopes = resolve(&mut expr, &self.prelude.names())?;
        debug!("resolved {} frame(s)", scopes.len());

        let program = Compiler::compile_program(&scopes, &expr, Rc::clone(&self.prelude))?;
        Ok(program)
    }

    /// Run a compiled program on a fresh machine.
    pub fn eval(&self, program: &Program) -> Result<Value, SeError> {
        let mut machine = Machine::new(self.config);
        let value = machine.run(program)?;
        debug!("evaluated to {value}");
        Ok(value)
    }

    pub fn run(&self, source: &str) -> Result<Value, SeError> {
        let program = self.compile(source)?;
        self.eval(&program)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}
