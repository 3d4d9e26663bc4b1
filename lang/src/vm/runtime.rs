use std::fmt;
use std::rc::Rc;

use log::{debug, trace};

use super::prelude::Prelude;
use super::program::{CaptureSource, Function, Prog, Program};
use super::value::{Closure, Code, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Applied something that is not a closure.
    NotCallable,
    /// A primitive or condition got a value of the wrong kind.
    TypeMismatch,
    /// Argument count differs from the closure's parameter count.
    ArityMismatch,
    DivisionByZero,
    /// Call depth or stack size limit exceeded.
    StackOverflow,
    /// Read of an unset slot or a stack underflow.
    StackFault,
    /// The stack was not empty after a top-level evaluation.
    Unbalanced,
}

/// Stack frame info for error traces
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub function_name: String,
    pub line: u32,
}

/// Runtime error with message and stack trace
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub line: u32,
    /// Innermost call first.
    pub stack_trace: Vec<StackFrame>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
            stack_trace: Vec::new(),
        }
    }

    fn fault(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::StackFault, message, 0)
    }

    /// Fills in the line if the error was raised without one.
    fn at_line(mut self, line: u32) -> Self {
        if self.line == 0 {
            self.line = line;
        }
        self
    }

    fn unwinding(mut self, function_name: &str, line: u32) -> Self {
        self.stack_trace.push(StackFrame {
            function_name: function_name.to_string(),
            line,
        });
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Limits that turn runaway recursion into an error instead of a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub max_call_depth: usize,
    pub max_stack: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_stack: 65_536,
        }
    }
}

/// One operand stack entry.
#[derive(Debug, Clone)]
pub enum Slot {
    Value(Value),
    /// A caller's saved frame base.
    Base(usize),
    /// Reserved but not yet written.
    Uninit,
}

/// Stack machine with a frame base register and an accumulator.
pub struct Machine {
    stack: Vec<Slot>,
    base: usize,
    accumulator: Value,
    depth: usize,
    config: MachineConfig,
    prelude: Option<Rc<Prelude>>,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            stack: Vec::with_capacity(256),
            base: 0,
            accumulator: Value::number(0.0),
            depth: 0,
            config,
            prelude: None,
        }
    }

    /// Evaluates a program. This is the only entry point: every fault raised
    /// while running surfaces here as an error, and the machine is reset at
    /// the start of each run so a failed run leaves nothing behind.
    pub fn run(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        self.reset();
        self.prelude = Some(Rc::clone(&program.prelude));
        debug!("run: main frame size {}", program.main.frame_size);

        let main = &program.main;
        self.grow(main.frame_size as isize)?;
        main.body.exec(self)?;
        self.grow(-(main.frame_size as isize))?;

        if !self.stack.is_empty() {
            let residue = self.stack.len();
            self.reset();
            return Err(RuntimeError::new(
                RuntimeErrorKind::Unbalanced,
                format!("{residue} slot(s) left on the stack"),
                0,
            ));
        }

        Ok(self.accumulator.clone())
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.base = 0;
        self.depth = 0;
        self.accumulator = Value::number(0.0);
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    // Stack primitives

    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.push_slot(Slot::Value(value))
    }

    fn push_slot(&mut self, slot: Slot) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.max_stack {
            return Err(RuntimeError::new(
                RuntimeErrorKind::StackOverflow,
                "Stack overflow",
                0,
            ));
        }
        self.stack.push(slot);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Slot, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::fault("Stack underflow"))
    }

    /// Reserves (`delta > 0`) or releases (`delta < 0`) slots at the top.
    pub fn grow(&mut self, delta: isize) -> Result<(), RuntimeError> {
        if delta >= 0 {
            for _ in 0..delta {
                self.push_slot(Slot::Uninit)?;
            }
            return Ok(());
        }

        let count = delta.unsigned_abs();
        if count > self.stack.len() {
            return Err(RuntimeError::fault("Stack underflow"));
        }
        self.stack.truncate(self.stack.len() - count);
        Ok(())
    }

    fn index(&self, offset: isize) -> Result<usize, RuntimeError> {
        let index = self.base as isize + offset;
        if index < 0 || index as usize >= self.stack.len() {
            return Err(RuntimeError::fault(format!(
                "Frame offset {offset} out of bounds (base {}, stack {})",
                self.base,
                self.stack.len()
            )));
        }
        Ok(index as usize)
    }

    pub fn load_at(&self, offset: isize) -> Result<Value, RuntimeError> {
        match &self.stack[self.index(offset)?] {
            Slot::Value(value) => Ok(value.clone()),
            Slot::Uninit => Err(RuntimeError::fault(format!(
                "Read of uninitialized slot at offset {offset}"
            ))),
            Slot::Base(_) => Err(RuntimeError::fault(format!(
                "Read of saved frame base at offset {offset}"
            ))),
        }
    }

    pub fn store_at(&mut self, offset: isize, value: Value) -> Result<(), RuntimeError> {
        let index = self.index(offset)?;
        self.stack[index] = Slot::Value(value);
        Ok(())
    }

    fn prelude_value(&self, index: usize) -> Result<Value, RuntimeError> {
        self.prelude
            .as_ref()
            .and_then(|prelude| prelude.get(index))
            .cloned()
            .ok_or_else(|| RuntimeError::fault(format!("Unknown prelude entry {index}")))
    }

    // Function calling

    /// The call protocol, entered with the arguments already pushed
    /// right-to-left. Leaves the result in the accumulator and the stack as
    /// it was before the arguments were pushed.
    fn call(&mut self, closure: &Rc<Closure>, argc: usize, line: u32) -> Result<(), RuntimeError> {
        let arity = closure.arity();
        if argc != arity {
            return Err(RuntimeError::new(
                RuntimeErrorKind::ArityMismatch,
                format!(
                    "{} expects {arity} argument(s) but got {argc}",
                    closure.name()
                ),
                line,
            ));
        }

        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::new(
                RuntimeErrorKind::StackOverflow,
                format!("Call depth exceeded {}", self.config.max_call_depth),
                line,
            ));
        }

        self.push_slot(Slot::Base(self.base))
            .map_err(|e| e.at_line(line))?;
        self.base = self.stack.len();
        self.depth += 1;
        trace!(
            "call {} argc={argc} base={} depth={}",
            closure.name(),
            self.base,
            self.depth
        );

        let result = match &closure.code {
            Code::Lambda(function) => self.enter(function, closure),
            Code::Builtin(builtin) => builtin.apply(self).map(|value| {
                self.accumulator = value;
            }),
        };
        result.map_err(|e| e.at_line(line).unwinding(closure.name(), line))?;

        match self.pop()? {
            Slot::Base(saved) => self.base = saved,
            other => {
                return Err(RuntimeError::fault(format!(
                    "Expected saved frame base, found {other:?}"
                ))
                .at_line(line));
            }
        }
        self.grow(-(argc as isize))?;
        self.depth -= 1;
        Ok(())
    }

    /// Reserves the callee's locals and captures, runs its body, and frees
    /// them again.
    fn enter(&mut self, function: &Function, closure: &Rc<Closure>) -> Result<(), RuntimeError> {
        self.grow(function.frame_size as isize)?;

        let mut captured = closure.captured.iter();
        for capture in &function.captures {
            let value = match capture.source {
                CaptureSource::Frame(_) => captured
                    .next()
                    .cloned()
                    .ok_or_else(|| RuntimeError::fault("Closure is missing a captured value"))?,
                CaptureSource::Itself => Value::Closure(Rc::clone(closure)),
            };
            self.store_at(capture.slot as isize, value)?;
        }

        function.body.exec(self)?;

        debug_assert_eq!(self.stack.len(), self.base + function.frame_size);
        self.grow(-(function.frame_size as isize))
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl Prog {
    /// Executes this node, leaving its value in the accumulator.
    pub fn exec(&self, machine: &mut Machine) -> Result<(), RuntimeError> {
        crate::with_stack(|| self.exec_node(machine))
    }

    fn exec_node(&self, machine: &mut Machine) -> Result<(), RuntimeError> {
        match self {
            Prog::Const(value) => {
                machine.accumulator = value.clone();
            }

            Prog::FrameLoad(offset) => {
                machine.accumulator = machine.load_at(*offset)?;
            }

            Prog::Prelude(index) => {
                machine.accumulator = machine.prelude_value(*index)?;
            }

            Prog::Store { slot, value } => {
                value.exec(machine)?;
                let value = machine.accumulator.clone();
                machine.store_at(*slot as isize, value)?;
            }

            Prog::Block { stores, result } => {
                for store in stores {
                    store.exec(machine)?;
                }
                result.exec(machine)?;
            }

            Prog::Cond {
                test,
                then,
                otherwise,
                line,
            } => {
                test.exec(machine)?;
                match machine.accumulator.as_bool() {
                    Some(true) => then.exec(machine)?,
                    Some(false) => otherwise.exec(machine)?,
                    None => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::TypeMismatch,
                            format!(
                                "Condition must be a boolean, got {}",
                                machine.accumulator.type_name()
                            ),
                            *line,
                        ));
                    }
                }
            }

            // Captures are read from the current frame now and never again.
            Prog::MakeClosure(function) => {
                let captured = function
                    .capture_sources()
                    .map(|offset| machine.load_at(offset))
                    .collect::<Result<Vec<_>, _>>()?;
                machine.accumulator = Value::Closure(Rc::new(Closure {
                    code: Code::Lambda(Rc::clone(function)),
                    captured,
                }));
            }

            Prog::Call { callee, args, line } => {
                callee.exec(machine)?;
                let closure = match &machine.accumulator {
                    Value::Closure(closure) => Rc::clone(closure),
                    other => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::NotCallable,
                            format!("Cannot call {} `{other}`", other.type_name()),
                            *line,
                        ));
                    }
                };

                for arg in args.iter().rev() {
                    arg.exec(machine)?;
                    let value = machine.accumulator.clone();
                    machine.push(value).map_err(|e| e.at_line(*line))?;
                }

                machine.call(&closure, args.len(), *line)?;
            }
        }
        Ok(())
    }
}
