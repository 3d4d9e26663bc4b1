//! Builtin primitives, exposed to programs as closures.
//!
//! A builtin is applied through the same call protocol as a compiled lambda:
//! its arguments sit below the frame base, the first at offset -2 and the
//! second at offset -3.

use std::rc::Rc;

use super::runtime::{Machine, RuntimeError, RuntimeErrorKind};
use super::value::{Closure, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Neg,
    Not,
}

impl Builtin {
    pub const ALL: [Builtin; 15] = [
        Builtin::Add,
        Builtin::Sub,
        Builtin::Mul,
        Builtin::Div,
        Builtin::Mod,
        Builtin::Eq,
        Builtin::Neq,
        Builtin::Lt,
        Builtin::Le,
        Builtin::Gt,
        Builtin::Ge,
        Builtin::And,
        Builtin::Or,
        Builtin::Neg,
        Builtin::Not,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Add => "add",
            Builtin::Sub => "sub",
            Builtin::Mul => "mul",
            Builtin::Div => "div",
            Builtin::Mod => "mod",
            Builtin::Eq => "eq",
            Builtin::Neq => "neq",
            Builtin::Lt => "lt",
            Builtin::Le => "le",
            Builtin::Gt => "gt",
            Builtin::Ge => "ge",
            Builtin::And => "and",
            Builtin::Or => "or",
            Builtin::Neg => "neg",
            Builtin::Not => "not",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::Neg | Builtin::Not => 1,
            _ => 2,
        }
    }

    /// Reads the arguments from the current frame and computes the result.
    pub fn apply(self, machine: &Machine) -> Result<Value, RuntimeError> {
        let a = machine.load_at(-2)?;

        if self.arity() == 1 {
            return match (self, &a) {
                (Builtin::Neg, Value::Number(n)) => Ok(Value::number(-n.0)),
                (Builtin::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
                _ => Err(self.type_error(&[&a])),
            };
        }

        let b = machine.load_at(-3)?;

        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => self.numeric(x.0, y.0),
            (Value::Boolean(x), Value::Boolean(y)) => match self {
                Builtin::Eq => Ok(Value::Boolean(x == y)),
                Builtin::Neq => Ok(Value::Boolean(x != y)),
                Builtin::And => Ok(Value::Boolean(*x && *y)),
                Builtin::Or => Ok(Value::Boolean(*x || *y)),
                _ => Err(self.type_error(&[&a, &b])),
            },
            _ => Err(self.type_error(&[&a, &b])),
        }
    }

    fn numeric(self, x: f64, y: f64) -> Result<Value, RuntimeError> {
        let value = match self {
            Builtin::Add => Value::number(x + y),
            Builtin::Sub => Value::number(x - y),
            Builtin::Mul => Value::number(x * y),
            Builtin::Div | Builtin::Mod if y == 0.0 => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::DivisionByZero,
                    "Division by zero",
                    0,
                ));
            }
            Builtin::Div => Value::number(x / y),
            Builtin::Mod => Value::number(x % y),
            Builtin::Eq => Value::Boolean(x == y),
            Builtin::Neq => Value::Boolean(x != y),
            Builtin::Lt => Value::Boolean(x < y),
            Builtin::Le => Value::Boolean(x <= y),
            Builtin::Gt => Value::Boolean(x > y),
            Builtin::Ge => Value::Boolean(x >= y),
            Builtin::And | Builtin::Or | Builtin::Neg | Builtin::Not => {
                return Err(self.type_error(&[&Value::number(x), &Value::number(y)]));
            }
        };
        Ok(value)
    }

    fn type_error(self, args: &[&Value]) -> RuntimeError {
        let types: Vec<&str> = args.iter().map(|v| v.type_name()).collect();
        RuntimeError::new(
            RuntimeErrorKind::TypeMismatch,
            format!("Cannot apply {} to {}", self.name(), types.join(" and ")),
            0,
        )
    }
}

/// The fixed table of builtin bindings. Built once and shared read-only by
/// every compilation and evaluation.
#[derive(Debug)]
pub struct Prelude {
    entries: Vec<(&'static str, Value)>,
}

impl Prelude {
    pub fn standard() -> Self {
        let mut entries: Vec<(&'static str, Value)> = Builtin::ALL
            .iter()
            .map(|b| (b.name(), Value::Closure(Rc::new(Closure::builtin(*b)))))
            .collect();
        entries.push(("true", Value::Boolean(true)));
        entries.push(("false", Value::Boolean(false)));
        Self { entries }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).map(|(_, value)| value)
    }

    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.entries.get(index).map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Prelude {
    fn default() -> Self {
        Self::standard()
    }
}
