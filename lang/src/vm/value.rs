use ordered_float::OrderedFloat;
use std::fmt;
use std::rc::Rc;

use super::prelude::Builtin;
use super::program::Function;

/// Runtime value. Numbers are IEEE 754 doubles.
#[derive(Clone, Debug)]
pub enum Value {
    Number(OrderedFloat<f64>),
    Boolean(bool),
    Closure(Rc<Closure>),
}

/// A callable value: compiled code plus the capture values snapshotted when
/// the lambda expression was evaluated.
#[derive(Debug)]
pub struct Closure {
    pub code: Code,
    pub captured: Vec<Value>,
}

#[derive(Debug, Clone)]
pub enum Code {
    Lambda(Rc<Function>),
    Builtin(Builtin),
}

impl Closure {
    pub fn builtin(builtin: Builtin) -> Self {
        Self {
            code: Code::Builtin(builtin),
            captured: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        match &self.code {
            Code::Lambda(function) => function.arity,
            Code::Builtin(builtin) => builtin.arity(),
        }
    }

    pub fn name(&self) -> &str {
        match &self.code {
            Code::Lambda(function) => function.name.as_deref().unwrap_or("<lambda>"),
            Code::Builtin(builtin) => builtin.name(),
        }
    }
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(OrderedFloat(n))
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Closure(_) => "closure",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            // Closures compare by identity (Rc pointer equality)
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n.0),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Closure(closure) => match &closure.code {
                Code::Lambda(_) => write!(f, "<closure {}/{}>", closure.name(), closure.arity()),
                Code::Builtin(builtin) => {
                    write!(f, "<builtin {}/{}>", builtin.name(), builtin.arity())
                }
            },
        }
    }
}
