use std::fmt;

use crate::lexer::Span;
use crate::resolver::{FrameId, Var};

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

pub type SpannedExpr = Spanned<Expr>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),

    /// `var` is empty until the resolver binds the name.
    Ident {
        name: String,
        var: Option<Var>,
    },

    Call {
        callee: Box<SpannedExpr>,
        args: Vec<SpannedExpr>,
    },

    Lambda(Lambda),

    Block(Vec<SpannedExpr>),

    /// `var` is the pre-assigned block slot, filled by the resolver.
    Assign {
        name: String,
        value: Box<SpannedExpr>,
        var: Option<Var>,
    },

    Cond {
        test: Box<SpannedExpr>,
        then: Box<SpannedExpr>,
        otherwise: Box<SpannedExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    /// Parsed as expressions so that a non-identifier parameter can be
    /// reported with its position during resolution.
    pub params: Vec<SpannedExpr>,
    pub body: Box<SpannedExpr>,
    /// Scope table entry, written once by the resolver.
    pub frame: Option<FrameId>,
    /// Binding name when the lambda is the direct right-hand side of an assignment.
    pub name: Option<String>,
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident {
            name: name.into(),
            var: None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.fmt(f)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[SpannedExpr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Ident { name, .. } => write!(f, "{name}"),
            Expr::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            // Parenthesised so a following call cannot be read as part of the body.
            Expr::Lambda(lambda) => {
                write!(f, "((")?;
                write_list(f, &lambda.params, ", ")?;
                write!(f, ") -> {})", lambda.body)
            }
            Expr::Block(stmts) => {
                write!(f, "{{")?;
                write_list(f, stmts, "; ")?;
                write!(f, "}}")
            }
            Expr::Assign { name, value, .. } => write!(f, "{name} = {value}"),
            Expr::Cond {
                test,
                then,
                otherwise,
            } => write!(f, "({test} ? {then} : {otherwise})"),
        }
    }
}
