use std::rc::Rc;

use log::debug;

use crate::lexer::Span;
use crate::parser::ast::{Expr, Lambda, SpannedExpr};
use crate::resolver::{FrameId, Scopes, Source, Var};

use super::prelude::Prelude;
use super::program::{CaptureLoad, CaptureSource, Function, Prog, Program};
use super::value::Value;

/// Compile error with source location
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub span: Span,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Compile error at {}:{}: {}", self.span.line, self.span.column, self.message)
    }
}

impl std::error::Error for CompileError {}

/// Lowers a resolved tree into program nodes.
pub struct Compiler<'a> {
    scopes: &'a Scopes,
    functions: usize,
}

impl<'a> Compiler<'a> {
    pub fn new(scopes: &'a Scopes) -> Self {
        Self {
            scopes,
            functions: 0,
        }
    }

    /// Compile a resolved program. The tree must have gone through the
    /// resolver with the same prelude.
    pub fn compile_program(
        scopes: &Scopes,
        expr: &SpannedExpr,
        prelude: Rc<Prelude>,
    ) -> Result<Program, CompileError> {
        let mut compiler = Compiler::new(scopes);
        let main = compiler.function(FrameId::MAIN, expr)?;
        debug!("compiled {} function(s)", compiler.functions);
        Ok(Program {
            main: Rc::new(main),
            prelude,
        })
    }

    fn function(&mut self, frame: FrameId, body: &SpannedExpr) -> Result<Function, CompileError> {
        let scopes = self.scopes;
        let scope = &scopes[frame];
        let parent = scope.parent;

        let mut captures = Vec::with_capacity(scope.captures.len());
        for capture in &scope.captures {
            let source = match (capture.source, parent) {
                (Source::Recursive, _) => CaptureSource::Itself,
                // Offsets are relative to the creating frame.
                (Source::Parent(var), Some(parent)) => {
                    CaptureSource::Frame(self.offset(parent, var, body.span)?)
                }
                (Source::Parent(_), None) => {
                    return Err(CompileError::new(
                        format!("`{}` captured into a frame with no parent", capture.name),
                        body.span,
                    ));
                }
            };
            captures.push(CaptureLoad {
                slot: capture.slot,
                source,
            });
        }

        let body = self.expression(frame, body)?;
        self.functions += 1;

        Ok(Function {
            name: scope.name.clone(),
            arity: scope.arity(),
            frame_size: scope.frame_size(),
            captures,
            body,
        })
    }

    fn expression(&mut self, frame: FrameId, expr: &SpannedExpr) -> Result<Prog, CompileError> {
        crate::with_stack(|| self.expression_node(frame, expr))
    }

    fn expression_node(
        &mut self,
        frame: FrameId,
        expr: &SpannedExpr,
    ) -> Result<Prog, CompileError> {
        match &expr.node {
            Expr::Number(n) => Ok(Prog::Const(Value::number(*n))),

            Expr::Ident { name, var } => match var {
                Some(var) => self.load(frame, *var, expr.span),
                None => Err(CompileError::new(
                    format!("unresolved identifier `{name}`"),
                    expr.span,
                )),
            },

            Expr::Call { callee, args } => {
                let callee = self.expression(frame, callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.expression(frame, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Prog::Call {
                    callee: Box::new(callee),
                    args,
                    line: expr.span.line,
                })
            }

            Expr::Lambda(lambda) => self.lambda(lambda, expr.span),

            Expr::Block(stmts) => self.block(frame, stmts, expr.span),

            Expr::Assign { name, .. } => Err(CompileError::new(
                format!("assignment to `{name}` outside a block"),
                expr.span,
            )),

            Expr::Cond {
                test,
                then,
                otherwise,
            } => Ok(Prog::Cond {
                test: Box::new(self.expression(frame, test)?),
                then: Box::new(self.expression(frame, then)?),
                otherwise: Box::new(self.expression(frame, otherwise)?),
                line: expr.span.line,
            }),
        }
    }

    fn lambda(&mut self, lambda: &Lambda, span: Span) -> Result<Prog, CompileError> {
        let frame = lambda
            .frame
            .ok_or_else(|| CompileError::new("unresolved lambda", span))?;
        let function = self.function(frame, &lambda.body)?;
        Ok(Prog::MakeClosure(Rc::new(function)))
    }

    fn block(
        &mut self,
        frame: FrameId,
        stmts: &[SpannedExpr],
        span: Span,
    ) -> Result<Prog, CompileError> {
        let Some((last, assigns)) = stmts.split_last() else {
            return Err(CompileError::new("block must end with an expression", span));
        };

        let mut stores = Vec::with_capacity(assigns.len());
        for stmt in assigns {
            match &stmt.node {
                Expr::Assign {
                    value,
                    var: Some(Var::Local(slot)),
                    ..
                } => stores.push(Prog::Store {
                    slot: *slot,
                    value: Box::new(self.expression(frame, value)?),
                }),
                Expr::Assign { name, .. } => {
                    return Err(CompileError::new(
                        format!("assignment to `{name}` has no local slot"),
                        stmt.span,
                    ));
                }
                _ => {
                    return Err(CompileError::new(
                        "only the last statement of a block may be an expression",
                        stmt.span,
                    ));
                }
            }
        }

        let result = self.expression(frame, last)?;
        Ok(Prog::Block {
            stores,
            result: Box::new(result),
        })
    }

    fn load(&self, frame: FrameId, var: Var, span: Span) -> Result<Prog, CompileError> {
        match var {
            Var::Prelude(index) => Ok(Prog::Prelude(index)),
            _ => Ok(Prog::FrameLoad(self.offset(frame, var, span)?)),
        }
    }

    /// Base-relative offset of `var` inside `frame`. Argument `i` lives at
    /// `-(i + 2)` because `base - 1` holds the caller's saved base.
    fn offset(&self, frame: FrameId, var: Var, span: Span) -> Result<isize, CompileError> {
        match var {
            Var::Arg(i) => Ok(-(i as isize) - 2),
            Var::Local(slot) => Ok(slot as isize),
            Var::Captured { frame: owner, index } => {
                if owner != frame {
                    return Err(CompileError::new(
                        format!("capture of frame {owner} used from frame {frame}"),
                        span,
                    ));
                }
                Ok(self.scopes[owner].captures[index].slot as isize)
            }
            Var::Prelude(index) => Err(CompileError::new(
                format!("prelude entry {index} has no frame slot"),
                span,
            )),
        }
    }
}
