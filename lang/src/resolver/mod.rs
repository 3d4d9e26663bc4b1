//! Binds every identifier to a storage location and computes the capture
//! list of every lambda.
//!
//! Resolution walks the tree once with a stack of frames. Lambda frames own
//! a slot space; block frames hoist their locals into the slot space of the
//! nearest enclosing lambda. A name defined outside the current lambda is
//! captured one hop per nesting level, so an inner lambda always copies from
//! its immediate parent's frame.

#[cfg(test)]
mod tests;

use std::fmt;
use std::ops::Index;

use log::trace;

use crate::lexer::Span;
use crate::parser::{Expr, Lambda, SpannedExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub usize);

impl FrameId {
    /// The implicit zero-parameter frame that top-level code runs in.
    pub const MAIN: FrameId = FrameId(0);
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    /// Parameter `i` of the enclosing lambda, below the frame base.
    Arg(usize),
    /// Block-local slot of the enclosing lambda, at or above the frame base.
    Local(usize),
    /// Entry `index` of `frame`'s capture list.
    Captured { frame: FrameId, index: usize },
    /// Builtin with a fixed address; never captured.
    Prelude(usize),
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Arg(i) => write!(f, "arg{i}"),
            Var::Local(slot) => write!(f, "local{slot}"),
            Var::Captured { frame, index } => write!(f, "cap{frame}:{index}"),
            Var::Prelude(i) => write!(f, "prelude{i}"),
        }
    }
}

/// Where a capture slot gets its value when the closure is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A variable of the immediately enclosing lambda frame.
    Parent(Var),
    /// The closure itself, for a lambda bound by the assignment it refers to.
    Recursive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: String,
    pub source: Source,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub slot: usize,
}

/// Metadata for one lambda (or the main frame).
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub name: Option<String>,
    pub parent: Option<FrameId>,
    pub params: Vec<String>,
    pub locals: Vec<Local>,
    pub captures: Vec<Capture>,
}

impl Scope {
    fn new(name: Option<String>, parent: Option<FrameId>, params: Vec<String>) -> Self {
        Self {
            name,
            parent,
            params,
            locals: Vec::new(),
            captures: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Slots reserved above the frame base: block locals plus captures.
    pub fn frame_size(&self) -> usize {
        self.locals.len() + self.captures.len()
    }

    /// Parameters, locals and captures together.
    pub fn slot_count(&self) -> usize {
        self.arity() + self.frame_size()
    }
}

/// Arena of lambda scopes, indexed by [`FrameId`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scopes {
    scopes: Vec<Scope>,
}

impl Scopes {
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameId, &Scope)> {
        self.scopes.iter().enumerate().map(|(i, s)| (FrameId(i), s))
    }

    /// Follows a capture chain down to the variable it was copied from.
    /// A recursive capture is its own origin.
    pub fn origin(&self, var: Var) -> Var {
        let mut var = var;
        while let Var::Captured { frame, index } = var {
            match self[frame].captures[index].source {
                Source::Parent(parent) => var = parent,
                Source::Recursive => break,
            }
        }
        var
    }

    fn push(&mut self, scope: Scope) -> FrameId {
        self.scopes.push(scope);
        FrameId(self.scopes.len() - 1)
    }

    fn alloc_local(&mut self, frame: FrameId, name: &str) -> usize {
        let scope = &mut self.scopes[frame.0];
        let slot = scope.frame_size();
        scope.locals.push(Local {
            name: name.to_string(),
            slot,
        });
        slot
    }

    fn capture(&mut self, frame: FrameId, name: &str, source: Source) -> Var {
        let scope = &mut self.scopes[frame.0];
        if let Some(index) = scope.captures.iter().position(|c| c.name == name) {
            return Var::Captured { frame, index };
        }

        let slot = scope.frame_size();
        let index = scope.captures.len();
        scope.captures.push(Capture {
            name: name.to_string(),
            source,
            slot,
        });
        trace!("capture `{name}` into frame {frame} slot {slot} from {source:?}");
        Var::Captured { frame, index }
    }

    /// Human-readable table of every scope, in slot order.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (id, scope) in self.iter() {
            let name = match (&scope.name, id) {
                (Some(name), _) => name.as_str(),
                (None, FrameId::MAIN) => "<main>",
                (None, _) => "<lambda>",
            };
            out.push_str(&format!(
                "frame {id} {name}({}) slots={}\n",
                scope.params.join(", "),
                scope.frame_size()
            ));

            let mut rows: Vec<(usize, String)> = scope
                .locals
                .iter()
                .map(|l| (l.slot, format!("local {}", l.name)))
                .collect();
            for capture in &scope.captures {
                let from = match capture.source {
                    Source::Parent(var) => var.to_string(),
                    Source::Recursive => "self".to_string(),
                };
                rows.push((capture.slot, format!("capture {} <- {from}", capture.name)));
            }
            rows.sort_by_key(|(slot, _)| *slot);

            for (slot, row) in rows {
                out.push_str(&format!("  [{slot}] {row}\n"));
            }
        }
        out
    }
}

impl Index<FrameId> for Scopes {
    type Output = Scope;

    fn index(&self, id: FrameId) -> &Scope {
        &self.scopes[id.0]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveError {
    pub message: String,
    pub span: Span,
}

impl ResolveError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{}: {}", self.span.line, self.span.column, self.message)
    }
}

impl std::error::Error for ResolveError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalState {
    /// Assigned later in the block.
    Pending,
    /// Its own right-hand side is being resolved.
    Defining,
    Defined,
}

#[derive(Debug)]
struct BlockLocal {
    name: String,
    slot: usize,
    state: LocalState,
}

#[derive(Debug)]
enum Frame {
    Prelude,
    Lambda {
        id: FrameId,
        params: Vec<String>,
        binding: Option<String>,
    },
    Block {
        owner: FrameId,
        locals: Vec<BlockLocal>,
    },
}

pub struct Resolver<'a> {
    prelude: &'a [&'a str],
    frames: Vec<Frame>,
    scopes: Scopes,
}

/// Resolves a whole program against the given builtin names. The program
/// runs in the main frame, so top-level block locals get slots there.
pub fn resolve(program: &mut SpannedExpr, prelude: &[&str]) -> Result<Scopes, ResolveError> {
    let mut resolver = Resolver::new(prelude);
    resolver.resolve_program(program)?;
    Ok(resolver.scopes)
}

impl<'a> Resolver<'a> {
    pub fn new(prelude: &'a [&'a str]) -> Self {
        Self {
            prelude,
            frames: vec![Frame::Prelude],
            scopes: Scopes::default(),
        }
    }

    pub fn resolve_program(&mut self, program: &mut SpannedExpr) -> Result<(), ResolveError> {
        let main = self.scopes.push(Scope::new(None, None, Vec::new()));
        self.frames.push(Frame::Lambda {
            id: main,
            params: Vec::new(),
            binding: None,
        });
        self.resolve(program)?;
        self.frames.pop();
        Ok(())
    }

    fn resolve(&mut self, expr: &mut SpannedExpr) -> Result<(), ResolveError> {
        crate::with_stack(|| self.resolve_node(expr))
    }

    fn resolve_node(&mut self, expr: &mut SpannedExpr) -> Result<(), ResolveError> {
        let span = expr.span;
        match &mut expr.node {
            Expr::Number(_) => Ok(()),

            Expr::Ident { name, var } => {
                *var = Some(self.lookup(name, span)?);
                Ok(())
            }

            Expr::Call { callee, args } => {
                self.resolve(callee)?;
                for arg in args {
                    self.resolve(arg)?;
                }
                Ok(())
            }

            Expr::Lambda(lambda) => self.resolve_lambda(lambda, None),

            Expr::Block(stmts) => self.resolve_block(stmts, span),

            Expr::Assign { name, .. } => Err(ResolveError::new(
                format!("assignment to `{name}` outside a block"),
                span,
            )),

            Expr::Cond {
                test,
                then,
                otherwise,
            } => {
                self.resolve(test)?;
                self.resolve(then)?;
                self.resolve(otherwise)
            }
        }
    }

    fn resolve_lambda(
        &mut self,
        lambda: &mut Lambda,
        binding: Option<String>,
    ) -> Result<(), ResolveError> {
        let mut params: Vec<String> = Vec::new();
        for (i, param) in lambda.params.iter_mut().enumerate() {
            let span = param.span;
            match &mut param.node {
                Expr::Ident { name, var } => {
                    if params.contains(name) {
                        return Err(ResolveError::new(
                            format!("duplicate parameter `{name}`"),
                            span,
                        ));
                    }
                    params.push(name.clone());
                    *var = Some(Var::Arg(i));
                }
                other => {
                    return Err(ResolveError::new(
                        format!("lambda parameter must be an identifier, found `{other}`"),
                        span,
                    ));
                }
            }
        }

        if lambda.name.is_none() {
            lambda.name = binding.clone();
        }

        let parent = self.current_lambda();
        let id = self
            .scopes
            .push(Scope::new(lambda.name.clone(), Some(parent), params.clone()));
        self.frames.push(Frame::Lambda {
            id,
            params,
            binding,
        });
        self.resolve(&mut lambda.body)?;
        self.frames.pop();

        lambda.frame = Some(id);
        Ok(())
    }

    fn resolve_block(&mut self, stmts: &mut [SpannedExpr], span: Span) -> Result<(), ResolveError> {
        let Some((last, assigns)) = stmts.split_last_mut() else {
            return Err(ResolveError::new("block must end with an expression", span));
        };
        if matches!(last.node, Expr::Assign { .. }) {
            return Err(ResolveError::new(
                "block must end with an expression",
                last.span,
            ));
        }

        // Every left-hand side gets its slot before any right-hand side is seen.
        let owner = self.current_lambda();
        let mut locals: Vec<BlockLocal> = Vec::new();
        for stmt in assigns.iter() {
            match &stmt.node {
                Expr::Assign { name, .. } => {
                    if locals.iter().any(|l| &l.name == name) {
                        return Err(ResolveError::new(
                            format!("`{name}` is assigned twice in the same block"),
                            stmt.span,
                        ));
                    }
                    let slot = self.scopes.alloc_local(owner, name);
                    locals.push(BlockLocal {
                        name: name.clone(),
                        slot,
                        state: LocalState::Pending,
                    });
                }
                _ => {
                    return Err(ResolveError::new(
                        "only the last statement of a block may be an expression",
                        stmt.span,
                    ));
                }
            }
        }

        self.frames.push(Frame::Block { owner, locals });
        let depth = self.frames.len() - 1;

        for (i, stmt) in assigns.iter_mut().enumerate() {
            if let Expr::Assign { name, value, var } = &mut stmt.node {
                let slot = self.set_state(depth, i, LocalState::Defining);
                *var = Some(Var::Local(slot));

                match &mut value.node {
                    Expr::Lambda(lambda) => self.resolve_lambda(lambda, Some(name.clone()))?,
                    _ => self.resolve(value)?,
                }

                self.set_state(depth, i, LocalState::Defined);
            }
        }

        self.resolve(last)?;
        self.frames.pop();
        Ok(())
    }

    fn set_state(&mut self, depth: usize, index: usize, state: LocalState) -> usize {
        match &mut self.frames[depth] {
            Frame::Block { locals, .. } => {
                locals[index].state = state;
                locals[index].slot
            }
            _ => unreachable!("block frame expected at depth {depth}"),
        }
    }

    fn current_lambda(&self) -> FrameId {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Lambda { id, .. } => return *id,
                Frame::Block { owner, .. } => return *owner,
                Frame::Prelude => {}
            }
        }
        FrameId::MAIN
    }

    fn lookup(&mut self, name: &str, span: Span) -> Result<Var, ResolveError> {
        let mut found = None;

        for (depth, frame) in self.frames.iter().enumerate().rev() {
            match frame {
                Frame::Lambda { params, .. } => {
                    if let Some(i) = params.iter().position(|p| p == name) {
                        found = Some((depth, Var::Arg(i), false));
                        break;
                    }
                }
                Frame::Block { locals, .. } => {
                    if let Some(local) = locals.iter().find(|l| l.name == name) {
                        let recursive = match local.state {
                            LocalState::Defined => false,
                            LocalState::Defining if self.is_binding_lambda(depth + 1, name) => true,
                            LocalState::Pending | LocalState::Defining => {
                                return Err(ResolveError::new(
                                    format!("`{name}` used before assignment"),
                                    span,
                                ));
                            }
                        };
                        found = Some((depth, Var::Local(local.slot), recursive));
                        break;
                    }
                }
                Frame::Prelude => {
                    if let Some(i) = self.prelude.iter().position(|p| *p == name) {
                        return Ok(Var::Prelude(i));
                    }
                }
            }
        }

        let Some((depth, var, recursive)) = found else {
            return Err(ResolveError::new(format!("undefined: {name}"), span));
        };

        let crossed: Vec<FrameId> = self.frames[depth + 1..]
            .iter()
            .filter_map(|frame| match frame {
                Frame::Lambda { id, .. } => Some(*id),
                _ => None,
            })
            .collect();

        let mut var = var;
        let mut source = if recursive {
            Source::Recursive
        } else {
            Source::Parent(var)
        };
        for frame in crossed {
            var = self.scopes.capture(frame, name, source);
            source = Source::Parent(var);
        }

        Ok(var)
    }

    /// True when the frame at `depth` is the lambda being bound to `name`.
    fn is_binding_lambda(&self, depth: usize, name: &str) -> bool {
        matches!(
            self.frames.get(depth),
            Some(Frame::Lambda { binding: Some(b), .. }) if b == name
        )
    }
}
