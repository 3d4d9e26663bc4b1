pub mod ast;


pub use ast::*;

use crate::lexer::{Span, Token, TokenKind};

/// Deepest expression nesting accepted. Infix chains count one level per
/// operator since they build a left-leaning tree just as deep.
const MAX_NESTING: usize = 1000;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}:{}: {}", self.span.line, self.span.column, self.message)
    }
}

impl std::error::Error for ParseError {}

// Precedence levels for Pratt parsing (higher = binds tighter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None = 0,
    Ternary = 1,    // ? :
    Or = 2,         // ||
    And = 3,        // &&
    Comparison = 4, // == != < <= > >=
    Sum = 5,        // + -
    Product = 6,    // * / %
    Prefix = 7,     // ! - (unary)
    Call = 8,       // ()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    /// Parses `stmt; stmt; ...`. A lone expression is returned as-is, anything
    /// longer becomes an implicit top-level block.
    pub fn parse_program(&mut self) -> Result<SpannedExpr, ParseError> {
        let mut statements = self.parse_statements(&TokenKind::Eof)?;
        self.expect(TokenKind::Eof)?;

        if statements.is_empty() {
            return Err(ParseError::new("Expected expression", self.peek().span));
        }

        if statements.len() == 1 {
            return Ok(statements.remove(0));
        }

        let span = statements[0].span.to(statements[statements.len() - 1].span);
        Ok(Spanned::new(Expr::Block(statements), span))
    }

    pub fn parse_expression(&mut self) -> Result<SpannedExpr, ParseError> {
        self.parse_precedence(Precedence::None)
    }

    fn parse_statements(&mut self, terminator: &TokenKind) -> Result<Vec<SpannedExpr>, ParseError> {
        let mut statements = Vec::new();

        while !self.check(terminator) && !self.is_at_end() {
            statements.push(self.parse_statement()?);

            if self.check(&TokenKind::Semicolon) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<SpannedExpr, ParseError> {
        let is_assign = matches!(self.peek().kind, TokenKind::Identifier(_))
            && self.peek_next().is_some_and(|t| t.kind == TokenKind::Equal);

        if !is_assign {
            return self.parse_expression();
        }

        let name_token = self.advance();
        let name = match name_token.kind {
            TokenKind::Identifier(name) => name,
            _ => return Err(ParseError::new("Expected identifier", name_token.span)),
        };
        self.expect(TokenKind::Equal)?;

        let mut value = self.parse_expression()?;
        if let Expr::Lambda(lambda) = &mut value.node {
            lambda.name = Some(name.clone());
        }

        let span = name_token.span.to(value.span);
        Ok(Spanned::new(
            Expr::Assign {
                name,
                value: Box::new(value),
                var: None,
            },
            span,
        ))
    }

    fn parse_precedence(&mut self, min_precedence: Precedence) -> Result<SpannedExpr, ParseError> {
        let depth = self.depth;
        let result = crate::with_stack(|| self.parse_nested(min_precedence));
        self.depth = depth;
        result
    }

    fn parse_nested(&mut self, min_precedence: Precedence) -> Result<SpannedExpr, ParseError> {
        self.nest()?;
        let mut left = self.parse_prefix()?;

        loop {
            let precedence = self.get_infix_precedence(&self.peek().kind);
            if precedence <= min_precedence {
                break;
            }

            self.nest()?;
            left = self.parse_infix(left, precedence)?;
        }

        Ok(left)
    }

    fn nest(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ParseError::new("Expression nested too deeply", self.peek().span));
        }
        Ok(())
    }

    fn parse_prefix(&mut self) -> Result<SpannedExpr, ParseError> {
        let token = self.advance();

        match token.kind {
            TokenKind::Number(n) => Ok(Spanned::new(Expr::Number(n), token.span)),

            TokenKind::Identifier(name) => {
                let ident = Spanned::new(Expr::ident(name), token.span);
                if self.check(&TokenKind::Arrow) {
                    self.advance();
                    return self.parse_lambda_body(vec![ident], token.span);
                }
                Ok(ident)
            }

            TokenKind::Minus => self.parse_unary("neg", token.span),
            TokenKind::Bang => self.parse_unary("not", token.span),

            TokenKind::LeftParen => self.parse_grouping_or_lambda(token.span),

            TokenKind::LeftBrace => self.parse_block(token.span),

            TokenKind::Eof => Err(ParseError::new("Unexpected end of input", token.span)),

            kind => Err(ParseError::new(
                format!("Expected expression, found '{kind}'"),
                token.span,
            )),
        }
    }

    fn parse_unary(&mut self, builtin: &str, op_span: Span) -> Result<SpannedExpr, ParseError> {
        let operand = self.parse_precedence(Precedence::Prefix)?;
        let span = op_span.to(operand.span);
        Ok(Spanned::new(
            Expr::Call {
                callee: Box::new(Spanned::new(Expr::ident(builtin), op_span)),
                args: vec![operand],
            },
            span,
        ))
    }

    fn parse_grouping_or_lambda(&mut self, open_span: Span) -> Result<SpannedExpr, ParseError> {
        let items = self.parse_args()?;
        let close = self.expect(TokenKind::RightParen)?;

        if self.check(&TokenKind::Arrow) {
            self.advance();
            return self.parse_lambda_body(items, open_span);
        }

        let mut items = items;
        if items.len() == 1 {
            return Ok(items.remove(0));
        }

        Err(ParseError::new(
            "Expected '->' after parameter list",
            open_span.to(close.span),
        ))
    }

    fn parse_lambda_body(
        &mut self,
        params: Vec<SpannedExpr>,
        start_span: Span,
    ) -> Result<SpannedExpr, ParseError> {
        let body = self.parse_expression()?;
        let span = start_span.to(body.span);
        Ok(Spanned::new(
            Expr::Lambda(Lambda {
                params,
                body: Box::new(body),
                frame: None,
                name: None,
            }),
            span,
        ))
    }

    fn parse_block(&mut self, open_span: Span) -> Result<SpannedExpr, ParseError> {
        let statements = self.parse_statements(&TokenKind::RightBrace)?;
        let close = self.expect(TokenKind::RightBrace)?;
        Ok(Spanned::new(
            Expr::Block(statements),
            open_span.to(close.span),
        ))
    }

    fn parse_infix(
        &mut self,
        left: SpannedExpr,
        precedence: Precedence,
    ) -> Result<SpannedExpr, ParseError> {
        let token = self.advance();

        match &token.kind {
            TokenKind::LeftParen => {
                let args = self.parse_args()?;
                let end_token = self.expect(TokenKind::RightParen)?;
                let span = left.span.to(end_token.span);
                Ok(Spanned::new(
                    Expr::Call {
                        callee: Box::new(left),
                        args,
                    },
                    span,
                ))
            }

            // Right-associative: the else branch swallows any further ternaries.
            TokenKind::Question => {
                let then = self.parse_expression()?;
                self.expect(TokenKind::Colon)?;
                let otherwise = self.parse_precedence(Precedence::None)?;
                let span = left.span.to(otherwise.span);
                Ok(Spanned::new(
                    Expr::Cond {
                        test: Box::new(left),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                    span,
                ))
            }

            kind => {
                let builtin = builtin_for(kind).ok_or_else(|| {
                    ParseError::new(format!("Unexpected token '{kind}'"), token.span)
                })?;
                let right = self.parse_precedence(precedence)?;
                let span = left.span.to(right.span);
                Ok(Spanned::new(
                    Expr::Call {
                        callee: Box::new(Spanned::new(Expr::ident(builtin), token.span)),
                        args: vec![left, right],
                    },
                    span,
                ))
            }
        }
    }

    fn get_infix_precedence(&self, kind: &TokenKind) -> Precedence {
        match kind {
            TokenKind::LeftParen => Precedence::Call,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Product,
            TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
            TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => Precedence::Comparison,
            TokenKind::AmpAmp => Precedence::And,
            TokenKind::PipePipe => Precedence::Or,
            TokenKind::Question => Precedence::Ternary,
            _ => Precedence::None,
        }
    }

    fn parse_args(&mut self) -> Result<Vec<SpannedExpr>, ParseError> {
        let mut args = Vec::new();

        while !self.check(&TokenKind::RightParen) && !self.is_at_end() {
            args.push(self.parse_expression()?);

            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(args)
    }

    // Helper methods

    /// The token stream always ends in `Eof`, which is never consumed.
    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.position + 1)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(ParseError::new(
                format!("Expected '{kind}', found '{}'", token.kind),
                token.span,
            ))
        }
    }
}

/// Operators are sugar for calls to prelude functions.
fn builtin_for(kind: &TokenKind) -> Option<&'static str> {
    match kind {
        TokenKind::Plus => Some("add"),
        TokenKind::Minus => Some("sub"),
        TokenKind::Star => Some("mul"),
        TokenKind::Slash => Some("div"),
        TokenKind::Percent => Some("mod"),
        TokenKind::EqualEqual => Some("eq"),
        TokenKind::BangEqual => Some("neq"),
        TokenKind::Less => Some("lt"),
        TokenKind::LessEqual => Some("le"),
        TokenKind::Greater => Some("gt"),
        TokenKind::GreaterEqual => Some("ge"),
        TokenKind::AmpAmp => Some("and"),
        TokenKind::PipePipe => Some("or"),
        _ => None,
    }
}
