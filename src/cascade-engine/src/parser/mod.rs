// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent parser for parameter expressions.
//!
//! Builtin calls are resolved against the whitelist in `builtins` while
//! parsing, so an `Expr` never contains a call to an unknown function.
//! The bare names `t`, `dt` and `pi` are read as 0-arity builtins.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::builtins::{self, Loc, is_0_arity_builtin_fn};
use crate::common::{EquationError, ErrorCode};
use crate::token::{Lexer, Spanned, Token};


/// TokenKind discriminant for efficient peek comparisons without payload matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    If,
    Then,
    Else,
    Eq,
    Neq,
    Not,
    Mod,
    Exp,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Plus,
    Minus,
    Mul,
    Div,
    LParen,
    RParen,
    Comma,
    Nan,
    Ident,
    Num,
}

impl<'a> From<&Token<'a>> for TokenKind {
    fn from(token: &Token<'a>) -> Self {
        match token {
            Token::If => TokenKind::If,
            Token::Then => TokenKind::Then,
            Token::Else => TokenKind::Else,
            Token::Eq => TokenKind::Eq,
            Token::Neq => TokenKind::Neq,
            Token::Not => TokenKind::Not,
            Token::Mod => TokenKind::Mod,
            Token::Exp => TokenKind::Exp,
            Token::Lt => TokenKind::Lt,
            Token::Lte => TokenKind::Lte,
            Token::Gt => TokenKind::Gt,
            Token::Gte => TokenKind::Gte,
            Token::And => TokenKind::And,
            Token::Or => TokenKind::Or,
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Mul => TokenKind::Mul,
            Token::Div => TokenKind::Div,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::Comma => TokenKind::Comma,
            Token::Nan => TokenKind::Nan,
            Token::Ident(_) => TokenKind::Ident,
            Token::Num(_) => TokenKind::Num,
        }
    }
}

/// quoted identifiers come out of the lexer with their quotes attached
fn canonical_ident(s: &str) -> String {
    let s = s
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s);
    s.trim().to_owned()
}

/// Parser state holding tokenized input
struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
}

impl<'input> Parser<'input> {
    /// Collect all tokens up front, failing on the first lexer error.
    fn new(lexer: Lexer<'input>) -> Result<Self, EquationError> {
        let tokens = lexer.collect::<Result<Vec<_>, _>>()?;
        Ok(Parser { tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|(_, tok, _)| TokenKind::from(tok))
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens
            .get(self.pos + offset)
            .map(|(_, tok, _)| TokenKind::from(tok))
    }

    /// Advance to the next token and return a copy of the consumed token
    fn advance(&mut self) -> Option<Spanned<Token<'input>>> {
        let tok = self.tokens.get(self.pos).copied();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn unexpected(&self) -> EquationError {
        if let Some((start, _, end)) = self.peek() {
            EquationError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::UnrecognizedToken,
            }
        } else {
            let pos = self.eof_position();
            EquationError {
                start: pos as u16,
                end: (pos + 1) as u16,
                code: ErrorCode::UnrecognizedEof,
            }
        }
    }

    /// Expect the current token to match the expected kind, returning an error if not
    fn expect(&mut self, expected: TokenKind) -> Result<Spanned<Token<'input>>, EquationError> {
        if self.peek_kind() == Some(expected) {
            self.advance().ok_or_else(|| self.unexpected())
        } else {
            Err(self.unexpected())
        }
    }

    fn eof_position(&self) -> usize {
        if let Some((_, _, end)) = self.tokens.last() {
            *end
        } else {
            0
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn parse_equation(&mut self) -> Result<Expr, EquationError> {
        if self.is_at_end() {
            return Err(EquationError {
                start: 0,
                end: 0,
                code: ErrorCode::EmptyEquation,
            });
        }

        let expr = self.parse_expr()?;

        if let Some((start, _, end)) = self.peek() {
            return Err(EquationError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::ExtraToken,
            });
        }

        Ok(expr)
    }

    /// Parse a top-level expression (includes if-then-else)
    fn parse_expr(&mut self) -> Result<Expr, EquationError> {
        if self.peek_kind() == Some(TokenKind::If) {
            self.parse_if()
        } else {
            self.parse_or()
        }
    }

    fn parse_if(&mut self) -> Result<Expr, EquationError> {
        let (lpos, _, _) = self.expect(TokenKind::If)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Then)?;
        let then_expr = self.parse_expr()?;
        self.expect(TokenKind::Else)?;
        let else_expr = self.parse_expr()?;
        let rpos = else_expr.get_loc().end as usize;
        Ok(Expr::If(
            Box::new(cond),
            Box::new(then_expr),
            Box::new(else_expr),
            Loc::new(lpos, rpos),
        ))
    }

    /// parse_binary handles one left-associative precedence level
    fn parse_binary<F>(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        mut next: F,
    ) -> Result<Expr, EquationError>
    where
        F: FnMut(&mut Self) -> Result<Expr, EquationError>,
    {
        let mut left = next(self)?;

        while let Some(op) = self
            .peek_kind()
            .and_then(|kind| ops.iter().find(|(k, _)| *k == kind).map(|(_, op)| *op))
        {
            self.advance();
            let right = next(self)?;
            let loc = left.get_loc().union(&right.get_loc());
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, EquationError> {
        self.parse_binary(&[(TokenKind::Or, BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, EquationError> {
        self.parse_binary(&[(TokenKind::And, BinaryOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, EquationError> {
        self.parse_binary(
            &[(TokenKind::Eq, BinaryOp::Eq), (TokenKind::Neq, BinaryOp::Neq)],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, EquationError> {
        self.parse_binary(
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Lte, BinaryOp::Lte),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::Gte, BinaryOp::Gte),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, EquationError> {
        self.parse_binary(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EquationError> {
        self.parse_binary(
            &[
                (TokenKind::Mul, BinaryOp::Mul),
                (TokenKind::Div, BinaryOp::Div),
                (TokenKind::Mod, BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    /// Parse unary operators (+, -, !, not)
    fn parse_unary(&mut self) -> Result<Expr, EquationError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => UnaryOp::Positive,
            Some(TokenKind::Minus) => UnaryOp::Negative,
            Some(TokenKind::Not) => UnaryOp::Not,
            _ => return self.parse_exponentiation(),
        };
        let (lpos, _, _) = self.advance().ok_or_else(|| self.unexpected())?;
        let operand = self.parse_unary()?;
        let rpos = operand.get_loc().end as usize;
        Ok(Expr::Op1(op, Box::new(operand), Loc::new(lpos, rpos)))
    }

    /// Parse exponentiation (^ and **), left associative
    fn parse_exponentiation(&mut self) -> Result<Expr, EquationError> {
        self.parse_binary(&[(TokenKind::Exp, BinaryOp::Exp)], Self::parse_app)
    }

    /// Parse function application: id(args)
    fn parse_app(&mut self) -> Result<Expr, EquationError> {
        if self.peek_kind() != Some(TokenKind::Ident)
            || self.peek_kind_at(1) != Some(TokenKind::LParen)
        {
            return self.parse_atom();
        }

        let (lpos, tok, _) = self.advance().ok_or_else(|| self.unexpected())?;
        let name = match tok {
            Token::Ident(s) => canonical_ident(s).to_lowercase(),
            _ => return Err(self.unexpected()),
        };

        self.advance(); // consume '('
        let args = self.parse_comma_separated_exprs()?;
        let (_, _, rpos) = self.expect(TokenKind::RParen)?;

        let loc = Loc::new(lpos, rpos);
        let builtin = builtins::resolve(&name, args, loc)?;
        Ok(Expr::App(builtin, loc))
    }

    /// Parse an atomic expression (number, identifier, parenthesized expression)
    fn parse_atom(&mut self) -> Result<Expr, EquationError> {
        match self.peek_kind() {
            Some(TokenKind::Num) => {
                let (lpos, tok, rpos) = self.advance().ok_or_else(|| self.unexpected())?;
                let s = match tok {
                    Token::Num(s) => s,
                    _ => return Err(self.unexpected()),
                };
                match s.parse::<f64>() {
                    Ok(n) => Ok(Expr::Const(s.to_owned(), n, Loc::new(lpos, rpos))),
                    Err(_) => Err(EquationError {
                        start: lpos as u16,
                        end: rpos as u16,
                        code: ErrorCode::ExpectedNumber,
                    }),
                }
            }
            Some(TokenKind::Nan) => {
                let (lpos, _, rpos) = self.advance().ok_or_else(|| self.unexpected())?;
                Ok(Expr::Const(
                    "NaN".to_owned(),
                    f64::NAN,
                    Loc::new(lpos, rpos),
                ))
            }
            Some(TokenKind::Ident) => {
                let (lpos, tok, rpos) = self.advance().ok_or_else(|| self.unexpected())?;
                let loc = Loc::new(lpos, rpos);
                let (quoted, name) = match tok {
                    Token::Ident(s) => (s.starts_with('"'), canonical_ident(s)),
                    _ => return Err(self.unexpected()),
                };
                if !quoted && is_0_arity_builtin_fn(&name) {
                    let builtin = builtins::resolve(&name, vec![], loc)?;
                    return Ok(Expr::App(builtin, loc));
                }
                Ok(Expr::Var(name, loc))
            }
            Some(TokenKind::LParen) => {
                self.advance(); // consume '('
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Parse comma-separated expressions (for function arguments)
    fn parse_comma_separated_exprs(&mut self) -> Result<Vec<Expr>, EquationError> {
        let mut exprs = Vec::new();

        if self.peek_kind() == Some(TokenKind::RParen) {
            return Ok(exprs);
        }

        exprs.push(self.parse_expr()?);

        while self.peek_kind() == Some(TokenKind::Comma) {
            self.advance(); // consume ','
            exprs.push(self.parse_expr()?);
        }

        Ok(exprs)
    }
}

/// Parse an expression string into an AST.
///
/// Empty and comment-only input is an `EmptyEquation` error: a parameter
/// without an expression simply has no expression.
pub fn parse(input: &str) -> Result<Expr, EquationError> {
    let mut parser = Parser::new(Lexer::new(input))?;
    parser.parse_equation()
}
