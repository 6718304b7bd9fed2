// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Lexer for parameter expressions.
//!
//! Spans are byte offsets into the input.  Keywords are matched without
//! regard to case; `{ ... }` is a comment.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{EquationError, ErrorCode};

#[cfg(test)]
mod test;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
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
    Ident(&'input str),
    Num(&'input str),
}

pub type Spanned<T> = (usize, T, usize);

type LexResult<'input> = Result<Spanned<Token<'input>>, EquationError>;

const KEYWORDS: &[(&str, Token<'static>)] = &[
    ("if", If),
    ("then", Then),
    ("else", Else),
    ("not", Not),
    ("mod", Mod),
    ("and", And),
    ("or", Or),
    ("nan", Nan),
];

// two-character operators must come before their one-character prefixes
const OPERATORS: &[(&str, Token<'static>)] = &[
    ("**", Exp),
    ("==", Eq),
    ("!=", Neq),
    ("<>", Neq),
    ("<=", Lte),
    (">=", Gte),
    ("&&", And),
    ("||", Or),
    ("*", Mul),
    ("/", Div),
    ("^", Exp),
    ("=", Eq),
    ("!", Not),
    ("<", Lt),
    (">", Gt),
    ("+", Plus),
    ("-", Minus),
    ("(", LParen),
    (")", RParen),
    (",", Comma),
];

lazy_static! {
    static ref NUMBER_RE: Regex = Regex::new(r"^\d*(\.\d*)?([eE][-+]?(\d*(\.\d*)?)?)?").unwrap();
}

fn error<'input>(code: ErrorCode, start: usize, end: usize) -> LexResult<'input> {
    Err(EquationError {
        start: start as u16,
        end: end as u16,
        code,
    })
}

pub struct Lexer<'input> {
    text: &'input str,
    pos: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Lexer {
            text: input,
            pos: 0,
        }
    }

    fn rest(&self) -> &'input str {
        &self.text[self.pos..]
    }

    /// skip_trivia moves past whitespace and comments.  An unclosed
    /// comment is an error spanning to the end of the input.
    fn skip_trivia(&mut self) -> Result<(), EquationError> {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if !trimmed.starts_with('{') {
                return Ok(());
            }
            match trimmed.find('}') {
                Some(close) => self.pos += close + 1,
                None => {
                    let start = self.pos;
                    self.pos = self.text.len();
                    return Err(EquationError {
                        start: start as u16,
                        end: self.pos as u16,
                        code: UnclosedComment,
                    });
                }
            }
        }
    }

    fn span(&mut self, len: usize, tok: Token<'input>) -> LexResult<'input> {
        let start = self.pos;
        self.pos += len;
        Ok((start, tok, self.pos))
    }

    fn word(&mut self) -> LexResult<'input> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !UnicodeXID::is_xid_continue(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let word = &rest[..len];
        let tok = KEYWORDS
            .iter()
            .find(|(kw, _)| kw.eq_ignore_ascii_case(word))
            .map(|&(_, tok)| tok)
            .unwrap_or(Ident(word));
        self.span(len, tok)
    }

    fn number(&mut self) -> LexResult<'input> {
        let rest = self.rest();
        let len = NUMBER_RE.find(rest).map(|m| m.end()).unwrap_or(0).max(1);
        self.span(len, Num(&rest[..len]))
    }

    /// quoted identifiers keep their quotes; the parser strips them
    fn quoted(&mut self) -> LexResult<'input> {
        let rest = self.rest();
        match rest[1..].find('"') {
            Some(close) => self.span(close + 2, Ident(&rest[..close + 2])),
            None => {
                let start = self.pos;
                self.pos = self.text.len();
                error(UnclosedQuotedIdent, start, self.text.len())
            }
        }
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = LexResult<'input>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(err) = self.skip_trivia() {
            return Some(Err(err));
        }
        let rest = self.rest();
        let c = rest.chars().next()?;

        if let Some(&(op, tok)) = OPERATORS.iter().find(|(op, _)| rest.starts_with(*op)) {
            return Some(self.span(op.len(), tok));
        }
        let result = match c {
            '"' => self.quoted(),
            c if UnicodeXID::is_xid_start(c) || c == '_' => self.word(),
            c if c.is_ascii_digit() || c == '.' => self.number(),
            // a lone '&' or '|', or anything else we don't know
            c => {
                let start = self.pos;
                self.pos += c.len_utf8();
                error(UnrecognizedToken, start, self.pos)
            }
        };
        Some(result)
    }
}
