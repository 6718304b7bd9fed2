// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::ErrorCode::*;
use super::Token::*;
use super::{EquationError, ErrorCode, Lexer, Token};

fn test(input: &str, expected: Vec<(&str, Token)>) {
    let tokenizer = Lexer::new(input);
    let len = expected.len();
    for (token, (expected_span, expected_tok)) in tokenizer.zip(expected.into_iter()) {
        let expected_start = expected_span.find('~').unwrap();
        let expected_end = expected_span.rfind('~').unwrap() + 1;
        assert_eq!(Ok((expected_start, expected_tok, expected_end)), token);
    }

    let mut tokenizer = Lexer::new(input);
    assert_eq!(None, tokenizer.nth(len));
}

fn test_err(input: &str, expected: (&str, ErrorCode)) {
    let tokenizer = Lexer::new(input);
    let token = tokenizer.into_iter().last().unwrap();
    let (expected_span, expected_code) = expected;
    let expected_start = expected_span.find('~').unwrap();
    let expected_end = expected_span.rfind('~').unwrap() + 1;
    let expected_err = EquationError {
        start: expected_start as u16,
        end: expected_end as u16,
        code: expected_code,
    };
    assert_eq!(Err(expected_err), token);
}

#[test]
fn ifstmt() {
    test(
        "if 1    then 1 else 0",
        vec![
            ("~~                   ", If),
            ("   ~                 ", Num("1")),
            ("        ~~~~         ", Then),
            ("             ~       ", Num("1")),
            ("               ~~~~  ", Else),
            ("                    ~", Num("0")),
        ],
    );
}

#[test]
fn power_operators() {
    test("a**2", vec![("~   ", Ident("a")), (" ~~ ", Exp), ("   ~", Num("2"))]);
    test("a^2", vec![("~  ", Ident("a")), (" ~ ", Exp), ("  ~", Num("2"))]);
    test("a*2", vec![("~  ", Ident("a")), (" ~ ", Mul), ("  ~", Num("2"))]);
}

#[test]
fn comparisons() {
    test("<=", vec![("~~", Lte)]);
    test(">=", vec![("~~", Gte)]);
    test("==", vec![("~~", Eq)]);
    test("=", vec![("~", Eq)]);
    test("!=", vec![("~~", Neq)]);
    test("<>", vec![("~~", Neq)]);
    test("!", vec![("~", Not)]);
}

#[test]
fn negative_num() {
    test("-3", vec![("~ ", Minus), (" ~", Num("3"))]);
}

#[test]
fn scientific_num() {
    test("1.5e-3", vec![("~~~~~~", Num("1.5e-3"))]);
    test(".5", vec![("~~", Num(".5"))]);
}

#[test]
fn quoted_ident() {
    test(
        "\"jc1:flow\" / dt",
        vec![
            ("~~~~~~~~~~     ", Ident("\"jc1:flow\"")),
            ("           ~   ", Div),
            ("             ~~", Ident("dt")),
        ],
    );
}

#[test]
fn keywords_are_case_insensitive() {
    test(
        "IF x THEN y ELSE z",
        vec![
            ("~~                ", If),
            ("   ~              ", Ident("x")),
            ("     ~~~~         ", Then),
            ("          ~       ", Ident("y")),
            ("            ~~~~  ", Else),
            ("                 ~", Ident("z")),
        ],
    );
}

#[test]
fn comment() {
    test(
        "{ share of b } x",
        vec![("               ~", Ident("x"))],
    );
}

#[test]
fn errors() {
    test_err("a &", ("  ~", UnrecognizedToken));
    test_err("a |", ("  ~", UnrecognizedToken));
    test_err("x { never closed", ("  ~~~~~~~~~~~~~~", UnclosedComment));
    test_err("\"unclosed", ("~~~~~~~~~", UnclosedQuotedIdent));
    test_err("x $", ("  ~", UnrecognizedToken));
}
