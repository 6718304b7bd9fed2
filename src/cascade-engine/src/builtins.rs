// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use crate::common::{EquationError, EquationResult, ErrorCode};

/// Loc describes a location in an equation by the starting point and ending point.
/// Equations are strings typed by humans for a single variable -- u16 is long enough.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
pub struct Loc {
    pub start: u16,
    pub end: u16,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u16,
            end: end as u16,
        }
    }

    /// union takes a second Loc and returns the inclusive range from the
    /// start of the earlier token to the end of the later token.
    pub fn union(&self, rhs: &Self) -> Self {
        Loc {
            start: self.start.min(rhs.start),
            end: self.end.max(rhs.end),
        }
    }
}

#[test]
fn test_loc_basics() {
    let a = Loc { start: 3, end: 7 };
    assert_eq!(a, Loc::new(3, 7));

    let b = Loc { start: 4, end: 11 };
    assert_eq!(Loc::new(3, 11), a.union(&b));

    let c = Loc { start: 1, end: 5 };
    assert_eq!(Loc::new(1, 7), a.union(&c));
}

/// The whitelist of functions an expression may call.  Anything not in
/// here is rejected when the expression is parsed.
#[derive(PartialEq, Clone, Debug)]
pub enum BuiltinFn<Expr> {
    Abs(Box<Expr>),
    Ceil(Box<Expr>),
    Exp(Box<Expr>),
    Floor(Box<Expr>),
    Ln(Box<Expr>),
    Log10(Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Sqrt(Box<Expr>),
    Pi,
    Time,
    TimeStep,
}

impl<Expr> BuiltinFn<Expr> {
    pub fn name(&self) -> &'static str {
        use BuiltinFn::*;
        match self {
            Abs(_) => "abs",
            Ceil(_) => "ceil",
            Exp(_) => "exp",
            Floor(_) => "floor",
            Ln(_) => "ln",
            Log10(_) => "log10",
            Max(_, _) => "max",
            Min(_, _) => "min",
            Sqrt(_) => "sqrt",
            Pi => "pi",
            Time => "t",
            TimeStep => "dt",
        }
    }

    pub fn args(&self) -> Vec<&Expr> {
        use BuiltinFn::*;
        match self {
            Abs(a) | Ceil(a) | Exp(a) | Floor(a) | Ln(a) | Log10(a) | Sqrt(a) => vec![a],
            Max(a, b) | Min(a, b) => vec![a, b],
            Pi | Time | TimeStep => vec![],
        }
    }
}

/// names that read as variables but evaluate as builtins
pub fn is_0_arity_builtin_fn(name: &str) -> bool {
    matches!(name, "pi" | "t" | "dt")
}

pub fn is_builtin_fn(name: &str) -> bool {
    is_0_arity_builtin_fn(name)
        || matches!(
            name,
            "abs" | "ceil" | "exp" | "floor" | "ln" | "log10" | "max" | "min" | "sqrt"
        )
}

/// resolve checks `name` against the whitelist and its arity.
pub fn resolve<Expr>(name: &str, args: Vec<Expr>, loc: Loc) -> EquationResult<BuiltinFn<Expr>> {
    use BuiltinFn::*;

    let err = |code: ErrorCode| EquationError {
        start: loc.start,
        end: loc.end,
        code,
    };

    if !is_builtin_fn(name) {
        return Err(err(ErrorCode::UnknownBuiltin));
    }

    let mut args = args.into_iter();
    let (a, b, extra) = (args.next(), args.next(), args.next());
    if extra.is_some() {
        return Err(err(ErrorCode::BadBuiltinArgs));
    }

    let builtin = match (name, a, b) {
        ("pi", None, None) => Pi,
        ("t", None, None) => Time,
        ("dt", None, None) => TimeStep,
        ("max", Some(a), Some(b)) => Max(Box::new(a), Box::new(b)),
        ("min", Some(a), Some(b)) => Min(Box::new(a), Box::new(b)),
        (name, Some(a), None) => {
            let a = Box::new(a);
            match name {
                "abs" => Abs(a),
                "ceil" => Ceil(a),
                "exp" => Exp(a),
                "floor" => Floor(a),
                "ln" => Ln(a),
                "log10" => Log10(a),
                "sqrt" => Sqrt(a),
                _ => return Err(err(ErrorCode::BadBuiltinArgs)),
            }
        }
        _ => return Err(err(ErrorCode::BadBuiltinArgs)),
    };

    Ok(builtin)
}

#[test]
fn test_resolve() {
    let loc = Loc::new(0, 5);
    assert_eq!(Ok(BuiltinFn::Exp(Box::new(1.0))), resolve("exp", vec![1.0], loc));
    assert_eq!(
        Ok(BuiltinFn::Max(Box::new(1.0), Box::new(2.0))),
        resolve("max", vec![1.0, 2.0], loc)
    );
    assert_eq!(Ok(BuiltinFn::<f64>::Time), resolve("t", vec![], loc));

    let err = resolve("exec", vec![1.0], loc).unwrap_err();
    assert_eq!(ErrorCode::UnknownBuiltin, err.code);
    assert_eq!(loc, Loc::new(err.start as usize, err.end as usize));

    assert_eq!(
        ErrorCode::BadBuiltinArgs,
        resolve("exp", vec![1.0, 2.0], loc).unwrap_err().code
    );
    assert_eq!(
        ErrorCode::BadBuiltinArgs,
        resolve("max", vec![1.0], loc).unwrap_err().code
    );
    assert_eq!(
        ErrorCode::BadBuiltinArgs,
        resolve::<f64>("floor", vec![], loc).unwrap_err().code
    );
    assert_eq!(
        ErrorCode::BadBuiltinArgs,
        resolve("pi", vec![1.0], loc).unwrap_err().code
    );
}
