// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;
use std::fmt;

use crate::builtins::{BuiltinFn, Loc};

/// Expr is a parsed parameter expression.  Builtin calls have already
/// been checked against the whitelist; variable names have not yet been
/// resolved against a population.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    Const(String, f64, Loc),
    Var(String, Loc),
    App(BuiltinFn<Expr>, Loc),
    Op1(UnaryOp, Box<Expr>, Loc),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
    If(Box<Expr>, Box<Expr>, Box<Expr>, Loc),
}

impl Expr {
    pub fn get_loc(&self) -> Loc {
        match self {
            Expr::Const(_, _, loc) => *loc,
            Expr::Var(_, loc) => *loc,
            Expr::App(_, loc) => *loc,
            Expr::Op1(_, _, loc) => *loc,
            Expr::Op2(_, _, _, loc) => *loc,
            Expr::If(_, _, _, loc) => *loc,
        }
    }

    #[cfg(test)]
    pub(crate) fn strip_loc(self) -> Self {
        let loc = Loc::default();
        match self {
            Expr::Const(s, n, _) => Expr::Const(s, n, loc),
            Expr::Var(v, _) => Expr::Var(v, loc),
            Expr::App(builtin, _) => {
                use BuiltinFn::*;
                let strip = |e: Box<Expr>| Box::new(e.strip_loc());
                let builtin = match builtin {
                    Abs(a) => Abs(strip(a)),
                    Ceil(a) => Ceil(strip(a)),
                    Exp(a) => Exp(strip(a)),
                    Floor(a) => Floor(strip(a)),
                    Ln(a) => Ln(strip(a)),
                    Log10(a) => Log10(strip(a)),
                    Max(a, b) => Max(strip(a), strip(b)),
                    Min(a, b) => Min(strip(a), strip(b)),
                    Sqrt(a) => Sqrt(strip(a)),
                    Pi => Pi,
                    Time => Time,
                    TimeStep => TimeStep,
                };
                Expr::App(builtin, loc)
            }
            Expr::Op1(op, r, _) => Expr::Op1(op, Box::new(r.strip_loc()), loc),
            Expr::Op2(op, l, r, _) => {
                Expr::Op2(op, Box::new(l.strip_loc()), Box::new(r.strip_loc()), loc)
            }
            Expr::If(c, t, f, _) => Expr::If(
                Box::new(c.strip_loc()),
                Box::new(t.strip_loc()),
                Box::new(f.strip_loc()),
                loc,
            ),
        }
    }

    /// idents returns every variable name referenced by the expression.
    pub fn idents(&self) -> BTreeSet<String> {
        let mut visitor = IdentifierSetVisitor {
            identifiers: BTreeSet::new(),
        };
        visitor.walk(self);
        visitor.identifiers
    }
}

pub trait Visitor<T> {
    fn walk(&mut self, e: &Expr) -> T;
}

struct IdentifierSetVisitor {
    identifiers: BTreeSet<String>,
}

impl Visitor<()> for IdentifierSetVisitor {
    fn walk(&mut self, e: &Expr) {
        match e {
            Expr::Const(_, _, _) => (),
            Expr::Var(id, _) => {
                self.identifiers.insert(id.clone());
            }
            Expr::App(builtin, _) => {
                for arg in builtin.args() {
                    self.walk(arg);
                }
            }
            Expr::Op1(_, r, _) => self.walk(r),
            Expr::Op2(_, l, r, _) => {
                self.walk(l);
                self.walk(r);
            }
            Expr::If(c, t, f, _) => {
                self.walk(c);
                self.walk(t);
                self.walk(f);
            }
        }
    }
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Exp,
    Mul,
    Div,
    Mod,
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

impl BinaryOp {
    // higher the precedence, the tighter the binding.
    // e.g. Mul.precedence() > Add.precedence()
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add => 4,
            BinaryOp::Sub => 4,
            BinaryOp::Exp => 6,
            BinaryOp::Mul => 5,
            BinaryOp::Div => 5,
            BinaryOp::Mod => 5,
            BinaryOp::Gt => 3,
            BinaryOp::Lt => 3,
            BinaryOp::Gte => 3,
            BinaryOp::Lte => 3,
            BinaryOp::Eq => 2,
            BinaryOp::Neq => 2,
            BinaryOp::And => 1,
            BinaryOp::Or => 1,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Exp => "^",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "mod",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Gte => ">=",
            BinaryOp::Lte => "<=",
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "<>",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum UnaryOp {
    Positive,
    Negative,
    Not,
}

fn child_needs_parens(parent: &Expr, child: &Expr) -> bool {
    match parent {
        Expr::Const(_, _, _) | Expr::Var(_, _) => false,
        // children are comma separated, so no ambiguity possible
        Expr::App(_, _) => false,
        Expr::Op1(_, _, _) => matches!(child, Expr::Op2(_, _, _, _)),
        Expr::Op2(parent_op, _, _, _) => match child {
            Expr::Op2(child_op, _, _, _) => parent_op.precedence() > child_op.precedence(),
            Expr::If(_, _, _, _) => true,
            _ => false,
        },
        Expr::If(_, _, _, _) => false,
    }
}

struct PrintVisitor {}

impl PrintVisitor {
    fn child(&mut self, parent: &Expr, child: &Expr) -> String {
        let eqn = self.walk(child);
        if child_needs_parens(parent, child) {
            format!("({eqn})")
        } else {
            eqn
        }
    }
}

impl Visitor<String> for PrintVisitor {
    fn walk(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Const(s, _, _) => s.clone(),
            Expr::Var(id, _) => {
                if id.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    id.clone()
                } else {
                    format!("\"{id}\"")
                }
            }
            Expr::App(builtin, _) => {
                let args = builtin.args();
                if args.is_empty() && crate::builtins::is_0_arity_builtin_fn(builtin.name()) {
                    return builtin.name().to_owned();
                }
                let args: Vec<String> = args.into_iter().map(|e| self.walk(e)).collect();
                format!("{}({})", builtin.name(), args.join(", "))
            }
            Expr::Op1(op, r, _) => {
                let r = self.child(expr, r);
                match op {
                    UnaryOp::Positive => format!("+{r}"),
                    UnaryOp::Negative => format!("-{r}"),
                    UnaryOp::Not => format!("not {r}"),
                }
            }
            Expr::Op2(op, l, r, _) => {
                let l = self.child(expr, l);
                let r = self.child(expr, r);
                format!("{} {} {}", l, op.symbol(), r)
            }
            Expr::If(cond, t, f, _) => {
                let cond = self.walk(cond);
                let t = self.walk(t);
                let f = self.walk(f);
                format!("if {cond} then {t} else {f}")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut visitor = PrintVisitor {};
        write!(f, "{}", visitor.walk(self))
    }
}

#[test]
fn test_idents() {
    let loc = Loc::default();
    let expr = Expr::Op2(
        BinaryOp::Add,
        Box::new(Expr::Var("alive".to_owned(), loc)),
        Box::new(Expr::App(
            BuiltinFn::Max(
                Box::new(Expr::Var("jc1:flow".to_owned(), loc)),
                Box::new(Expr::Var("alive".to_owned(), loc)),
            ),
            loc,
        )),
        loc,
    );
    let idents: Vec<String> = expr.idents().into_iter().collect();
    assert_eq!(vec!["alive".to_owned(), "jc1:flow".to_owned()], idents);
}

#[test]
fn test_print() {
    let loc = Loc::default();
    let var = |name: &str| Box::new(Expr::Var(name.to_owned(), loc));
    let expr = Expr::Op2(
        BinaryOp::Mul,
        Box::new(Expr::Op2(BinaryOp::Add, var("a"), var("b"), loc)),
        Box::new(Expr::App(BuiltinFn::Exp(var("jc1:flow")), loc)),
        loc,
    );
    assert_eq!("(a + b) * exp(\"jc1:flow\")", format!("{expr}"));
}
