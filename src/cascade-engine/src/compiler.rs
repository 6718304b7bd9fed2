// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Compiles a parsed expression into a tree of closures.
//!
//! Variable references are resolved to positions in a dependency slot
//! vector once, at build time.  Evaluating a compiled expression is then
//! a walk over boxed closures reading from that vector; nothing is parsed
//! or looked up by name while the model runs.

use std::fmt;

use float_cmp::approx_eq;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::builtins::BuiltinFn;
use crate::common::{EquationError, EquationResult, ErrorCode};

pub(crate) fn is_truthy(n: f64) -> bool {
    let is_false = approx_eq!(f64, n, 0.0);
    !is_false
}

/// The values an expression reads while it is evaluated.
pub struct Env<'a> {
    /// dependency values, in the order the expression was compiled with
    pub slots: &'a [f64],
    pub t: f64,
    pub dt: f64,
}

type Eval = Box<dyn Fn(&Env) -> f64 + Send + Sync>;

/// A compiled expression together with the names of its slots.
pub struct CompiledExpr {
    eval: Eval,
    source: String,
}

impl CompiledExpr {
    pub fn eval(&self, env: &Env) -> f64 {
        (self.eval)(env)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledExpr({})", self.source)
    }
}

/// compile resolves every variable in `expr` against `slots` and builds
/// the closure tree.  A variable not present in `slots` is an
/// `UnknownDependency` error located at the reference.
pub fn compile(expr: &Expr, slots: &[String]) -> EquationResult<CompiledExpr> {
    Ok(CompiledExpr {
        eval: compile_expr(expr, slots)?,
        source: format!("{expr}"),
    })
}

fn compile_expr(expr: &Expr, slots: &[String]) -> EquationResult<Eval> {
    let eval: Eval = match expr {
        Expr::Const(_, n, _) => {
            let n = *n;
            Box::new(move |_| n)
        }
        Expr::Var(id, loc) => match slots.iter().position(|s| s == id) {
            Some(off) => Box::new(move |env| env.slots[off]),
            None => {
                return Err(EquationError {
                    start: loc.start,
                    end: loc.end,
                    code: ErrorCode::UnknownDependency,
                });
            }
        },
        Expr::App(builtin, _) => compile_builtin(builtin, slots)?,
        Expr::Op1(op, r, _) => {
            let r = compile_expr(r, slots)?;
            match op {
                UnaryOp::Positive => r,
                UnaryOp::Negative => Box::new(move |env| -r(env)),
                UnaryOp::Not => Box::new(move |env| (!is_truthy(r(env))) as i8 as f64),
            }
        }
        Expr::Op2(op, l, r, _) => {
            let l = compile_expr(l, slots)?;
            let r = compile_expr(r, slots)?;
            match op {
                BinaryOp::Add => Box::new(move |env| l(env) + r(env)),
                BinaryOp::Sub => Box::new(move |env| l(env) - r(env)),
                BinaryOp::Exp => Box::new(move |env| l(env).powf(r(env))),
                BinaryOp::Mul => Box::new(move |env| l(env) * r(env)),
                BinaryOp::Div => Box::new(move |env| l(env) / r(env)),
                BinaryOp::Mod => Box::new(move |env| l(env).rem_euclid(r(env))),
                BinaryOp::Gt => Box::new(move |env| (l(env) > r(env)) as i8 as f64),
                BinaryOp::Gte => Box::new(move |env| (l(env) >= r(env)) as i8 as f64),
                BinaryOp::Lt => Box::new(move |env| (l(env) < r(env)) as i8 as f64),
                BinaryOp::Lte => Box::new(move |env| (l(env) <= r(env)) as i8 as f64),
                BinaryOp::Eq => Box::new(move |env| approx_eq!(f64, l(env), r(env)) as i8 as f64),
                BinaryOp::Neq => {
                    Box::new(move |env| (!approx_eq!(f64, l(env), r(env))) as i8 as f64)
                }
                BinaryOp::And => {
                    Box::new(move |env| (is_truthy(l(env)) && is_truthy(r(env))) as i8 as f64)
                }
                BinaryOp::Or => {
                    Box::new(move |env| (is_truthy(l(env)) || is_truthy(r(env))) as i8 as f64)
                }
            }
        }
        Expr::If(cond, t, f, _) => {
            let cond = compile_expr(cond, slots)?;
            let t = compile_expr(t, slots)?;
            let f = compile_expr(f, slots)?;
            Box::new(move |env| if is_truthy(cond(env)) { t(env) } else { f(env) })
        }
    };

    Ok(eval)
}

fn unary(a: &Expr, slots: &[String], f: fn(f64) -> f64) -> EquationResult<Eval> {
    let a = compile_expr(a, slots)?;
    Ok(Box::new(move |env| f(a(env))))
}

fn binary(a: &Expr, b: &Expr, slots: &[String], f: fn(f64, f64) -> f64) -> EquationResult<Eval> {
    let a = compile_expr(a, slots)?;
    let b = compile_expr(b, slots)?;
    Ok(Box::new(move |env| f(a(env), b(env))))
}

fn compile_builtin(builtin: &BuiltinFn<Expr>, slots: &[String]) -> EquationResult<Eval> {
    use BuiltinFn::*;

    match builtin {
        Abs(a) => unary(a, slots, f64::abs),
        Ceil(a) => unary(a, slots, f64::ceil),
        Exp(a) => unary(a, slots, f64::exp),
        Floor(a) => unary(a, slots, f64::floor),
        Ln(a) => unary(a, slots, f64::ln),
        Log10(a) => unary(a, slots, f64::log10),
        Sqrt(a) => unary(a, slots, f64::sqrt),
        Max(a, b) => binary(a, b, slots, f64::max),
        Min(a, b) => binary(a, b, slots, f64::min),
        Pi => Ok(Box::new(|_| std::f64::consts::PI)),
        Time => Ok(Box::new(|env| env.t)),
        TimeStep => Ok(Box::new(|env| env.dt)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use float_cmp::approx_eq;

    fn eval(input: &str, names: &[&str], slots: &[f64]) -> f64 {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let compiled = compile(&parse(input).unwrap(), &names).unwrap();
        compiled.eval(&Env {
            slots,
            t: 2010.0,
            dt: 0.25,
        })
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(7.0, eval("1 + 2 * 3", &[], &[]));
        assert_eq!(9.0, eval("(1 + 2) * 3", &[], &[]));
        assert_eq!(8.0, eval("2 ** 3", &[], &[]));
        assert_eq!(1.0, eval("-3 mod 2", &[], &[]));
        assert_eq!(-4.0, eval("-a * 2", &["a"], &[2.0]));
        assert!(eval("1 / 0", &[], &[]).is_infinite());
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(1.0, eval("a > 1 and b < 1", &["a", "b"], &[2.0, 0.0]));
        assert_eq!(0.0, eval("a > 1 and b < 1", &["a", "b"], &[2.0, 1.0]));
        assert_eq!(1.0, eval("not a", &["a"], &[0.0]));
        assert_eq!(1.0, eval("0.1 + 0.2 = 0.3", &[], &[]));
        assert_eq!(0.0, eval("0.1 + 0.2 <> 0.3", &[], &[]));
        assert_eq!(5.0, eval("if a || b then 5 else 6", &["a", "b"], &[0.0, 3.0]));
    }

    #[test]
    fn test_builtins() {
        assert!(approx_eq!(f64, 1.0, eval("exp(0)", &[], &[])));
        assert_eq!(2.0, eval("floor(2.7)", &[], &[]));
        assert_eq!(3.0, eval("ceil(2.1)", &[], &[]));
        assert_eq!(2.0, eval("log10(100)", &[], &[]));
        assert_eq!(4.0, eval("max(a, 4)", &["a"], &[1.0]));
        assert_eq!(1.0, eval("min(a, 4)", &["a"], &[1.0]));
        assert_eq!(2010.25, eval("t + dt", &[], &[]));
        assert!(approx_eq!(f64, std::f64::consts::PI, eval("pi", &[], &[])));
        assert_eq!(3.0, eval("sqrt(abs(-9))", &[], &[]));
    }

    #[test]
    fn test_slots() {
        // quoted link tags resolve like any other name
        assert_eq!(
            4.0,
            eval("\"jc1:flow\" / dt", &["alive", "jc1:flow"], &[100.0, 1.0])
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let expr = parse("alive + deaths").unwrap();
        let err = compile(&expr, &["alive".to_owned()]).unwrap_err();
        assert_eq!(ErrorCode::UnknownDependency, err.code);
        assert_eq!((8, 14), (err.start, err.end));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompiledExpr>();
    }
}
