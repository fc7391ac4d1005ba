//! Compile-time Evaluation
//!
//! Flagged code blocks are executed here, in-process, through the narrow
//! [`Evaluator`] interface: one block in, captured output out.

pub mod parser;
pub mod value;

pub use parser::{BinOp, Expr, Stmt};
pub use value::{Number, Value};

use crate::context::CompileContext;
use crate::error::EvaluationError;

/// Executes one code block against the ambient compile context.
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &'static str;

    /// `block` is the complete block text, delimiters included.
    fn evaluate(&self, block: &str, ctx: &mut CompileContext) -> Result<String, EvaluationError>;
}

/// Interpreter for the small echo/expression language of compile-time blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

impl ExprEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn eval(&self, expr: &Expr, ctx: &mut CompileContext) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(name) => ctx
                .variable(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UndefinedVariable(name.clone())),
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, &args, ctx)
            }
            Expr::Neg(inner) => {
                let n = self.eval(inner, ctx)?.number("-")?;
                Ok(match n {
                    Number::Int(i) => i
                        .checked_neg()
                        .map(Value::Int)
                        .unwrap_or(Value::Float(-(i as f64))),
                    Number::Float(f) => Value::Float(-f),
                })
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner, ctx)?.is_truthy())),
            Expr::Ternary(cond, then, otherwise) => {
                if self.eval(cond, ctx)?.is_truthy() {
                    self.eval(then, ctx)
                } else {
                    self.eval(otherwise, ctx)
                }
            }
            Expr::Binary(BinOp::And, lhs, rhs) => Ok(Value::Bool(
                self.eval(lhs, ctx)?.is_truthy() && self.eval(rhs, ctx)?.is_truthy(),
            )),
            Expr::Binary(BinOp::Or, lhs, rhs) => Ok(Value::Bool(
                self.eval(lhs, ctx)?.is_truthy() || self.eval(rhs, ctx)?.is_truthy(),
            )),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, ctx)?;
                let rhs = self.eval(rhs, ctx)?;
                binary(*op, &lhs, &rhs)
            }
        }
    }

    fn call(&self, name: &str, args: &[Value], ctx: &CompileContext) -> Result<Value, EvaluationError> {
        if let Some(service) = ctx.services().get(name) {
            return service(args).map_err(|message| EvaluationError::Service {
                name: name.to_string(),
                message,
            });
        }

        builtin(name, args).unwrap_or_else(|| Err(EvaluationError::UndefinedFunction(name.to_string())))
    }

    fn run(&self, stmts: &[Stmt], ctx: &mut CompileContext) -> Result<String, EvaluationError> {
        let mut out = String::new();
        for stmt in stmts {
            match stmt {
                Stmt::Echo(exprs) => {
                    for e in exprs {
                        out.push_str(&self.eval(e, ctx)?.to_string());
                    }
                }
                Stmt::Assign(name, e) => {
                    let v = self.eval(e, ctx)?;
                    ctx.set_variable(name.clone(), v);
                }
                Stmt::Expr(e) => {
                    self.eval(e, ctx)?;
                }
            }
        }
        Ok(out)
    }
}

impl Evaluator for ExprEvaluator {
    fn name(&self) -> &'static str {
        "expr"
    }

    fn evaluate(&self, block: &str, ctx: &mut CompileContext) -> Result<String, EvaluationError> {
        let block = block.trim();
        let inner = block
            .strip_prefix("<?")
            .and_then(|b| b.strip_suffix("?>"))
            .ok_or_else(|| EvaluationError::Parse {
                near: block.chars().take(24).collect(),
                message: "not a code block".to_string(),
            })?;

        if let Some(expr) = inner.strip_prefix('=') {
            let e = parser::parse_expression(expr)?;
            return Ok(self.eval(&e, ctx)?.to_string());
        }

        let body = match inner.get(..3) {
            Some(kw) if kw.eq_ignore_ascii_case("php") => &inner[3..],
            _ => inner,
        };
        let stmts = parser::parse_statements(body)?;
        self.run(&stmts, ctx)
    }
}

fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, EvaluationError> {
    match op {
        BinOp::Concat => Ok(Value::Str(format!("{}{}", lhs, rhs))),
        BinOp::Eq => Ok(Value::Bool(lhs.loose_eq(rhs))),
        BinOp::Ne => Ok(Value::Bool(!lhs.loose_eq(rhs))),
        BinOp::Lt => Ok(Value::Bool(lhs.loose_cmp(rhs).is_lt())),
        BinOp::Le => Ok(Value::Bool(lhs.loose_cmp(rhs).is_le())),
        BinOp::Gt => Ok(Value::Bool(lhs.loose_cmp(rhs).is_gt())),
        BinOp::Ge => Ok(Value::Bool(lhs.loose_cmp(rhs).is_ge())),
        BinOp::And | BinOp::Or => Ok(Value::Bool(match op {
            BinOp::And => lhs.is_truthy() && rhs.is_truthy(),
            _ => lhs.is_truthy() || rhs.is_truthy(),
        })),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            arithmetic(op, lhs.number(op.symbol())?, rhs.number(op.symbol())?)
        }
    }
}

fn arithmetic(op: BinOp, a: Number, b: Number) -> Result<Value, EvaluationError> {
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        let exact = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Div if y == 0 => return Err(EvaluationError::DivisionByZero),
            BinOp::Div if x.checked_rem(y) == Some(0) => x.checked_div(y),
            BinOp::Div => None,
            BinOp::Mod if y == 0 => return Err(EvaluationError::DivisionByZero),
            BinOp::Mod => x.checked_rem(y),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Int(v));
        }
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    match op {
        BinOp::Add => Ok(Value::Float(x + y)),
        BinOp::Sub => Ok(Value::Float(x - y)),
        BinOp::Mul => Ok(Value::Float(x * y)),
        BinOp::Div if y == 0.0 => Err(EvaluationError::DivisionByZero),
        BinOp::Div => Ok(Value::Float(x / y)),
        BinOp::Mod => {
            let (xi, yi) = (x as i64, y as i64);
            if yi == 0 {
                Err(EvaluationError::DivisionByZero)
            } else {
                Ok(Value::Int(xi.wrapping_rem(yi)))
            }
        }
        other => Err(EvaluationError::Type(format!("`{}` is not arithmetic", other.symbol()))),
    }
}

/// String helpers available without registering a service.
fn builtin(name: &str, args: &[Value]) -> Option<Result<Value, EvaluationError>> {
    let text = |i: usize| args.get(i).map(Value::to_string).unwrap_or_default();

    let result = match name {
        "strtoupper" => Ok(Value::Str(text(0).to_uppercase())),
        "strtolower" => Ok(Value::Str(text(0).to_lowercase())),
        "trim" => Ok(Value::Str(text(0).trim().to_string())),
        "strlen" => Ok(Value::Int(text(0).len() as i64)),
        "str_repeat" => match args.get(1).and_then(Value::as_number) {
            Some(Number::Int(n)) if n >= 0 => Ok(Value::Str(text(0).repeat(n as usize))),
            _ => Err(EvaluationError::Type("str_repeat expects a non-negative count".into())),
        },
        "implode" => Ok(Value::Str(
            args.iter().skip(1).map(Value::to_string).collect::<Vec<_>>().join(text(0).as_str()),
        )),
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CompileUnit, Services};
    use std::path::PathBuf;
    use std::sync::Arc;
    use uuid::Uuid;

    fn context(services: Services) -> CompileContext {
        let unit = CompileUnit {
            compiler_id: Uuid::new_v4(),
            namespace: "default".into(),
            view: "test".into(),
            compiled_filename: PathBuf::from("cache/test.compiled"),
            cache_directory: PathBuf::from("cache"),
        };
        CompileContext::new(unit, Arc::new(services))
    }

    fn run(block: &str) -> Result<String, EvaluationError> {
        ExprEvaluator::new().evaluate(block, &mut context(Services::new()))
    }

    #[test]
    fn test_compile_marker_echo() {
        assert_eq!(run("<?php /*compile*/ echo 2+2; ?>").unwrap(), "4");
    }

    #[test]
    fn test_short_echo() {
        assert_eq!(run("<?= 'a' . 'b' ?>").unwrap(), "ab");
        assert_eq!(run("<?= 7 / 2; ?>").unwrap(), "3.5");
    }

    #[test]
    fn test_variables_persist_between_blocks() {
        let evaluator = ExprEvaluator::new();
        let mut ctx = context(Services::new());
        assert_eq!(evaluator.evaluate("<?php $n = 3; ?>", &mut ctx).unwrap(), "");
        assert_eq!(evaluator.evaluate("<?= $n * $n ?>", &mut ctx).unwrap(), "9");
    }

    #[test]
    fn test_services_are_reachable() {
        let services = Services::new().with("config", |args| match args.first() {
            Some(Value::Str(key)) if key == "app.name" => Ok(Value::from("Forge")),
            _ => Err("unknown key".to_string()),
        });
        let mut ctx = context(services);
        let out = ExprEvaluator::new()
            .evaluate("<?php #compile\n echo strtoupper(config('app.name')); ?>", &mut ctx)
            .unwrap();
        assert_eq!(out, "FORGE");

        let err = ExprEvaluator::new()
            .evaluate("<?= config('missing') ?>", &mut ctx)
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Service { .. }));
    }

    #[test]
    fn test_errors() {
        assert_eq!(run("<?= 1 / 0 ?>").unwrap_err(), EvaluationError::DivisionByZero);
        assert_eq!(
            run("<?= $missing ?>").unwrap_err(),
            EvaluationError::UndefinedVariable("missing".into())
        );
        assert_eq!(
            run("<?= nope() ?>").unwrap_err(),
            EvaluationError::UndefinedFunction("nope".into())
        );
        assert!(matches!(run("<?= 'x' * 2 ?>").unwrap_err(), EvaluationError::Type(_)));
    }

    #[test]
    fn test_logic_and_ternary() {
        assert_eq!(run("<?= 1 < 2 && '0' ? 'y' : 'n' ?>").unwrap(), "n");
        assert_eq!(run("<?= !false ?>").unwrap(), "1");
        assert_eq!(run("<?= -(2 - 5) % 2 ?>").unwrap(), "1");
    }
}
