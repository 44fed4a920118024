//! Expression evaluation.
//!
//! Expressions are flat operator chains: an initial value followed by
//! `(operator, value)` pairs, evaluated strictly left to right with no
//! precedence. `1 and 2 or false` evaluates `(1 and 2) or false`.
//!
//! Operators live in a per-engine table keyed by spelling; the same table
//! feeds the tokenizer's operator trie, so registering a custom operator
//! makes it both lexable and evaluable.

use std::cmp::Ordering;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use weft_core::WeftError;

use crate::context::{Context, ContextValue, PathKey};
use crate::lexer::unquote;
use crate::tokens::{Literal, Number, PathSeg, PathToken, ValueToken};

/// A binary operator implementation.
pub type OperatorFn = fn(&ContextValue, &ContextValue) -> ContextValue;

/// The operator table, keyed by spelling.
pub type Operators = HashMap<String, OperatorFn>;

static DEFAULT_OPERATORS: Lazy<Operators> = Lazy::new(build_default_operators);

/// The default operator table: comparisons, `contains`, `and`, `or`.
pub fn default_operators() -> Operators {
    DEFAULT_OPERATORS.clone()
}

fn build_default_operators() -> Operators {
    let mut ops: Operators = HashMap::new();
    ops.insert("==".to_string(), op_eq);
    ops.insert("!=".to_string(), op_ne);
    ops.insert("<>".to_string(), op_ne);
    ops.insert("<".to_string(), |l, r| op_cmp(l, r, Ordering::is_lt));
    ops.insert(">".to_string(), |l, r| op_cmp(l, r, Ordering::is_gt));
    ops.insert("<=".to_string(), |l, r| op_cmp(l, r, Ordering::is_le));
    ops.insert(">=".to_string(), |l, r| op_cmp(l, r, Ordering::is_ge));
    ops.insert("contains".to_string(), op_contains);
    ops.insert("and".to_string(), |l, r| {
        ContextValue::Bool(l.is_truthy() && r.is_truthy())
    });
    ops.insert("or".to_string(), |l, r| {
        ContextValue::Bool(l.is_truthy() || r.is_truthy())
    });
    ops
}

fn op_eq(l: &ContextValue, r: &ContextValue) -> ContextValue {
    ContextValue::Bool(l == r)
}

fn op_ne(l: &ContextValue, r: &ContextValue) -> ContextValue {
    ContextValue::Bool(l != r)
}

/// Numeric values compare numerically, strings lexically; anything else is
/// incomparable and yields `false`.
fn op_cmp(l: &ContextValue, r: &ContextValue, pred: fn(Ordering) -> bool) -> ContextValue {
    let ordering = match (l, r) {
        (ContextValue::Str(a), ContextValue::Str(b)) => Some(a.cmp(b)),
        _ => match (numeric(l), numeric(r)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    ContextValue::Bool(ordering.is_some_and(pred))
}

fn numeric(v: &ContextValue) -> Option<f64> {
    match v {
        ContextValue::Integer(n) => {
            #[allow(clippy::cast_precision_loss)]
            Some(*n as f64)
        }
        ContextValue::Float(f) => Some(*f),
        _ => None,
    }
}

fn op_contains(l: &ContextValue, r: &ContextValue) -> ContextValue {
    let found = match l {
        ContextValue::Str(s) => s.contains(&r.to_display_string()),
        ContextValue::Array(items) => items.iter().any(|v| v == r),
        ContextValue::Object(map) => map.contains_key(&r.to_display_string()),
        _ => false,
    };
    ContextValue::Bool(found)
}

/// A parsed operator-chain expression.
#[derive(Debug, Clone)]
pub struct Expression {
    init: ValueToken,
    rest: Vec<(String, ValueToken)>,
}

impl Expression {
    /// Builds an expression from its initial value and operator chain.
    pub const fn new(init: ValueToken, rest: Vec<(String, ValueToken)>) -> Self {
        Self { init, rest }
    }

    /// The operator spellings in chain order.
    pub fn operator_names(&self) -> Vec<String> {
        self.rest.iter().map(|(op, _)| op.clone()).collect()
    }

    /// Evaluates the chain left to right. With `lenient`, undefined
    /// variables resolve to nil instead of failing under strict mode.
    pub fn evaluate(
        &self,
        ctx: &Context,
        operators: &Operators,
        lenient: bool,
    ) -> Result<ContextValue, WeftError> {
        let mut acc = eval_value_token(&self.init, ctx, lenient)?;
        for (op, operand) in &self.rest {
            let rhs = eval_value_token(operand, ctx, lenient)?;
            let f = operators
                .get(op)
                .ok_or_else(|| WeftError::Render(format!("operator \"{op}\" not supported")))?;
            acc = f(&acc, &rhs);
        }
        Ok(acc)
    }
}

/// Evaluates one value token against the context.
pub fn eval_value_token(
    token: &ValueToken,
    ctx: &Context,
    lenient: bool,
) -> Result<ContextValue, WeftError> {
    match token {
        ValueToken::Literal(lit, _) => Ok(match lit {
            Literal::Nil => ContextValue::Nil,
            Literal::True => ContextValue::Bool(true),
            Literal::False => ContextValue::Bool(false),
            Literal::Empty => ContextValue::Empty,
        }),
        ValueToken::Quoted(span) => Ok(ContextValue::Str(unquote(span.text()))),
        ValueToken::Number(Number::Integer(n), _) => Ok(ContextValue::Integer(*n)),
        ValueToken::Number(Number::Float(f), _) => Ok(ContextValue::Float(*f)),
        ValueToken::Range(lhs, rhs, _) => {
            let from = eval_value_token(lhs, ctx, lenient)?.as_integer().unwrap_or(0);
            let to = eval_value_token(rhs, ctx, lenient)?.as_integer().unwrap_or(0);
            Ok(ContextValue::Array(
                (from..=to).map(ContextValue::Integer).collect(),
            ))
        }
        ValueToken::Path(path) => {
            let keys = resolve_path(path, ctx, lenient)?;
            match ctx.get(&keys) {
                Err(err) if lenient && err.is_undefined_variable() => Ok(ContextValue::Nil),
                other => other,
            }
        }
    }
}

/// Resolves a path's segments, evaluating bracketed sub-expressions.
pub fn resolve_path(
    path: &PathToken,
    ctx: &Context,
    lenient: bool,
) -> Result<Vec<PathKey>, WeftError> {
    path.segments
        .iter()
        .map(|seg| {
            Ok(match seg {
                PathSeg::Key(k) => PathKey::Key(k.clone()),
                PathSeg::Index(i) => PathKey::Index(*i),
                PathSeg::Dynamic(inner) => match eval_value_token(inner, ctx, lenient)? {
                    ContextValue::Integer(i) => PathKey::Index(i),
                    other => PathKey::Key(other.to_display_string()),
                },
            })
        })
        .collect()
}
