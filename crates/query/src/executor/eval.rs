//! Compiled expressions and their evaluation.
//!
//! Column references are resolved to row positions before the first row is
//! read, so evaluating a `CExpr` never looks up a name. Uncorrelated
//! subqueries are folded into literals; correlated ones are read as columns
//! a subquery stage appends. Logic is three-valued: `None` stands for unknown.

use crate::ast::{BinaryOp, UnaryOp};
use crate::context::ExecutionOptions;
use crate::executor::functions::ScalarFunction;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use rowql_core::pattern_match::like;
use rowql_core::{EvalError, EvalErrorKind, Row, Value};

/// An expression ready to run against rows of one layout.
#[derive(Clone, Debug, PartialEq)]
pub enum CExpr {
    Column(usize),
    Literal(Value),
    Binary {
        left: Box<CExpr>,
        op: BinaryOp,
        right: Box<CExpr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<CExpr>,
    },
    IsNull {
        expr: Box<CExpr>,
        negated: bool,
    },
    Between {
        expr: Box<CExpr>,
        low: Box<CExpr>,
        high: Box<CExpr>,
        negated: bool,
    },
    /// Also used for `IN (subquery)`, with the subquery rows as literals.
    InList {
        expr: Box<CExpr>,
        list: Vec<CExpr>,
        negated: bool,
    },
    Like {
        expr: Box<CExpr>,
        pattern: Box<CExpr>,
        negated: bool,
    },
    Case {
        operand: Option<Box<CExpr>>,
        branches: Vec<(CExpr, CExpr)>,
        else_result: Option<Box<CExpr>>,
    },
    Function {
        func: ScalarFunction,
        args: Vec<CExpr>,
    },
}

impl CExpr {
    pub fn binary(left: CExpr, op: BinaryOp, right: CExpr) -> Self {
        CExpr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Conjunction of `parts`; `TRUE` when empty.
    pub fn conjunction(parts: Vec<CExpr>) -> CExpr {
        parts
            .into_iter()
            .reduce(|acc, e| CExpr::binary(acc, BinaryOp::And, e))
            .unwrap_or(CExpr::Literal(Value::Boolean(true)))
    }

    /// Splits a chain of `AND`s into its operands.
    pub fn into_conjuncts(self, out: &mut Vec<CExpr>) {
        match self {
            CExpr::Binary {
                left,
                op: BinaryOp::And,
                right,
            } => {
                left.into_conjuncts(out);
                right.into_conjuncts(out);
            }
            other => out.push(other),
        }
    }

    fn for_each_child(&self, mut f: impl FnMut(&CExpr)) {
        match self {
            CExpr::Column(_) | CExpr::Literal(_) => {}
            CExpr::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            CExpr::Unary { expr, .. } | CExpr::IsNull { expr, .. } => f(expr),
            CExpr::Between { expr, low, high, .. } => {
                f(expr);
                f(low);
                f(high);
            }
            CExpr::InList { expr, list, .. } => {
                f(expr);
                list.iter().for_each(f);
            }
            CExpr::Like { expr, pattern, .. } => {
                f(expr);
                f(pattern);
            }
            CExpr::Case {
                operand,
                branches,
                else_result,
            } => {
                if let Some(operand) = operand {
                    f(operand);
                }
                for (when, then) in branches {
                    f(when);
                    f(then);
                }
                if let Some(e) = else_result {
                    f(e);
                }
            }
            CExpr::Function { args, .. } => args.iter().for_each(f),
        }
    }

    fn for_each_child_mut(&mut self, mut f: impl FnMut(&mut CExpr)) {
        match self {
            CExpr::Column(_) | CExpr::Literal(_) => {}
            CExpr::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            CExpr::Unary { expr, .. } | CExpr::IsNull { expr, .. } => f(expr),
            CExpr::Between { expr, low, high, .. } => {
                f(expr);
                f(low);
                f(high);
            }
            CExpr::InList { expr, list, .. } => {
                f(expr);
                list.iter_mut().for_each(f);
            }
            CExpr::Like { expr, pattern, .. } => {
                f(expr);
                f(pattern);
            }
            CExpr::Case {
                operand,
                branches,
                else_result,
            } => {
                if let Some(operand) = operand {
                    f(operand);
                }
                for (when, then) in branches {
                    f(when);
                    f(then);
                }
                if let Some(e) = else_result {
                    f(e);
                }
            }
            CExpr::Function { args, .. } => args.iter_mut().for_each(f),
        }
    }

    /// Smallest and largest column position read, if any.
    pub fn column_span(&self) -> Option<(usize, usize)> {
        let mut span: Option<(usize, usize)> = None;
        self.visit_columns(&mut |i| {
            span = Some(match span {
                Some((lo, hi)) => (lo.min(i), hi.max(i)),
                None => (i, i),
            });
        });
        span
    }

    fn visit_columns<F: FnMut(usize)>(&self, f: &mut F) {
        if let CExpr::Column(i) = self {
            f(*i);
        }
        self.for_each_child(|c| c.visit_columns(&mut *f));
    }

    /// Moves every column position down by `offset`.
    pub fn rebase(&mut self, offset: usize) {
        if let CExpr::Column(i) = self {
            *i -= offset;
        }
        self.for_each_child_mut(|c| c.rebase(offset));
    }
}

fn truth_value(b: Option<bool>) -> Value {
    b.map(Value::Boolean).unwrap_or(Value::Null)
}

fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn type_error(message: String) -> EvalError {
    EvalError::new(EvalErrorKind::TypeMismatch, "", message)
}

/// `value` as a number, if it is a numeric string and `peer` is a number.
fn numeric_peer(value: &Value, peer: &Value) -> Option<Value> {
    match (value, peer) {
        (Value::String(_), Value::Int64(_) | Value::Float64(_)) => value.coerce_numeric(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    value.data_type().map(|t| t.name()).unwrap_or("NULL")
}

/// Evaluates compiled expressions under one set of options.
#[derive(Clone, Copy, Debug)]
pub struct Evaluator<'o> {
    options: &'o ExecutionOptions,
}

impl<'o> Evaluator<'o> {
    pub fn new(options: &'o ExecutionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &'o ExecutionOptions {
        self.options
    }

    /// SQL comparison; strings go through the collation when one is set.
    ///
    /// A string compared with a number is read as a number when it is one,
    /// so `5 = '5'` holds while `5 = 'five'` is a `TypeMismatch`.
    pub fn compare(&self, left: &Value, right: &Value) -> Result<Option<Ordering>, EvalError> {
        if let (Value::String(a), Value::String(b), Some(collation)) =
            (left, right, &self.options.collation)
        {
            return Ok(Some(collation.compare(a, b)));
        }
        if let Some(left) = numeric_peer(left, right) {
            return self.compare(&left, right);
        }
        if let Some(right) = numeric_peer(right, left) {
            return self.compare(left, &right);
        }
        left.sql_cmp(right)
            .map_err(|e| EvalError::type_mismatch(e.left, e.right, ""))
    }

    /// Total order used by sorting and `MIN`/`MAX`. Never fails.
    pub fn sort_cmp(&self, left: &Value, right: &Value) -> Ordering {
        match (left, right, &self.options.collation) {
            (Value::String(a), Value::String(b), Some(collation)) => collation.compare(a, b),
            _ => left.cmp(right),
        }
    }

    /// Truth value of a condition result.
    pub fn truth(&self, value: &Value) -> Result<Option<bool>, EvalError> {
        match value {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            Value::Int64(i) => Ok(Some(*i != 0)),
            Value::Float64(f) => Ok(Some(*f != 0.0)),
            Value::String(_) => match value.coerce_numeric() {
                Some(n) => self.truth(&n),
                None => Err(type_error(format!(
                    "expected a condition, got STRING '{}'",
                    value
                ))),
            },
        }
    }

    /// Evaluates a condition; unknown counts as false.
    pub fn test(&self, expr: &CExpr, row: &Row) -> Result<bool, EvalError> {
        Ok(self.truth(&self.eval(expr, row)?)? == Some(true))
    }

    pub fn eval(&self, expr: &CExpr, row: &Row) -> Result<Value, EvalError> {
        match expr {
            CExpr::Column(i) => Ok(row.get(*i).cloned().unwrap_or(Value::Null)),
            CExpr::Literal(v) => Ok(v.clone()),
            CExpr::Binary { left, op, right } => self.eval_binary(left, *op, right, row),
            CExpr::Unary { op, expr } => {
                let value = self.eval(expr, row)?;
                self.eval_unary(*op, value)
            }
            CExpr::IsNull { expr, negated } => {
                let value = self.eval(expr, row)?;
                Ok(Value::Boolean(value.is_null() != *negated))
            }
            CExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = self.eval(expr, row)?;
                let low = self.eval(low, row)?;
                let high = self.eval(high, row)?;
                let above = self.compare(&value, &low)?.map(|o| o != Ordering::Less);
                let below = self.compare(&value, &high)?.map(|o| o != Ordering::Greater);
                let inside = and3(above, below);
                Ok(truth_value(inside.map(|b| b != *negated)))
            }
            CExpr::InList {
                expr,
                list,
                negated,
            } => {
                let value = self.eval(expr, row)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut unknown = false;
                for item in list {
                    let candidate = self.eval(item, row)?;
                    match self.compare(&value, &candidate)? {
                        Some(Ordering::Equal) => return Ok(Value::Boolean(!*negated)),
                        None => unknown = true,
                        Some(_) => {}
                    }
                }
                Ok(if unknown {
                    Value::Null
                } else {
                    Value::Boolean(*negated)
                })
            }
            CExpr::Like {
                expr,
                pattern,
                negated,
            } => {
                let value = self.eval(expr, row)?;
                let pattern = self.eval(pattern, row)?;
                match (&value, &pattern) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (Value::String(v), Value::String(p)) => Ok(Value::Boolean(like(v, p) != *negated)),
                    _ => {
                        let v = format!("{}", value);
                        let p = format!("{}", pattern);
                        Ok(Value::Boolean(like(&v, &p) != *negated))
                    }
                }
            }
            CExpr::Case {
                operand,
                branches,
                else_result,
            } => {
                match operand {
                    Some(operand) => {
                        let subject = self.eval(operand, row)?;
                        for (when, then) in branches {
                            let candidate = self.eval(when, row)?;
                            if self.compare(&subject, &candidate)? == Some(Ordering::Equal) {
                                return self.eval(then, row);
                            }
                        }
                    }
                    None => {
                        for (when, then) in branches {
                            if self.test(when, row)? {
                                return self.eval(then, row);
                            }
                        }
                    }
                }
                match else_result {
                    Some(e) => self.eval(e, row),
                    None => Ok(Value::Null),
                }
            }
            CExpr::Function { func, args } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, row))
                    .collect::<Result<Vec<_>, _>>()?;
                func.call(self, &args)
            }
        }
    }

    fn eval_binary(&self, left: &CExpr, op: BinaryOp, right: &CExpr, row: &Row) -> Result<Value, EvalError> {
        match op {
            BinaryOp::And => {
                let l = self.truth(&self.eval(left, row)?)?;
                if l == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let r = self.truth(&self.eval(right, row)?)?;
                Ok(truth_value(and3(l, r)))
            }
            BinaryOp::Or => {
                let l = self.truth(&self.eval(left, row)?)?;
                if l == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let r = self.truth(&self.eval(right, row)?)?;
                Ok(truth_value(or3(l, r)))
            }
            BinaryOp::Xor => {
                let l = self.truth(&self.eval(left, row)?)?;
                let r = self.truth(&self.eval(right, row)?)?;
                Ok(truth_value(l.zip(r).map(|(a, b)| a != b)))
            }
            _ => {
                let l = self.eval(left, row)?;
                let r = self.eval(right, row)?;
                self.apply(op, &l, &r)
            }
        }
    }

    /// Applies a non-logical binary operator to two values.
    pub fn apply(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
        if op == BinaryOp::NullSafeEq {
            return Ok(Value::Boolean(match (left.is_null(), right.is_null()) {
                (true, true) => true,
                (true, false) | (false, true) => false,
                (false, false) => self.compare(left, right)? == Some(Ordering::Equal),
            }));
        }
        if op.is_comparison() {
            let ordering = match self.compare(left, right)? {
                Some(o) => o,
                None => return Ok(Value::Null),
            };
            let result = match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Ne => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Boolean(result));
        }
        if left.is_null() || right.is_null() {
            return Ok(Value::Null);
        }
        if op == BinaryOp::Concat {
            return Ok(Value::String(format!("{}{}", left, right)));
        }
        arithmetic(op, left, right)
    }

    fn eval_unary(&self, op: UnaryOp, value: Value) -> Result<Value, EvalError> {
        match op {
            UnaryOp::Not => Ok(truth_value(self.truth(&value)?.map(|b| !b))),
            _ if value.is_null() => Ok(Value::Null),
            UnaryOp::Plus => numeric_operand("+", &value),
            UnaryOp::Neg => match numeric_operand("-", &value)? {
                Value::Int64(i) => Ok(i
                    .checked_neg()
                    .map(Value::Int64)
                    .unwrap_or(Value::Float64(-(i as f64)))),
                Value::Float64(f) => Ok(Value::Float64(-f)),
                other => Ok(other),
            },
        }
    }
}

fn numeric_operand(symbol: &str, value: &Value) -> Result<Value, EvalError> {
    value.coerce_numeric().ok_or_else(|| {
        type_error(format!(
            "operator {} expects numbers, got {}",
            symbol,
            type_name(value)
        ))
    })
}

fn as_f64(value: &Value) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Integer value of a float when it fits, else the float.
fn float_to_int(f: f64) -> Value {
    if f >= -9.2e18 && f <= 9.2e18 {
        Value::Int64(f as i64)
    } else {
        Value::Float64(f)
    }
}

fn int_or_float(
    l: &Value,
    r: &Value,
    checked: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Value {
    match (l, r) {
        (Value::Int64(a), Value::Int64(b)) => checked(*a, *b)
            .map(Value::Int64)
            .unwrap_or_else(|| Value::Float64(float(*a as f64, *b as f64))),
        _ => Value::Float64(float(as_f64(l), as_f64(r))),
    }
}

fn shift_amount(value: &Value) -> i64 {
    match value {
        Value::Int64(i) => *i,
        Value::Float64(f) => libm::trunc(*f) as i64,
        _ => 0,
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let l = numeric_operand(op.symbol(), left)?;
    let r = numeric_operand(op.symbol(), right)?;
    let value = match op {
        BinaryOp::Add => int_or_float(&l, &r, i64::checked_add, |a, b| a + b),
        BinaryOp::Sub => int_or_float(&l, &r, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => int_or_float(&l, &r, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => {
            let divisor = as_f64(&r);
            if divisor == 0.0 {
                Value::Null
            } else {
                Value::Float64(as_f64(&l) / divisor)
            }
        }
        BinaryOp::IntDiv => match (&l, &r) {
            (_, Value::Int64(0)) => Value::Null,
            (Value::Int64(a), Value::Int64(b)) => a
                .checked_div(*b)
                .map(Value::Int64)
                .unwrap_or_else(|| Value::Float64(*a as f64 / *b as f64)),
            _ => {
                let divisor = as_f64(&r);
                if divisor == 0.0 {
                    Value::Null
                } else {
                    float_to_int(libm::trunc(as_f64(&l) / divisor))
                }
            }
        },
        BinaryOp::Mod => match (&l, &r) {
            (_, Value::Int64(0)) => Value::Null,
            // i64::MIN % -1 overflows; the remainder is 0.
            (Value::Int64(a), Value::Int64(b)) => Value::Int64(a.checked_rem(*b).unwrap_or(0)),
            _ => {
                let divisor = as_f64(&r);
                if divisor == 0.0 {
                    Value::Null
                } else {
                    Value::Float64(libm::fmod(as_f64(&l), divisor))
                }
            }
        },
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
            let a = shift_amount(&l);
            let b = shift_amount(&r);
            if !(0..64).contains(&b) {
                Value::Int64(0)
            } else if op == BinaryOp::ShiftLeft {
                Value::Int64(a.wrapping_shl(b as u32))
            } else {
                Value::Int64(a >> b)
            }
        }
        _ => {
            return Err(type_error(format!(
                "operator {} is not arithmetic",
                op.symbol()
            )))
        }
    };
    Ok(value)
}
