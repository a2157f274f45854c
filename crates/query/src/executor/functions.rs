//! Scalar functions.

use crate::executor::eval::Evaluator;
use alloc::format;
use alloc::string::{String, ToString};
use core::cmp::Ordering;
use rowql_core::{EvalError, EvalErrorKind, Value};

/// Built-in scalar functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarFunction {
    Upper,
    Lower,
    /// Length in bytes.
    Length,
    /// Length in characters.
    CharLength,
    Abs,
    Round,
    Coalesce,
    IfNull,
    NullIf,
    Concat,
    Substring,
    Trim,
    LTrim,
    RTrim,
    Left,
    Right,
}

impl ScalarFunction {
    /// Looks up a function by (case-insensitive) name.
    pub fn from_name(name: &str) -> Option<ScalarFunction> {
        const NAMES: &[(&str, ScalarFunction)] = &[
            ("UPPER", ScalarFunction::Upper),
            ("UCASE", ScalarFunction::Upper),
            ("LOWER", ScalarFunction::Lower),
            ("LCASE", ScalarFunction::Lower),
            ("LENGTH", ScalarFunction::Length),
            ("CHAR_LENGTH", ScalarFunction::CharLength),
            ("CHARACTER_LENGTH", ScalarFunction::CharLength),
            ("ABS", ScalarFunction::Abs),
            ("ROUND", ScalarFunction::Round),
            ("COALESCE", ScalarFunction::Coalesce),
            ("IFNULL", ScalarFunction::IfNull),
            ("NULLIF", ScalarFunction::NullIf),
            ("CONCAT", ScalarFunction::Concat),
            ("SUBSTRING", ScalarFunction::Substring),
            ("SUBSTR", ScalarFunction::Substring),
            ("TRIM", ScalarFunction::Trim),
            ("LTRIM", ScalarFunction::LTrim),
            ("RTRIM", ScalarFunction::RTrim),
            ("LEFT", ScalarFunction::Left),
            ("RIGHT", ScalarFunction::Right),
        ];
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunction::Upper => "UPPER",
            ScalarFunction::Lower => "LOWER",
            ScalarFunction::Length => "LENGTH",
            ScalarFunction::CharLength => "CHAR_LENGTH",
            ScalarFunction::Abs => "ABS",
            ScalarFunction::Round => "ROUND",
            ScalarFunction::Coalesce => "COALESCE",
            ScalarFunction::IfNull => "IFNULL",
            ScalarFunction::NullIf => "NULLIF",
            ScalarFunction::Concat => "CONCAT",
            ScalarFunction::Substring => "SUBSTRING",
            ScalarFunction::Trim => "TRIM",
            ScalarFunction::LTrim => "LTRIM",
            ScalarFunction::RTrim => "RTRIM",
            ScalarFunction::Left => "LEFT",
            ScalarFunction::Right => "RIGHT",
        }
    }

    /// Accepted argument counts; `None` means unbounded.
    fn arity(&self) -> (usize, Option<usize>) {
        match self {
            ScalarFunction::Upper
            | ScalarFunction::Lower
            | ScalarFunction::Length
            | ScalarFunction::CharLength
            | ScalarFunction::Abs
            | ScalarFunction::Trim
            | ScalarFunction::LTrim
            | ScalarFunction::RTrim => (1, Some(1)),
            ScalarFunction::Round => (1, Some(2)),
            ScalarFunction::IfNull
            | ScalarFunction::NullIf
            | ScalarFunction::Left
            | ScalarFunction::Right => (2, Some(2)),
            ScalarFunction::Substring => (2, Some(3)),
            ScalarFunction::Coalesce | ScalarFunction::Concat => (1, None),
        }
    }

    /// Validates the number of arguments at a call site.
    pub fn check_arity(&self, count: usize) -> Result<(), EvalError> {
        let (min, max) = self.arity();
        if count >= min && max.map_or(true, |m| count <= m) {
            return Ok(());
        }
        let expected = match max {
            Some(m) if m == min => format!("{}", min),
            Some(m) => format!("{} to {}", min, m),
            None => format!("at least {}", min),
        };
        Err(EvalError::invalid_argument(
            self.name(),
            format!("{} expects {} arguments, got {}", self.name(), expected, count),
        ))
    }

    /// Applies the function to evaluated arguments.
    pub fn call(&self, eval: &Evaluator<'_>, args: &[Value]) -> Result<Value, EvalError> {
        match self {
            ScalarFunction::Coalesce => {
                return Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null))
            }
            ScalarFunction::IfNull => {
                return Ok(if args[0].is_null() { args[1].clone() } else { args[0].clone() })
            }
            ScalarFunction::NullIf => {
                // Values of different domains are never equal.
                let equal = matches!(eval.compare(&args[0], &args[1]), Ok(Some(Ordering::Equal)));
                return Ok(if equal { Value::Null } else { args[0].clone() });
            }
            _ => {}
        }
        if args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }
        let value = match self {
            ScalarFunction::Upper => Value::String(text(&args[0]).to_uppercase()),
            ScalarFunction::Lower => Value::String(text(&args[0]).to_lowercase()),
            ScalarFunction::Length => Value::Int64(text(&args[0]).len() as i64),
            ScalarFunction::CharLength => Value::Int64(text(&args[0]).chars().count() as i64),
            ScalarFunction::Abs => match self.number(&args[0])? {
                Value::Int64(i) => i
                    .checked_abs()
                    .map(Value::Int64)
                    .unwrap_or(Value::Float64(-(i as f64))),
                Value::Float64(f) => Value::Float64(libm::fabs(f)),
                other => other,
            },
            ScalarFunction::Round => {
                let digits = match args.get(1) {
                    Some(d) => self.integer(d)?,
                    None => 0,
                };
                round(self.number(&args[0])?, digits)
            }
            ScalarFunction::Concat => {
                let mut out = String::new();
                for arg in args {
                    out.push_str(&text(arg));
                }
                Value::String(out)
            }
            ScalarFunction::Substring => {
                let s = text(&args[0]);
                let start = self.integer(&args[1])?;
                let len = match args.get(2) {
                    Some(l) => Some(self.integer(l)?),
                    None => None,
                };
                Value::String(substring(&s, start, len))
            }
            ScalarFunction::Trim => Value::String(text(&args[0]).trim().to_string()),
            ScalarFunction::LTrim => Value::String(text(&args[0]).trim_start().to_string()),
            ScalarFunction::RTrim => Value::String(text(&args[0]).trim_end().to_string()),
            ScalarFunction::Left => {
                let s = text(&args[0]);
                let n = self.integer(&args[1])?.max(0) as usize;
                Value::String(s.chars().take(n).collect())
            }
            ScalarFunction::Right => {
                let s = text(&args[0]);
                let n = self.integer(&args[1])?.max(0) as usize;
                let count = s.chars().count();
                Value::String(s.chars().skip(count.saturating_sub(n)).collect())
            }
            ScalarFunction::Coalesce | ScalarFunction::IfNull | ScalarFunction::NullIf => Value::Null,
        };
        Ok(value)
    }

    fn number(&self, value: &Value) -> Result<Value, EvalError> {
        value.coerce_numeric().ok_or_else(|| {
            EvalError::new(
                EvalErrorKind::InvalidArgument,
                self.name(),
                format!("{} expects a number, got '{}'", self.name(), value),
            )
        })
    }

    fn integer(&self, value: &Value) -> Result<i64, EvalError> {
        match self.number(value)? {
            Value::Int64(i) => Ok(i),
            Value::Float64(f) => Ok(libm::round(f) as i64),
            _ => Ok(0),
        }
    }
}

/// String form of a non-null argument.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn round(value: Value, digits: i64) -> Value {
    let digits = digits.clamp(-18, 18) as i32;
    match value {
        Value::Int64(i) if digits >= 0 => Value::Int64(i),
        Value::Int64(i) => {
            let factor = libm::pow(10.0, -digits as f64);
            let rounded = libm::round(i as f64 / factor) * factor;
            if libm::fabs(rounded) < 9.2e18 {
                Value::Int64(rounded as i64)
            } else {
                Value::Float64(rounded)
            }
        }
        Value::Float64(f) => {
            let factor = libm::pow(10.0, digits as f64);
            Value::Float64(libm::round(f * factor) / factor)
        }
        other => other,
    }
}

/// 1-based character substring; a negative start counts from the end.
fn substring(s: &str, start: i64, len: Option<i64>) -> String {
    let count = s.chars().count() as i64;
    let begin = match start {
        0 => return String::new(),
        p if p > 0 => p - 1,
        p => count + p,
    };
    if begin < 0 || begin >= count {
        return String::new();
    }
    let take = match len {
        Some(l) if l <= 0 => return String::new(),
        Some(l) => l as usize,
        None => usize::MAX,
    };
    s.chars().skip(begin as usize).take(take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionOptions;
    use alloc::vec;
    use alloc::vec::Vec;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let options = ExecutionOptions::default();
        let eval = Evaluator::new(&options);
        let func = ScalarFunction::from_name(name).unwrap();
        func.check_arity(args.len())?;
        func.call(&eval, &args)
    }

    #[test]
    fn test_lookup() {
        assert_eq!(ScalarFunction::from_name("substr"), Some(ScalarFunction::Substring));
        assert_eq!(ScalarFunction::from_name("Char_Length"), Some(ScalarFunction::CharLength));
        assert_eq!(ScalarFunction::from_name("NOW"), None);
    }

    #[test]
    fn test_arity() {
        let err = call("UPPER", vec![]).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::InvalidArgument);
        assert!(err.message.contains("expects 1"));
        let err = call("SUBSTRING", vec!["a".into()]).unwrap_err();
        assert!(err.message.contains("2 to 3"));
        assert!(ScalarFunction::Concat.check_arity(7).is_ok());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("UPPER", vec!["abc".into()]).unwrap(), Value::from("ABC"));
        assert_eq!(call("LOWER", vec!["AbC".into()]).unwrap(), Value::from("abc"));
        assert_eq!(call("LENGTH", vec!["héllo".into()]).unwrap(), Value::Int64(6));
        assert_eq!(call("CHAR_LENGTH", vec!["héllo".into()]).unwrap(), Value::Int64(5));
        assert_eq!(call("TRIM", vec!["  x ".into()]).unwrap(), Value::from("x"));
        assert_eq!(call("LTRIM", vec!["  x ".into()]).unwrap(), Value::from("x "));
        assert_eq!(call("RTRIM", vec!["  x ".into()]).unwrap(), Value::from("  x"));
        assert_eq!(
            call("CONCAT", vec!["a".into(), Value::Int64(1), "b".into()]).unwrap(),
            Value::from("a1b")
        );
        assert_eq!(call("CONCAT", vec!["a".into(), Value::Null]).unwrap(), Value::Null);
        assert_eq!(call("LEFT", vec!["hello".into(), Value::Int64(2)]).unwrap(), Value::from("he"));
        assert_eq!(call("RIGHT", vec!["hello".into(), Value::Int64(3)]).unwrap(), Value::from("llo"));
        assert_eq!(call("RIGHT", vec!["hi".into(), Value::Int64(9)]).unwrap(), Value::from("hi"));
    }

    #[test]
    fn test_substring() {
        let s = || Value::from("database");
        assert_eq!(call("SUBSTRING", vec![s(), Value::Int64(5)]).unwrap(), Value::from("base"));
        assert_eq!(
            call("SUBSTR", vec![s(), Value::Int64(1), Value::Int64(4)]).unwrap(),
            Value::from("data")
        );
        assert_eq!(call("SUBSTRING", vec![s(), Value::Int64(-4)]).unwrap(), Value::from("base"));
        assert_eq!(call("SUBSTRING", vec![s(), Value::Int64(0)]).unwrap(), Value::from(""));
        assert_eq!(call("SUBSTRING", vec![s(), Value::Int64(20)]).unwrap(), Value::from(""));
        let err = call("SUBSTRING", vec![s(), "x".into()]).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::InvalidArgument);
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(call("ABS", vec![Value::Int64(-3)]).unwrap(), Value::Int64(3));
        assert_eq!(call("ABS", vec![Value::Float64(-2.5)]).unwrap(), Value::Float64(2.5));
        assert_eq!(call("ABS", vec!["-4".into()]).unwrap(), Value::Int64(4));
        assert_eq!(call("ROUND", vec![Value::Float64(2.5)]).unwrap(), Value::Float64(3.0));
        assert_eq!(
            call("ROUND", vec![Value::Float64(3.14159), Value::Int64(2)]).unwrap(),
            Value::Float64(3.14)
        );
        assert_eq!(call("ROUND", vec![Value::Int64(1234), Value::Int64(-2)]).unwrap(), Value::Int64(1200));
        assert_eq!(call("ROUND", vec![Value::Int64(7)]).unwrap(), Value::Int64(7));
        let err = call("ABS", vec!["abc".into()]).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::InvalidArgument);
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(call("UPPER", vec![Value::Null]).unwrap(), Value::Null);
        assert_eq!(
            call("COALESCE", vec![Value::Null, Value::Int64(2), Value::Int64(3)]).unwrap(),
            Value::Int64(2)
        );
        assert_eq!(call("COALESCE", vec![Value::Null]).unwrap(), Value::Null);
        assert_eq!(call("IFNULL", vec![Value::Null, "d".into()]).unwrap(), Value::from("d"));
        assert_eq!(call("IFNULL", vec!["v".into(), "d".into()]).unwrap(), Value::from("v"));
        assert_eq!(call("NULLIF", vec![Value::Int64(1), Value::Float64(1.0)]).unwrap(), Value::Null);
        assert_eq!(call("NULLIF", vec![Value::Int64(1), Value::Int64(2)]).unwrap(), Value::Int64(1));
        assert_eq!(call("NULLIF", vec![Value::Int64(1), "1x".into()]).unwrap(), Value::Int64(1));
    }
}
