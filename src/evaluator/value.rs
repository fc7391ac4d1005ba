//! Runtime values of compile-time code blocks

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    /// Numeric view of the value, `None` for non-numeric strings.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Null => Some(Number::Int(0)),
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(Number::Int)
                    .or_else(|_| s.parse::<f64>().map(Number::Float))
                    .ok()
            }
        }
    }

    pub(crate) fn number(&self, op: &str) -> Result<Number, EvaluationError> {
        self.as_number().ok_or_else(|| {
            EvaluationError::Type(format!("unsupported operand {} for `{}`", self.type_name(), op))
        })
    }

    /// Loose equality: booleans compare by truthiness, numbers numerically,
    /// everything else as text.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(_), _) | (_, Value::Bool(_)) => self.is_truthy() == other.is_truthy(),
            (Value::Null, Value::Null) => true,
            (Value::Null, v) | (v, Value::Null) => !v.is_truthy(),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
                _ => self.to_string() == other.to_string(),
            },
        }
    }

    pub fn loose_cmp(&self, other: &Value) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

/// Echo formatting.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null | Value::Bool(false) => Ok(()),
            Value::Bool(true) => f.write_str("1"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", Number::Float(*x)),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{}", x as i64)
            }
            Number::Float(x) if x.is_nan() => f.write_str("NAN"),
            Number::Float(x) if x.is_infinite() => {
                f.write_str(if x > 0.0 { "INF" } else { "-INF" })
            }
            Number::Float(x) => write!(f, "{}", x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_formatting() {
        assert_eq!(Value::Int(4).to_string(), "4");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(4.0).to_string(), "4");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Bool(false).to_string(), "");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("0").is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0.0").is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
    }

    #[test]
    fn test_loose_eq() {
        assert!(Value::from("10").loose_eq(&Value::Int(10)));
        assert!(Value::Null.loose_eq(&Value::from("")));
        assert!(!Value::from("abc").loose_eq(&Value::from("abd")));
        assert!(Value::Bool(true).loose_eq(&Value::from("yes")));
    }
}
