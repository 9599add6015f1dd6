//! Dynamic values
//!
//! Random choices, arguments and return values all travel as [`Value`], so
//! generative functions of different shapes compose behind one object-safe
//! protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GenError, GenResult};

/// A dynamically typed value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Bool(bool),
    I64(i64),
    Usize(usize),
    F64(f64),
    /// Persistent list; clones share structure
    List(im::Vector<Value>),
}

impl Value {
    /// Name of the variant, used in type errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::I64(_) => "i64",
            Self::Usize(_) => "usize",
            Self::F64(_) => "f64",
            Self::List(_) => "list",
        }
    }

    fn type_error(&self, expected: &str) -> GenError {
        GenError::ValueType {
            expected: expected.to_string(),
            found: self.type_name().to_string(),
        }
    }

    /// Numeric view; integers widen to `f64`
    pub fn as_f64(&self) -> GenResult<f64> {
        match self {
            Self::F64(x) => Ok(*x),
            Self::I64(n) => Ok(*n as f64),
            Self::Usize(n) => Ok(*n as f64),
            other => Err(other.type_error("f64")),
        }
    }

    pub fn as_usize(&self) -> GenResult<usize> {
        match self {
            Self::Usize(n) => Ok(*n),
            Self::I64(n) if *n >= 0 => Ok(*n as usize),
            other => Err(other.type_error("usize")),
        }
    }

    pub fn as_i64(&self) -> GenResult<i64> {
        match self {
            Self::I64(n) => Ok(*n),
            Self::Usize(n) => Ok(*n as i64),
            other => Err(other.type_error("i64")),
        }
    }

    pub fn as_bool(&self) -> GenResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(other.type_error("bool")),
        }
    }

    pub fn as_list(&self) -> GenResult<&im::Vector<Value>> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(other.type_error("list")),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::F64(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::I64(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Usize(n)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Unit
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::List(iter.into_iter().collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::I64(n) => write!(f, "{}", n),
            Self::Usize(n) => write!(f, "{}", n),
            Self::F64(x) => write!(f, "{}", x),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Check that `args` has exactly `expected` entries
pub(crate) fn expect_arity(args: &[Value], expected: usize) -> GenResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(GenError::ArgumentCount {
            expected,
            found: args.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Value::Usize(3).as_f64().unwrap(), 3.0);
        assert_eq!(Value::I64(-2).as_f64().unwrap(), -2.0);
        assert_eq!(Value::I64(5).as_usize().unwrap(), 5);
        assert!(Value::I64(-5).as_usize().is_err());
    }

    #[test]
    fn test_type_error_names_types() {
        let err = Value::Bool(true).as_f64().unwrap_err();
        assert_eq!(err.to_string(), "Type mismatch: expected f64, found bool");
    }

    #[test]
    fn test_list_display_and_collect() {
        let list: Value = vec![Value::F64(1.0), Value::F64(2.5)].into_iter().collect();
        assert_eq!(list.to_string(), "[1, 2.5]");
        assert_eq!(list.as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_expect_arity() {
        assert!(expect_arity(&[Value::Unit], 1).is_ok());
        assert_eq!(
            expect_arity(&[], 2),
            Err(GenError::ArgumentCount {
                expected: 2,
                found: 0
            })
        );
    }
}
