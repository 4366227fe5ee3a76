//! Evaluation-stack values and their types.

use crate::result::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Static type of a value on the evaluation stack, an argument, a local or a provider result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I32,
    I64,
    Bool,
}

impl ValueType {
    /// Returns true for types that support arithmetic and ordering.
    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::I32 | ValueType::I64)
    }

    /// Keyword used by the assembly format.
    pub fn keyword(self) -> &'static str {
        match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::Bool => "bool",
        }
    }

    /// Zero value used to initialise locals.
    pub fn default_value(self) -> Value {
        match self {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::Bool => Value::Bool(false),
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            ValueType::I32 => 0x01,
            ValueType::I64 => 0x02,
            ValueType::Bool => 0x03,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "i32" => Ok(ValueType::I32),
            "i64" => Ok(ValueType::I64),
            "bool" => Ok(ValueType::Bool),
            other => Err(Error::UnknownType(other.to_string())),
        }
    }
}

/// A typed runtime value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    I32(i32),
    I64(i64),
    Bool(bool),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::Bool(_) => ValueType::Bool,
        }
    }

    /// Branch condition semantics: `false` and numeric zero are falsy.
    pub fn is_truthy(&self) -> bool {
        match *self {
            Value::I32(v) => v != 0,
            Value::I64(v) => v != 0,
            Value::Bool(v) => v,
        }
    }

    /// Parses `token` as a value of type `ty`. Integers accept decimal or `0x` hex.
    pub fn parse_as(ty: ValueType, token: &str) -> Option<Value> {
        let token = token.trim();
        match ty {
            ValueType::I32 => parse_int(token)
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::I32),
            ValueType::I64 => parse_int(token).map(Value::I64),
            ValueType::Bool => match token {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }
}

fn parse_int(token: &str) -> Option<i64> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}
