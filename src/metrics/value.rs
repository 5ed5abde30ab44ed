//! Typed metric values and the declared value-type enumeration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Float,
    Str,
    Bool,
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "str" => Ok(ValueType::Str),
            "bool" => Ok(ValueType::Bool),
            other => Err(format!("unknown value type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl MetricValue {
    /// Numeric view used by aggregates and rule comparisons; `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(i) => Some(*i as f64),
            MetricValue::Float(f) => Some(*f),
            MetricValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            MetricValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetricValue::Bool(b) => Some(*b),
            MetricValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Coerces `self` into `declared`, following the declared metric type.
    /// Numeric cross-coercion (int<->float, bool-as-0/1) is permitted; string
    /// values never implicitly convert to/from other kinds.
    pub fn coerce(&self, declared: ValueType) -> Result<MetricValue, String> {
        match (declared, self) {
            (ValueType::Int, MetricValue::Int(i)) => Ok(MetricValue::Int(*i)),
            (ValueType::Int, MetricValue::Float(f)) => Ok(MetricValue::Int(*f as i64)),
            (ValueType::Int, MetricValue::Bool(b)) => Ok(MetricValue::Int(if *b { 1 } else { 0 })),
            (ValueType::Float, MetricValue::Float(f)) => Ok(MetricValue::Float(*f)),
            (ValueType::Float, MetricValue::Int(i)) => Ok(MetricValue::Float(*i as f64)),
            (ValueType::Bool, MetricValue::Bool(b)) => Ok(MetricValue::Bool(*b)),
            (ValueType::Bool, MetricValue::Int(i)) => Ok(MetricValue::Bool(*i != 0)),
            (ValueType::Str, MetricValue::Str(s)) => Ok(MetricValue::Str(s.clone())),
            (declared, got) => Err(format!("cannot coerce {got:?} into {declared:?}")),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(i) => write!(f, "{i}"),
            MetricValue::Float(x) => write!(f, "{x}"),
            MetricValue::Str(s) => write!(f, "{s}"),
            MetricValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Str(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_int_to_float() {
        let v = MetricValue::Int(3).coerce(ValueType::Float).unwrap();
        assert_eq!(v, MetricValue::Float(3.0));
    }

    #[test]
    fn rejects_str_into_numeric() {
        assert!(MetricValue::Str("x".into()).coerce(ValueType::Int).is_err());
    }

    #[test]
    fn bool_coerces_to_int() {
        assert_eq!(
            MetricValue::Bool(true).coerce(ValueType::Int).unwrap(),
            MetricValue::Int(1)
        );
    }
}
