//! Typed field values, as produced by decoding a stored point.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    /// Returns the value as a float if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Boolean(_) | Self::String(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// A total order over values of any type, used when sorting distinct
    /// values: booleans, then numbers, then strings.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        fn rank(v: &FieldValue) -> u8 {
            match v {
                FieldValue::Boolean(_) => 0,
                FieldValue::Float(_) | FieldValue::Integer(_) => 1,
                FieldValue::String(_) => 2,
            }
        }

        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => rank(a).cmp(&rank(b)),
            },
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}i"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_cmp_orders_across_types() {
        let mut values = vec![
            FieldValue::from("b"),
            FieldValue::from(2.5),
            FieldValue::from(true),
            FieldValue::from(2_i64),
            FieldValue::from("a"),
            FieldValue::from(false),
        ];
        values.sort_by(FieldValue::total_cmp);
        assert_eq!(
            values,
            vec![
                FieldValue::from(false),
                FieldValue::from(true),
                FieldValue::from(2_i64),
                FieldValue::from(2.5),
                FieldValue::from("a"),
                FieldValue::from("b"),
            ]
        );
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&vec![
            FieldValue::from(1.5),
            FieldValue::from(3_i64),
            FieldValue::from("x"),
        ])
        .unwrap();
        assert_eq!(json, r#"[1.5,3,"x"]"#);
    }
}
