use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::datatype::DataType;
use crate::totalfloat::NotNanF64;

/// An owned value for a single column of a single row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(NotNanF64),
    Utf8(String),
}

/// Normalized value used for equality joins and grouping.
///
/// Integers of different widths compare equal when their values are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JoinKey {
    Bool(bool),
    Int(i64),
    Float(NotNanF64),
    Utf8(String),
}

impl ScalarValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Get the type of this value, `None` for nulls.
    pub const fn datatype(&self) -> Option<DataType> {
        Some(match self {
            ScalarValue::Null => return None,
            ScalarValue::Bool(_) => DataType::Bool,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
        })
    }

    /// Get the value as a 64-bit integer if it's an integer type.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int32(v) => Some(*v as i64),
            ScalarValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a float if it's any numeric type.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int32(v) => Some(*v as f64),
            ScalarValue::Int64(v) => Some(*v as f64),
            ScalarValue::Float64(v) => Some(**v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// Key to use when comparing this value for equality against values from
    /// other tables. Nulls never produce a key since they never compare equal.
    pub fn join_key(&self) -> Option<JoinKey> {
        Some(match self {
            ScalarValue::Null => return None,
            ScalarValue::Bool(v) => JoinKey::Bool(*v),
            ScalarValue::Int32(v) => JoinKey::Int(*v as i64),
            ScalarValue::Int64(v) => JoinKey::Int(*v),
            ScalarValue::Float64(v) => JoinKey::Float(*v),
            ScalarValue::Utf8(v) => JoinKey::Utf8(v.clone()),
        })
    }

    /// Check SQL equality. Nulls are never equal to anything.
    pub fn sql_eq(&self, other: &ScalarValue) -> bool {
        match (self.join_key(), other.join_key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Total order used for sorting. Nulls sort first, numeric values compare
    /// across widths, and values of unrelated types are ordered by type.
    pub fn total_cmp(&self, other: &ScalarValue) -> Ordering {
        use ScalarValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Utf8(a), Utf8(b)) => a.cmp(b),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => a.total_cmp(&b),
                    _ => a.type_rank().cmp(&b.type_rank()),
                },
            },
        }
    }

    const fn type_rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Bool(_) => 1,
            ScalarValue::Int32(_) | ScalarValue::Int64(_) | ScalarValue::Float64(_) => 2,
            ScalarValue::Utf8(_) => 3,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int32(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
            ScalarValue::Utf8(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(val: bool) -> Self {
        ScalarValue::Bool(val)
    }
}

impl From<i32> for ScalarValue {
    fn from(val: i32) -> Self {
        ScalarValue::Int32(val)
    }
}

impl From<i64> for ScalarValue {
    fn from(val: i64) -> Self {
        ScalarValue::Int64(val)
    }
}

impl From<f64> for ScalarValue {
    /// NaN is converted to null.
    fn from(val: f64) -> Self {
        match NotNanF64::new(val) {
            Some(v) => ScalarValue::Float64(v),
            None => ScalarValue::Null,
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(val: &str) -> Self {
        ScalarValue::Utf8(val.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(val: String) -> Self {
        ScalarValue::Utf8(val)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(v) => v.into(),
            None => ScalarValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keys_cross_int_widths() {
        let a = ScalarValue::Int32(1000);
        let b = ScalarValue::Int64(1000);
        assert!(a.sql_eq(&b));
        assert_eq!(a.join_key(), b.join_key());
    }

    #[test]
    fn nulls_never_equal() {
        assert!(!ScalarValue::Null.sql_eq(&ScalarValue::Null));
        assert!(ScalarValue::Null.join_key().is_none());
    }

    #[test]
    fn ordering() {
        let mut vals = vec![
            ScalarValue::from("b"),
            ScalarValue::Int64(3),
            ScalarValue::Null,
            ScalarValue::Int32(-1),
            ScalarValue::from(2.5),
            ScalarValue::from("a"),
        ];
        vals.sort_by(|a, b| a.total_cmp(b));

        assert_eq!(
            vec![
                ScalarValue::Null,
                ScalarValue::Int32(-1),
                ScalarValue::from(2.5),
                ScalarValue::Int64(3),
                ScalarValue::from("a"),
                ScalarValue::from("b"),
            ],
            vals
        );
    }
}
