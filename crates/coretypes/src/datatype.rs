use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown data type: {0}")]
pub struct UnknownDataType(pub String);

/// Column types as reported by physical backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int32,
    Int64,
    Float64,
    Utf8,
}

impl DataType {
    pub const fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DataType::*;
        match self {
            Bool => write!(f, "BOOL"),
            Int32 => write!(f, "INT32"),
            Int64 => write!(f, "INT64"),
            Float64 => write!(f, "FLOAT64"),
            Utf8 => write!(f, "UTF8"),
        }
    }
}

impl FromStr for DataType {
    type Err = UnknownDataType;

    /// Parse the type names backends commonly report.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => DataType::Bool,
            "int" | "int4" | "int32" | "integer" => DataType::Int32,
            "bigint" | "int8" | "int64" => DataType::Int64,
            "double" | "float8" | "float64" | "decimal" => DataType::Float64,
            "text" | "varchar" | "char" | "utf8" | "string" => DataType::Utf8,
            other => return Err(UnknownDataType(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_backend_names() {
        assert_eq!(DataType::Int32, "INT".parse().unwrap());
        assert_eq!(DataType::Int64, "bigint".parse().unwrap());
        assert_eq!(DataType::Utf8, "VARCHAR".parse().unwrap());
        assert_eq!(
            Err(UnknownDataType("geometry".to_string())),
            "geometry".parse::<DataType>()
        );
    }
}
