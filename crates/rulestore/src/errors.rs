use std::collections::BTreeSet;

use crate::bus::BusError;

#[derive(Debug, thiserror::Error)]
pub enum RuleStoreError {
    #[error("Duplicate table names: {}", format_names(.0))]
    DuplicateTables(BTreeSet<String>),

    #[error("Sharding algorithm '{name}' already exists with a different definition")]
    AlgorithmConflict { name: String },

    #[error("Missing schema: {0}")]
    MissingSchema(String),

    #[error("Invalid sharding rule: {0}")]
    InvalidRule(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

fn format_names(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}

pub type Result<T, E = RuleStoreError> = std::result::Result<T, E>;

#[allow(unused_macros)]
macro_rules! invalid_rule {
    ($($arg:tt)*) => {
        crate::errors::RuleStoreError::InvalidRule(std::format!($($arg)*))
    };
}
pub(crate) use invalid_rule;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_tables_lists_every_name() {
        let err = RuleStoreError::DuplicateTables(
            ["t_order".to_string(), "t_item".to_string()].into_iter().collect(),
        );
        assert_eq!("Duplicate table names: t_item, t_order", err.to_string());
    }
}
