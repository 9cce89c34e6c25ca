//! Validation of rule mutations.
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::errors::{Result, RuleStoreError};
use crate::types::ShardingTableRule;

/// Find every table name in `candidates` that's either named more than once
/// in the request itself, or that already exists in the schema.
///
/// `existing` should contain both the schema's catalog tables and the tables
/// already covered by a sharding rule.
pub fn find_duplicate_tables<'a>(
    existing: impl IntoIterator<Item = &'a str>,
    candidates: &[ShardingTableRule],
) -> BTreeSet<String> {
    // Duplicates within the request.
    let mut counts: HashMap<&str, usize> = HashMap::with_capacity(candidates.len());
    for rule in candidates {
        *counts.entry(rule.logic_table.as_str()).or_default() += 1;
    }
    let mut duplicates: BTreeSet<String> = counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(name, _)| name.to_string())
        .collect();

    // Collisions with what the schema already knows about.
    let existing: HashSet<&str> = existing.into_iter().collect();
    duplicates.extend(
        counts
            .keys()
            .filter(|name| existing.contains(*name))
            .map(|name| name.to_string()),
    );

    duplicates
}

/// Validate a create request, rejecting the whole request if any table name
/// is duplicated.
pub fn validate_create<'a>(
    existing: impl IntoIterator<Item = &'a str>,
    candidates: &[ShardingTableRule],
) -> Result<()> {
    let duplicates = find_duplicate_tables(existing, candidates);
    if !duplicates.is_empty() {
        return Err(RuleStoreError::DuplicateTables(duplicates));
    }
    Ok(())
}
