//! Sharding strategy evaluation.
use std::collections::BTreeSet;

use coretypes::scalar::ScalarValue;
use rulestore::segment::SHARDING_COUNT_PROP;
use rulestore::types::AlgorithmConfig;

use crate::errors::{strategy_err, Result};

/// Maps sharding values to shard indexes.
///
/// Implementations must be pure: the same algorithm and values always
/// produce the same shards on every node.
pub trait ShardStrategyEvaluator: Send + Sync {
    /// Compute the shards that may hold rows whose sharding column equals
    /// any of `values`.
    ///
    /// `shard_count` is the number of data nodes of the table. Returned
    /// indexes are sorted and deduplicated. May return indexes outside of
    /// `0..shard_count`, the router rejects those.
    fn shard_indexes(
        &self,
        algorithm: &AlgorithmConfig,
        shard_count: usize,
        values: &[ScalarValue],
    ) -> Result<Vec<usize>>;
}

/// Evaluator for the built in `MOD` and `HASH_MOD` algorithms.
///
/// The modulus is the algorithm's `sharding-count` property, or the table's
/// shard count if the property isn't set.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEvaluator;

impl ShardStrategyEvaluator for BuiltinEvaluator {
    fn shard_indexes(
        &self,
        algorithm: &AlgorithmConfig,
        shard_count: usize,
        values: &[ScalarValue],
    ) -> Result<Vec<usize>> {
        let modulus = match algorithm.props.get(SHARDING_COUNT_PROP) {
            Some(count) => count
                .parse::<u64>()
                .map_err(|_| strategy_err!("invalid {SHARDING_COUNT_PROP}: '{count}'"))?,
            None => shard_count as u64,
        };
        if modulus == 0 {
            return Err(strategy_err!("{SHARDING_COUNT_PROP} must be greater than zero"));
        }

        let mut indexes = BTreeSet::new();
        for value in values {
            // Nulls never equal a sharding value.
            if value.is_null() {
                continue;
            }
            let idx = match algorithm.algorithm_type.as_str() {
                "MOD" => mod_shard(value, modulus)?,
                "HASH_MOD" => hash_mod_shard(value, modulus),
                other => return Err(strategy_err!("unsupported algorithm type: {other}")),
            };
            indexes.insert(idx);
        }

        Ok(indexes.into_iter().collect())
    }
}

fn mod_shard(value: &ScalarValue, modulus: u64) -> Result<usize> {
    let v = match value {
        ScalarValue::Utf8(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| strategy_err!("MOD requires an integer sharding value, got '{s}'"))?,
        other => other
            .as_i64()
            .ok_or_else(|| strategy_err!("MOD requires an integer sharding value, got '{other}'"))?,
    };
    Ok((v.unsigned_abs() % modulus) as usize)
}

fn hash_mod_shard(value: &ScalarValue, modulus: u64) -> usize {
    let hash = match value.as_i64() {
        Some(v) => v.unsigned_abs(),
        None => string_hash(&value.to_string()),
    };
    (hash % modulus) as usize
}

/// 31-based polynomial hash over the string's UTF-16 code units.
fn string_hash(s: &str) -> u64 {
    let hash = s
        .encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32));
    hash.unsigned_abs() as u64
}
