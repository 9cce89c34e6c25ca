//! Conversion of create requests into auto-table rules.
use std::collections::{BTreeMap, HashMap};

use common::config::{RuleBootstrap, RulesConfig};
use serde::{Deserialize, Serialize};

use crate::errors::{invalid_rule, Result, RuleStoreError};
use crate::types::{AlgorithmConfig, DataNode, ShardStrategy, ShardingRuleConfiguration, ShardingTableRule};

/// Property holding the number of shards for an auto table.
pub const SHARDING_COUNT_PROP: &str = "sharding-count";

/// One table entry of a create sharding table rule request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRuleSegment {
    pub logic_table: String,
    /// Data sources the table's shards are spread across.
    pub resources: Vec<String>,
    pub sharding_column: String,
    /// Algorithm type, the configured default is used if missing.
    pub algorithm_type: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl From<RuleBootstrap> for TableRuleSegment {
    fn from(value: RuleBootstrap) -> Self {
        TableRuleSegment {
            logic_table: value.logic_table,
            resources: value.resources,
            sharding_column: value.sharding_column,
            algorithm_type: value.algorithm_type,
            properties: value.properties,
        }
    }
}

/// Convert request segments into a sharding configuration containing one
/// auto table rule and one algorithm per segment.
///
/// Duplicate logical table names are not checked here. That's left to
/// validation so that every offending name can be reported at once.
pub fn convert_segments(
    segments: &[TableRuleSegment],
    defaults: &RulesConfig,
) -> Result<ShardingRuleConfiguration> {
    let mut config = ShardingRuleConfiguration::default();
    let mut owners: HashMap<String, &str> = HashMap::new();

    for segment in segments {
        if segment.logic_table.is_empty() {
            return Err(invalid_rule!("missing logical table name"));
        }
        if segment.resources.is_empty() {
            return Err(invalid_rule!(
                "no resources provided for '{}'",
                segment.logic_table
            ));
        }
        if segment.sharding_column.is_empty() {
            return Err(invalid_rule!(
                "no sharding column provided for '{}'",
                segment.logic_table
            ));
        }

        let algorithm_type = segment
            .algorithm_type
            .clone()
            .unwrap_or_else(|| defaults.default_algorithm.clone())
            .to_ascii_uppercase();

        let shard_count = match segment.properties.get(SHARDING_COUNT_PROP) {
            Some(count) => count.parse::<usize>().map_err(|_| {
                invalid_rule!(
                    "invalid {SHARDING_COUNT_PROP} '{count}' for '{}'",
                    segment.logic_table
                )
            })?,
            None => defaults.default_shard_count,
        };
        if shard_count == 0 {
            return Err(invalid_rule!(
                "{SHARDING_COUNT_PROP} must be greater than zero for '{}'",
                segment.logic_table
            ));
        }

        let algorithm_name = algorithm_name(&segment.logic_table, &algorithm_type);
        let mut props = segment.properties.clone();
        props.insert(SHARDING_COUNT_PROP.to_string(), shard_count.to_string());

        let algorithm = AlgorithmConfig {
            algorithm_type,
            props,
        };
        match owners.get(algorithm_name.as_str()) {
            // Same table named twice, reported during validation.
            Some(owner) if *owner == segment.logic_table => (),
            Some(_) => {
                return Err(RuleStoreError::AlgorithmConflict {
                    name: algorithm_name,
                })
            }
            None => {
                owners.insert(algorithm_name.clone(), &segment.logic_table);
                config.algorithms.insert(algorithm_name.clone(), algorithm);
            }
        }

        config.tables.push(ShardingTableRule {
            logic_table: segment.logic_table.clone(),
            strategy: ShardStrategy::Auto {
                sharding_column: segment.sharding_column.clone(),
                algorithm: algorithm_name,
                resources: segment.resources.clone(),
            },
            data_nodes: auto_data_nodes(&segment.logic_table, &segment.resources, shard_count),
        });
    }

    Ok(config)
}

/// Name generated for an auto table's algorithm.
pub fn algorithm_name(logic_table: &str, algorithm_type: &str) -> String {
    format!("{logic_table}_{algorithm_type}").to_ascii_lowercase()
}

/// Expand an auto table into `shard_count` physical tables spread over
/// `resources` round-robin, in shard index order.
pub fn auto_data_nodes(logic_table: &str, resources: &[String], shard_count: usize) -> Vec<DataNode> {
    (0..shard_count)
        .map(|idx| {
            let ds = &resources[idx % resources.len()];
            DataNode::new(ds.clone(), format!("{logic_table}_{idx}"))
        })
        .collect()
}
