//! Rule configuration data model.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{invalid_rule, RuleStoreError};

/// A physical table on a single data source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        DataNode {
            data_source: data_source.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

impl FromStr for DataNode {
    type Err = RuleStoreError;

    /// Parse a data node in the form `<data_source>.<table>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(DataNode::new(ds, table))
            }
            _ => Err(invalid_rule!("invalid data node: '{s}'")),
        }
    }
}

/// A named sharding algorithm definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Algorithm type, e.g. `MOD` or `HASH_MOD`.
    pub algorithm_type: String,
    pub props: BTreeMap<String, String>,
}

impl AlgorithmConfig {
    pub fn new(algorithm_type: impl Into<String>) -> Self {
        AlgorithmConfig {
            algorithm_type: algorithm_type.into(),
            props: BTreeMap::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

/// How rows of a logical table map to its data nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardStrategy {
    /// Explicit algorithm reference over one or more sharding columns.
    Standard {
        sharding_columns: Vec<String>,
        algorithm: String,
    },
    /// Auto table. Data nodes and the algorithm were derived from the
    /// resources the table was created on.
    Auto {
        sharding_column: String,
        algorithm: String,
        resources: Vec<String>,
    },
}

impl ShardStrategy {
    pub fn algorithm(&self) -> &str {
        match self {
            ShardStrategy::Standard { algorithm, .. } => algorithm,
            ShardStrategy::Auto { algorithm, .. } => algorithm,
        }
    }

    pub fn sharding_columns(&self) -> &[String] {
        match self {
            ShardStrategy::Standard {
                sharding_columns, ..
            } => sharding_columns,
            ShardStrategy::Auto {
                sharding_column, ..
            } => std::slice::from_ref(sharding_column),
        }
    }

    pub const fn is_auto(&self) -> bool {
        matches!(self, ShardStrategy::Auto { .. })
    }
}

/// Sharding rule for a single logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingTableRule {
    pub logic_table: String,
    pub strategy: ShardStrategy,
    /// Physical targets, ordered by shard index.
    pub data_nodes: Vec<DataNode>,
}

impl ShardingTableRule {
    pub fn shard_count(&self) -> usize {
        self.data_nodes.len()
    }

    /// Check if `column` is one of this table's sharding columns.
    pub fn is_sharding_column(&self, column: &str) -> bool {
        self.strategy
            .sharding_columns()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// Sharding rules for a single schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingRuleConfiguration {
    /// Table rules in creation order.
    pub tables: Vec<ShardingTableRule>,
    pub algorithms: BTreeMap<String, AlgorithmConfig>,
}

impl ShardingRuleConfiguration {
    pub fn table_rule(&self, logic_table: &str) -> Option<&ShardingTableRule> {
        self.tables.iter().find(|t| t.logic_table == logic_table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.logic_table.as_str())
    }

    pub fn algorithm(&self, name: &str) -> Option<&AlgorithmConfig> {
        self.algorithms.get(name)
    }
}

/// The complete set of rules for one logical schema.
///
/// Any logical table without a sharding rule is a plain table.
///
/// Instances are immutable once published. Mutations always produce a new
/// snapshot with a higher version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfigurationSet {
    pub schema: String,
    /// Incremented on every successful mutation of the schema's rules.
    pub version: u64,
    /// Sharding configuration, `None` if no sharding rules were ever created.
    pub sharding: Option<ShardingRuleConfiguration>,
}

impl RuleConfigurationSet {
    /// Create the empty rule set a schema starts out with.
    pub fn empty(schema: impl Into<String>) -> Self {
        RuleConfigurationSet {
            schema: schema.into(),
            version: 0,
            sharding: None,
        }
    }

    pub fn sharding_rule(&self, logic_table: &str) -> Option<&ShardingTableRule> {
        self.sharding.as_ref()?.table_rule(logic_table)
    }

    pub fn is_sharded(&self, logic_table: &str) -> bool {
        self.sharding_rule(logic_table).is_some()
    }

    pub fn algorithm(&self, name: &str) -> Option<&AlgorithmConfig> {
        self.sharding.as_ref()?.algorithm(name)
    }

    /// Names of all tables covered by a sharding rule.
    pub fn sharded_tables(&self) -> impl Iterator<Item = &str> {
        self.sharding.iter().flat_map(|s| s.table_names())
    }

    pub fn table_rule_count(&self) -> usize {
        self.sharding.as_ref().map(|s| s.tables.len()).unwrap_or(0)
    }

    /// Compare rule content, ignoring the version.
    pub fn same_rules(&self, other: &RuleConfigurationSet) -> bool {
        self.schema == other.schema && self.sharding == other.sharding
    }
}
