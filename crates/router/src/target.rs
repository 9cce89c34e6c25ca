use std::fmt;

use rulestore::types::DataNode;
use serde::Serialize;

/// One shard of a sharded table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardNode {
    pub shard_index: usize,
    pub data_node: DataNode,
}

/// Physical targets for one logical table reference in a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RouteTarget {
    /// A plain table backed by one physical table of the same name.
    Single {
        logic_table: String,
        data_node: DataNode,
    },
    /// A sharded table. Nodes are ordered by shard index.
    Sharded {
        logic_table: String,
        nodes: Vec<ShardNode>,
    },
}

impl RouteTarget {
    pub fn logic_table(&self) -> &str {
        match self {
            Self::Single { logic_table, .. } | Self::Sharded { logic_table, .. } => logic_table,
        }
    }

    pub const fn is_sharded(&self) -> bool {
        matches!(self, Self::Sharded { .. })
    }

    /// Number of physical tables that need to be queried.
    pub fn target_count(&self) -> usize {
        match self {
            Self::Single { .. } => 1,
            Self::Sharded { nodes, .. } => nodes.len(),
        }
    }

    /// Every physical target with its shard index. Plain tables report a
    /// single target at index 0.
    pub fn nodes(&self) -> Vec<ShardNode> {
        match self {
            Self::Single { data_node, .. } => vec![ShardNode {
                shard_index: 0,
                data_node: data_node.clone(),
            }],
            Self::Sharded { nodes, .. } => nodes.clone(),
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single {
                logic_table,
                data_node,
            } => write!(f, "{logic_table} -> {data_node}"),
            Self::Sharded { logic_table, nodes } => {
                write!(f, "{logic_table} -> ")?;
                for (idx, node) in nodes.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}] {}", node.shard_index, node.data_node)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let single = RouteTarget::Single {
            logic_table: "t_order".to_string(),
            data_node: DataNode::new("ds_0", "t_order"),
        };
        assert_eq!("t_order -> ds_0.t_order", single.to_string());
        assert_eq!(1, single.target_count());

        let sharded = RouteTarget::Sharded {
            logic_table: "t_item".to_string(),
            nodes: vec![
                ShardNode {
                    shard_index: 0,
                    data_node: DataNode::new("ds_0", "t_item_0"),
                },
                ShardNode {
                    shard_index: 1,
                    data_node: DataNode::new("ds_1", "t_item_1"),
                },
            ],
        };
        assert_eq!(
            "t_item -> [0] ds_0.t_item_0, [1] ds_1.t_item_1",
            sharded.to_string()
        );
        assert_eq!(2, sharded.target_count());
    }
}
