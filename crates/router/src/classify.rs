//! Deciding how a routed statement can be executed.
use rulestore::types::{RuleConfigurationSet, ShardingTableRule};
use serde::Serialize;

use crate::target::RouteTarget;

/// Equality join between columns of two routed tables, identified by their
/// position in the route target list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumns {
    pub left: usize,
    pub left_column: String,
    pub right: usize,
    pub right_column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouteDecision {
    /// Exactly one physical target.
    Single,
    /// Two sharded tables joined on their sharding columns, sharded the same
    /// way. Shard `i` of one side only needs to be joined with shard `i` of
    /// the other.
    AlignedPushdown,
    /// Rows from every target need to be joined or merged in process.
    Federate,
}

/// Classify a routed statement.
pub fn classify(
    rules: &RuleConfigurationSet,
    targets: &[RouteTarget],
    joins: &[JoinColumns],
) -> RouteDecision {
    match targets {
        [target] if target.target_count() == 1 => RouteDecision::Single,
        [left, right] if left.is_sharded() && right.is_sharded() => {
            let (Some(left_rule), Some(right_rule)) = (
                rules.sharding_rule(left.logic_table()),
                rules.sharding_rule(right.logic_table()),
            ) else {
                return RouteDecision::Federate;
            };

            let aligned_join = joins.iter().any(|join| {
                let (l, r) = match (join.left, join.right) {
                    (0, 1) => (&join.left_column, &join.right_column),
                    (1, 0) => (&join.right_column, &join.left_column),
                    _ => return false,
                };
                left_rule.is_sharding_column(l) && right_rule.is_sharding_column(r)
            });

            if aligned_join && same_sharding(rules, left_rule, right_rule) {
                RouteDecision::AlignedPushdown
            } else {
                RouteDecision::Federate
            }
        }
        _ => RouteDecision::Federate,
    }
}

/// Check if equal sharding values always land on the same shard index for
/// both tables.
fn same_sharding(
    rules: &RuleConfigurationSet,
    left: &ShardingTableRule,
    right: &ShardingTableRule,
) -> bool {
    if left.shard_count() != right.shard_count()
        || left.strategy.sharding_columns().len() != 1
        || right.strategy.sharding_columns().len() != 1
    {
        return false;
    }
    match (
        rules.algorithm(left.strategy.algorithm()),
        rules.algorithm(right.strategy.algorithm()),
    ) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}
