//! Resolution of logical tables to route targets.
use std::sync::Arc;

use coretypes::scalar::ScalarValue;
use rulestore::store::RuleStore;
use rulestore::types::{RuleConfigurationSet, ShardingTableRule};
use schemameta::builder::TableKind;
use schemameta::registry::LogicSchemaRegistry;
use tracing::debug;

use crate::errors::{Result, RouteResolutionError};
use crate::strategy::ShardStrategyEvaluator;
use crate::target::{RouteTarget, ShardNode};

/// A logical table reference along with the equality filters on it that
/// are known before execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteRequest {
    pub table: String,
    /// `(column, value)` pairs. Filters on a sharding column prune shards.
    pub filters: Vec<(String, ScalarValue)>,
}

impl RouteRequest {
    pub fn new(table: impl Into<String>) -> Self {
        RouteRequest {
            table: table.into(),
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }
}

/// Targets for every table of a statement, all resolved against the same
/// rules snapshot.
#[derive(Debug, Clone)]
pub struct RoutedTables {
    pub rules: Arc<RuleConfigurationSet>,
    pub targets: Vec<RouteTarget>,
}

pub struct Router {
    store: Arc<RuleStore>,
    registry: Arc<LogicSchemaRegistry>,
    evaluator: Arc<dyn ShardStrategyEvaluator>,
}

impl Router {
    pub fn new(
        store: Arc<RuleStore>,
        registry: Arc<LogicSchemaRegistry>,
        evaluator: Arc<dyn ShardStrategyEvaluator>,
    ) -> Self {
        Router {
            store,
            registry,
            evaluator,
        }
    }

    /// Route every table to all of its physical targets, one route target per
    /// table in the same order.
    pub fn route(&self, schema: &str, tables: &[&str]) -> Result<Vec<RouteTarget>> {
        let requests: Vec<_> = tables.iter().map(|t| RouteRequest::new(*t)).collect();
        Ok(self.route_requests(schema, &requests)?.targets)
    }

    /// Route every request, pruning shards using the request's filters.
    ///
    /// Fails before anything is returned if any table can't be resolved.
    pub fn route_requests(&self, schema: &str, requests: &[RouteRequest]) -> Result<RoutedTables> {
        let rules = self
            .store
            .get_rules(schema)
            .map_err(|_| RouteResolutionError::MissingSchema(schema.to_string()))?;
        let metadata = self.registry.get(schema);

        let targets = requests
            .iter()
            .map(|req| match rules.sharding_rule(&req.table) {
                Some(rule) => self.route_sharded(&rules, rule, &req.filters),
                None => {
                    let table = metadata.as_ref().and_then(|m| m.table(&req.table));
                    match table.map(|t| &t.kind) {
                        Some(TableKind::Plain { data_node }) => Ok(RouteTarget::Single {
                            logic_table: req.table.clone(),
                            data_node: data_node.clone(),
                        }),
                        _ => Err(RouteResolutionError::UnknownTable {
                            schema: schema.to_string(),
                            table: req.table.clone(),
                        }),
                    }
                }
            })
            .collect::<Result<Vec<_>>>()?;

        for target in &targets {
            debug!(%schema, version = rules.version, %target, "routed table");
        }

        Ok(RoutedTables { rules, targets })
    }

    fn route_sharded(
        &self,
        rules: &RuleConfigurationSet,
        rule: &ShardingTableRule,
        filters: &[(String, ScalarValue)],
    ) -> Result<RouteTarget> {
        let all = || {
            rule.data_nodes
                .iter()
                .enumerate()
                .map(|(shard_index, node)| ShardNode {
                    shard_index,
                    data_node: node.clone(),
                })
                .collect::<Vec<_>>()
        };

        // Only single column strategies can be pruned from per-column filters.
        let values: Vec<_> = match rule.strategy.sharding_columns() {
            [column] => filters
                .iter()
                .filter(|(col, _)| col.eq_ignore_ascii_case(column))
                .map(|(_, v)| v.clone())
                .collect(),
            _ => Vec::new(),
        };

        let nodes = if values.is_empty() {
            all()
        } else {
            let algorithm_name = rule.strategy.algorithm();
            let algorithm = rules.algorithm(algorithm_name).ok_or_else(|| {
                RouteResolutionError::MissingAlgorithm {
                    table: rule.logic_table.clone(),
                    algorithm: algorithm_name.to_string(),
                }
            })?;
            let count = rule.shard_count();
            self.evaluator
                .shard_indexes(algorithm, count, &values)?
                .into_iter()
                .map(|idx| match rule.data_nodes.get(idx) {
                    Some(node) => Ok(ShardNode {
                        shard_index: idx,
                        data_node: node.clone(),
                    }),
                    None => Err(RouteResolutionError::ShardOutOfRange {
                        table: rule.logic_table.clone(),
                        index: idx,
                        count,
                    }),
                })
                .collect::<Result<Vec<_>>>()?
        };

        Ok(RouteTarget::Sharded {
            logic_table: rule.logic_table.clone(),
            nodes,
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}
