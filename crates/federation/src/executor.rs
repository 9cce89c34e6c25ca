//! Fan-out execution of federation plans.
use std::collections::HashMap;
use std::sync::Arc;

use coretypes::row::Row;
use coretypes::BoxError;
use futures::TryStreamExt;
use router::classify::RouteDecision;
use router::errors::RouteResolutionError;
use router::route::Router;
use schemameta::registry::LogicSchemaRegistry;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::errors::{internal, FederationError, FederationExecutionError, Result};
use crate::join::{left_deep_join, HashJoin, RowIter};
use crate::merge::{merge, MergedRows};
use crate::physical::{PhysicalExecutor, PhysicalQuery};
use crate::plan::{plan_statement, FederationPlan};
use crate::statement::SelectStatement;

/// Rows returned by one sub-query.
#[derive(Debug)]
struct TargetRows {
    binding: usize,
    shard_index: usize,
    rows: Vec<Row>,
}

pub struct FederationExecutor {
    router: Arc<Router>,
    registry: Arc<LogicSchemaRegistry>,
    physical: Arc<dyn PhysicalExecutor>,
    /// Max number of sub-queries in flight for a single statement.
    max_concurrency: usize,
}

impl FederationExecutor {
    pub fn new(
        router: Arc<Router>,
        registry: Arc<LogicSchemaRegistry>,
        physical: Arc<dyn PhysicalExecutor>,
        max_concurrency: usize,
    ) -> Self {
        FederationExecutor {
            router,
            registry,
            physical,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Plan a statement against the schema's current metadata and rules.
    pub fn plan(&self, schema: &str, stmt: &SelectStatement) -> Result<FederationPlan> {
        let metadata = self
            .registry
            .get(schema)
            .ok_or_else(|| RouteResolutionError::MissingSchema(schema.to_string()))?;
        plan_statement(&self.router, &metadata, stmt)
    }

    /// Plan and execute a statement.
    pub async fn federate_execute(
        &self,
        schema: &str,
        stmt: &SelectStatement,
        cancel: &CancellationToken,
    ) -> Result<MergedRows> {
        let plan = self.plan(schema, stmt)?;
        self.execute_plan(&plan, cancel).await
    }

    /// Execute every sub-query of the plan, then join and merge the results.
    ///
    /// Either every sub-query succeeds and the merged rows are returned, or
    /// an error is returned and no rows are. The first failing sub-query
    /// cancels the rest.
    pub async fn execute_plan(
        &self,
        plan: &FederationPlan,
        cancel: &CancellationToken,
    ) -> Result<MergedRows> {
        let mut queries = Vec::with_capacity(plan.sub_query_count());
        for (binding_idx, binding) in plan.bindings.iter().enumerate() {
            for query in binding.sub_queries(&plan.schema) {
                queries.push((binding_idx, binding.columns.len(), query));
            }
        }

        let results = self.fan_out(queries, cancel).await?;

        let mut per_binding: Vec<Vec<(usize, Vec<Row>)>> = vec![Vec::new(); plan.bindings.len()];
        for result in results {
            per_binding[result.binding].push((result.shard_index, result.rows));
        }

        let joined = match plan.decision {
            RouteDecision::AlignedPushdown => aligned_join(per_binding, plan)?,
            RouteDecision::Single | RouteDecision::Federate => {
                let inputs = per_binding
                    .into_iter()
                    .map(|shards| shards.into_iter().flat_map(|(_, rows)| rows).collect())
                    .collect();
                left_deep_join(inputs, &plan.join_steps)
            }
        };

        merge(plan.column_names.clone(), &plan.output, joined)
    }

    /// Run every query concurrently, returning results in query order.
    async fn fan_out(
        &self,
        queries: Vec<(usize, usize, PhysicalQuery)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TargetRows>> {
        if cancel.is_cancelled() {
            return Err(FederationError::Cancelled);
        }

        let count = queries.len();
        info!(sub_queries = count, max_concurrency = self.max_concurrency, "starting fan-out");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for (idx, (binding, width, query)) in queries.into_iter().enumerate() {
            let physical = self.physical.clone();
            let semaphore = semaphore.clone();
            let span = debug_span!("sub_query", data_node = %query.data_node);
            tasks.spawn(
                async move {
                    let target = query.data_node.clone();
                    let shard_index = query.shard_index;
                    let rows = run_query(physical.as_ref(), &semaphore, query, width).await;
                    match rows {
                        Ok(rows) => Ok((
                            idx,
                            TargetRows {
                                binding,
                                shard_index,
                                rows,
                            },
                        )),
                        Err(source) => Err(FederationExecutionError { target, source }),
                    }
                }
                .instrument(span),
            );
        }

        let mut results: Vec<Option<TargetRows>> = (0..count).map(|_| None).collect();
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    warn!("fan-out cancelled");
                    return Err(FederationError::Cancelled);
                }
                next = tasks.join_next() => match next {
                    Some(Ok(Ok((idx, rows)))) => {
                        debug!(idx, rows = rows.rows.len(), "sub-query finished");
                        results[idx] = Some(rows);
                    }
                    Some(Ok(Err(e))) => {
                        tasks.abort_all();
                        warn!(data_node = %e.target, error = %e.source, "sub-query failed, aborting fan-out");
                        return Err(e.into());
                    }
                    Some(Err(e)) => {
                        tasks.abort_all();
                        return Err(internal!("sub-query task failed: {e}"));
                    }
                    None => break,
                }
            }
        }

        info!(sub_queries = count, "finished fan-out");
        results
            .into_iter()
            .map(|r| r.ok_or_else(|| internal!("missing sub-query result")))
            .collect()
    }
}

async fn run_query(
    physical: &dyn PhysicalExecutor,
    semaphore: &Semaphore,
    query: PhysicalQuery,
    width: usize,
) -> Result<Vec<Row>, BoxError> {
    let _permit = semaphore.acquire().await?;
    let rows: Vec<Row> = physical.execute(query).await?.try_collect().await?;
    if let Some(row) = rows.iter().find(|row| row.len() != width) {
        return Err(format!("expected {width} columns, got {}", row.len()).into());
    }
    Ok(rows)
}

/// Join shard `i` of the first table only with shard `i` of the second.
fn aligned_join(per_binding: Vec<Vec<(usize, Vec<Row>)>>, plan: &FederationPlan) -> Result<RowIter> {
    let mut inputs = per_binding.into_iter();
    let (Some(left), Some(right), None) = (inputs.next(), inputs.next(), inputs.next()) else {
        return Err(internal!("aligned join requires exactly two tables"));
    };
    let step = plan
        .join_steps
        .first()
        .cloned()
        .ok_or_else(|| internal!("aligned join missing join step"))?;

    let mut right: HashMap<usize, Vec<Row>> = right.into_iter().collect();
    let pairs: Vec<RowIter> = left
        .into_iter()
        .filter_map(|(shard_index, rows)| {
            // Shards pruned from one side can't produce matches.
            let inner = right.remove(&shard_index)?;
            let join: RowIter = Box::new(HashJoin::new(Box::new(rows.into_iter()), inner, &step));
            Some(join)
        })
        .collect();

    debug!(pairs = pairs.len(), "joining aligned shard pairs");
    Ok(Box::new(pairs.into_iter().flatten()))
}

impl std::fmt::Debug for FederationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationExecutor")
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}
