//! In-memory physical targets.
//!
//! Useful for testing federation without real backends. Individual targets
//! can be made to fail or respond slowly.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use coretypes::row::Row;
use coretypes::stream::{MemoryRowStream, RowStream};
use coretypes::BoxError;
use parking_lot::{Mutex, RwLock};
use rulestore::types::DataNode;
use tracing::debug;

use crate::physical::{PhysicalExecutor, PhysicalQuery};

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Debug, Clone)]
enum Behavior {
    Fail(String),
    Delay(Duration),
}

/// Physical executor over tables held in memory.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<HashMap<DataNode, MemoryTable>>,
    behaviors: RwLock<HashMap<DataNode, Behavior>>,
    executed: Mutex<Vec<PhysicalQuery>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&self, node: DataNode, columns: &[&str], rows: Vec<Row>) {
        let table = MemoryTable {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            rows,
        };
        self.tables.write().insert(node, table);
    }

    /// Make every query against `node` fail.
    pub fn fail_target(&self, node: DataNode, message: impl Into<String>) {
        self.behaviors
            .write()
            .insert(node, Behavior::Fail(message.into()));
    }

    /// Make every query against `node` wait before returning.
    pub fn delay_target(&self, node: DataNode, delay: Duration) {
        self.behaviors.write().insert(node, Behavior::Delay(delay));
    }

    pub fn clear_behaviors(&self) {
        self.behaviors.write().clear();
    }

    /// Every query that was executed, in the order execution began.
    pub fn executed_queries(&self) -> Vec<PhysicalQuery> {
        self.executed.lock().clone()
    }

    /// Max number of queries that were executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn scan(&self, query: &PhysicalQuery) -> Result<Vec<Row>, BoxError> {
        let tables = self.tables.read();
        let table = tables
            .get(&query.data_node)
            .ok_or_else(|| format!("table '{}' does not exist", query.data_node))?;
        if let Some(row) = table.rows.iter().find(|r| r.len() != table.columns.len()) {
            return Err(format!(
                "table '{}' has {} columns, found a row with {} values",
                query.data_node,
                table.columns.len(),
                row.len()
            )
            .into());
        }

        let index_of = |name: &str| -> Result<usize, BoxError> {
            table
                .columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
                .ok_or_else(|| format!("column '{name}' does not exist").into())
        };
        let projection = query
            .columns
            .iter()
            .map(|c| index_of(c))
            .collect::<Result<Vec<_>, _>>()?;
        let filters = query
            .filters
            .iter()
            .map(|(c, v)| Ok((index_of(c)?, v)))
            .collect::<Result<Vec<_>, BoxError>>()?;

        Ok(table
            .rows
            .iter()
            .filter(|row| filters.iter().all(|(idx, v)| row[*idx].sql_eq(v)))
            .map(|row| row.project(&projection))
            .collect())
    }
}

/// Decrements the in-flight count when dropped, including on abort.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PhysicalExecutor for MemoryExecutor {
    async fn execute(&self, query: PhysicalQuery) -> Result<RowStream, BoxError> {
        debug!(%query, data_node = %query.data_node, "executing in-memory query");
        self.executed.lock().push(query.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let behavior = self.behaviors.read().get(&query.data_node).cloned();
        match behavior {
            Some(Behavior::Fail(msg)) => return Err(msg.into()),
            Some(Behavior::Delay(delay)) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let rows = self.scan(&query)?;
        Ok(MemoryRowStream::new(rows).boxed())
    }
}

#[cfg(test)]
mod tests {
    use coretypes::row;
    use futures::TryStreamExt;

    use super::*;

    fn query(filters: Vec<(String, coretypes::scalar::ScalarValue)>) -> PhysicalQuery {
        PhysicalQuery {
            schema: "test".to_string(),
            logic_table: "t_order".to_string(),
            data_node: DataNode::new("ds_0", "t_order"),
            shard_index: 0,
            columns: vec!["status".to_string(), "order_id".to_string()],
            filters,
        }
    }

    fn executor() -> MemoryExecutor {
        let exec = MemoryExecutor::new();
        exec.insert_table(
            DataNode::new("ds_0", "t_order"),
            &["order_id", "status"],
            vec![row![1000, 10], row![1001, 11]],
        );
        exec
    }

    #[tokio::test]
    async fn project_and_filter() {
        let exec = executor();
        let rows: Vec<Row> = exec
            .execute(query(vec![("order_id".to_string(), 1001.into())]))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(vec![row![11, 1001]], rows);
        assert_eq!(1, exec.executed_queries().len());
    }

    #[tokio::test]
    async fn injected_failure() {
        let exec = executor();
        exec.fail_target(DataNode::new("ds_0", "t_order"), "connection reset");
        let err = exec.execute(query(Vec::new())).await.err().unwrap();
        assert_eq!("connection reset", err.to_string());

        exec.clear_behaviors();
        exec.execute(query(Vec::new())).await.unwrap();
        assert_eq!(0, exec.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn short_row_is_an_error() {
        let exec = MemoryExecutor::new();
        exec.insert_table(
            DataNode::new("ds_0", "t_order"),
            &["order_id", "status"],
            vec![row![1000, 10], row![1001]],
        );
        let err = exec.execute(query(Vec::new())).await.err().unwrap();
        assert_eq!(
            "table 'ds_0.t_order' has 2 columns, found a row with 1 values",
            err.to_string()
        );
    }

    #[tokio::test]
    async fn missing_table() {
        let exec = MemoryExecutor::new();
        exec.execute(query(Vec::new())).await.err().unwrap();
    }
}
