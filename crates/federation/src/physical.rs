//! Interface to physical backends.
use std::fmt;

use async_trait::async_trait;
use coretypes::scalar::ScalarValue;
use coretypes::stream::RowStream;
use coretypes::BoxError;
use rulestore::types::DataNode;
use serde::Serialize;

/// A single table scan sent to one physical table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicalQuery {
    pub schema: String,
    pub logic_table: String,
    pub data_node: DataNode,
    pub shard_index: usize,
    /// Columns to return, in order.
    pub columns: Vec<String>,
    /// Equality filters every returned row must satisfy.
    pub filters: Vec<(String, ScalarValue)>,
}

impl fmt::Display for PhysicalQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {} FROM {}", self.columns.join(", "), self.data_node.table)?;
        for (idx, (col, val)) in self.filters.iter().enumerate() {
            let kw = if idx == 0 { "WHERE" } else { "AND" };
            match val {
                ScalarValue::Utf8(s) => write!(f, " {kw} {col} = '{s}'")?,
                other => write!(f, " {kw} {col} = {other}")?,
            }
        }
        Ok(())
    }
}

/// Executes sub-queries against physical targets.
///
/// Timeouts and connection management are the implementation's concern.
#[async_trait]
pub trait PhysicalExecutor: Send + Sync {
    async fn execute(&self, query: PhysicalQuery) -> Result<RowStream, BoxError>;
}
