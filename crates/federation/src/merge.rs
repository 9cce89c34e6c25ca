//! Merging joined rows into the statement's result.
use std::cmp::Ordering;

use coretypes::row::Row;

use crate::aggregate::{aggregate, AggregatePlan};
use crate::errors::Result;
use crate::join::RowIter;

/// Sort on a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub index: usize,
    pub descending: bool,
}

/// How the final rows are produced from joined rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPlan {
    /// Pick columns of the joined row. Sort keys index the joined row so
    /// that rows can be ordered on columns that aren't projected.
    Project {
        columns: Vec<usize>,
        order_by: Vec<SortKey>,
    },
    /// Aggregate joined rows. Sort keys index the aggregated output row.
    Aggregate {
        plan: AggregatePlan,
        order_by: Vec<SortKey>,
    },
}

/// The merged result of a federated statement.
///
/// Rows are produced lazily. Once consumed, the result can't be restarted.
pub struct MergedRows {
    column_names: Vec<String>,
    rows: RowIter,
}

impl MergedRows {
    pub fn new(column_names: Vec<String>, rows: RowIter) -> Self {
        MergedRows { column_names, rows }
    }

    /// Output column names in projection order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }
}

impl Iterator for MergedRows {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl std::fmt::Debug for MergedRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedRows")
            .field("column_names", &self.column_names)
            .finish_non_exhaustive()
    }
}

/// Stable sort on the given keys. Nulls sort first in ascending order.
pub fn sort_rows(rows: &mut [Row], keys: &[SortKey]) {
    rows.sort_by(|a, b| {
        for key in keys {
            let ord = a[key.index].total_cmp(&b[key.index]);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Produce the final result from joined rows.
///
/// Without ordering or aggregation rows stream straight through.
pub fn merge(column_names: Vec<String>, output: &OutputPlan, joined: RowIter) -> Result<MergedRows> {
    let rows: RowIter = match output {
        OutputPlan::Project { columns, order_by } if order_by.is_empty() => {
            let columns = columns.clone();
            Box::new(joined.map(move |row| row.project(&columns)))
        }
        OutputPlan::Project { columns, order_by } => {
            let mut rows: Vec<_> = joined.collect();
            sort_rows(&mut rows, order_by);
            let columns = columns.clone();
            Box::new(rows.into_iter().map(move |row| row.project(&columns)))
        }
        OutputPlan::Aggregate { plan, order_by } => {
            let mut rows = aggregate(plan, joined)?;
            sort_rows(&mut rows, order_by);
            Box::new(rows.into_iter())
        }
    };

    Ok(MergedRows::new(column_names, rows))
}
