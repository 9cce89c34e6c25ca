//! In-process equality joins.
//!
//! Joins are left deep. Each step builds a hash table over the rows of the
//! newly joined table and probes it with rows from the previous step, so
//! output follows outer row order, then inner match order.
use std::collections::VecDeque;

use coretypes::row::Row;
use coretypes::scalar::JoinKey;
use hashbrown::HashMap;

/// Rows produced on demand.
pub type RowIter = Box<dyn Iterator<Item = Row> + Send>;

/// Key columns for one join step: `(outer, inner)` column pairs, where
/// `outer` indexes the joined row so far and `inner` indexes rows of the
/// table being joined.
///
/// A step without keys is a cross join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinStep {
    pub keys: Vec<(usize, usize)>,
}

fn row_key(row: &Row, cols: impl Iterator<Item = usize>) -> Option<Vec<JoinKey>> {
    cols.map(|idx| row.get(idx).and_then(|v| v.join_key()))
        .collect()
}

/// Hash join producing rows lazily as the outer side is consumed.
pub struct HashJoin {
    outer: RowIter,
    outer_cols: Vec<usize>,
    inner: Vec<Row>,
    table: HashMap<Vec<JoinKey>, Vec<usize>, ahash::RandomState>,
    pending: VecDeque<Row>,
}

impl HashJoin {
    pub fn new(outer: RowIter, inner: Vec<Row>, step: &JoinStep) -> Self {
        let inner_cols: Vec<_> = step.keys.iter().map(|(_, i)| *i).collect();
        let mut table: HashMap<Vec<JoinKey>, Vec<usize>, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        for (idx, row) in inner.iter().enumerate() {
            // Rows with null keys never match.
            if let Some(key) = row_key(row, inner_cols.iter().copied()) {
                table.entry(key).or_default().push(idx);
            }
        }

        HashJoin {
            outer,
            outer_cols: step.keys.iter().map(|(o, _)| *o).collect(),
            inner,
            table,
            pending: VecDeque::new(),
        }
    }
}

impl Iterator for HashJoin {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Some(row);
            }

            let outer = self.outer.next()?;
            let Some(key) = row_key(&outer, self.outer_cols.iter().copied()) else {
                continue;
            };
            if let Some(matches) = self.table.get(&key) {
                self.pending
                    .extend(matches.iter().map(|idx| outer.concat(&self.inner[*idx])));
            }
        }
    }
}

impl std::fmt::Debug for HashJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashJoin")
            .field("outer_cols", &self.outer_cols)
            .field("inner_rows", &self.inner.len())
            .finish_non_exhaustive()
    }
}

/// Join every input left to right.
///
/// `steps[i]` joins `inputs[i + 1]` onto the rows joined so far.
pub fn left_deep_join(inputs: Vec<Vec<Row>>, steps: &[JoinStep]) -> RowIter {
    let mut inputs = inputs.into_iter();
    let Some(first) = inputs.next() else {
        return Box::new(std::iter::empty());
    };

    let mut joined: RowIter = Box::new(first.into_iter());
    for (inner, step) in inputs.zip(steps) {
        joined = Box::new(HashJoin::new(joined, inner, step));
    }
    joined
}
