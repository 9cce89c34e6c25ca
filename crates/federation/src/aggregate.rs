//! Global re-aggregation over merged rows.
//!
//! Sub-queries never aggregate, so aggregating over the merged rows of every
//! target is always correct regardless of how tables are sharded.
use coretypes::row::Row;
use coretypes::scalar::ScalarValue;
use indexmap::IndexMap;

use crate::errors::{FederationError, Result};
use crate::statement::AggregateFunction;

/// One output column of an aggregating statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateOutput {
    /// Value of the group by expression at this position.
    Group(usize),
    /// Aggregate over a column of the joined row, or over rows for
    /// `COUNT(*)`.
    Aggregate {
        func: AggregateFunction,
        input: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatePlan {
    /// Columns of the joined row to group by.
    pub group_by: Vec<usize>,
    pub outputs: Vec<AggregateOutput>,
}

#[derive(Debug, Clone)]
enum Accumulator {
    Count(i64),
    Sum(ScalarValue),
    Min(ScalarValue),
    Max(ScalarValue),
}

impl Accumulator {
    fn new(func: AggregateFunction) -> Self {
        match func {
            AggregateFunction::CountStar | AggregateFunction::Count => Accumulator::Count(0),
            AggregateFunction::Sum => Accumulator::Sum(ScalarValue::Null),
            AggregateFunction::Min => Accumulator::Min(ScalarValue::Null),
            AggregateFunction::Max => Accumulator::Max(ScalarValue::Null),
        }
    }

    /// Update with a value. `None` means `COUNT(*)`, which counts every row.
    fn update(&mut self, value: Option<&ScalarValue>) -> Result<()> {
        let value = match value {
            Some(v) if v.is_null() => return Ok(()),
            Some(v) => v,
            None => {
                if let Accumulator::Count(n) = self {
                    *n += 1;
                }
                return Ok(());
            }
        };

        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(acc) => *acc = add(acc, value)?,
            Accumulator::Min(acc) => {
                if acc.is_null() || value.total_cmp(acc).is_lt() {
                    *acc = value.clone();
                }
            }
            Accumulator::Max(acc) => {
                if acc.is_null() || value.total_cmp(acc).is_gt() {
                    *acc = value.clone();
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> ScalarValue {
        match self {
            Accumulator::Count(n) => ScalarValue::Int64(n),
            Accumulator::Sum(v) | Accumulator::Min(v) | Accumulator::Max(v) => v,
        }
    }
}

fn add(acc: &ScalarValue, value: &ScalarValue) -> Result<ScalarValue> {
    if acc.is_null() {
        return match value {
            ScalarValue::Int32(v) => Ok(ScalarValue::Int64(*v as i64)),
            ScalarValue::Int64(_) | ScalarValue::Float64(_) => Ok(value.clone()),
            other => Err(FederationError::Aggregate(format!(
                "cannot sum non-numeric value '{other}'"
            ))),
        };
    }

    match (acc.as_i64(), value.as_i64()) {
        (Some(a), Some(b)) => a
            .checked_add(b)
            .map(ScalarValue::Int64)
            .ok_or_else(|| FederationError::Aggregate("integer overflow in sum".to_string())),
        _ => match (acc.as_f64(), value.as_f64()) {
            (Some(a), Some(b)) => Ok(ScalarValue::from(a + b)),
            _ => Err(FederationError::Aggregate(format!(
                "cannot sum non-numeric value '{value}'"
            ))),
        },
    }
}

/// Aggregate rows. Groups are output in the order they're first seen.
///
/// Without a GROUP BY, exactly one row is produced even if there are no
/// input rows.
pub fn aggregate(plan: &AggregatePlan, rows: impl Iterator<Item = Row>) -> Result<Vec<Row>> {
    let new_accumulators = || {
        plan.outputs
            .iter()
            .filter_map(|out| match out {
                AggregateOutput::Aggregate { func, .. } => Some(Accumulator::new(*func)),
                AggregateOutput::Group(_) => None,
            })
            .collect::<Vec<_>>()
    };
    let inputs: Vec<Option<usize>> = plan
        .outputs
        .iter()
        .filter_map(|out| match out {
            AggregateOutput::Aggregate { input, .. } => Some(*input),
            AggregateOutput::Group(_) => None,
        })
        .collect();

    let mut groups: IndexMap<Vec<ScalarValue>, Vec<Accumulator>> = IndexMap::new();
    if plan.group_by.is_empty() {
        groups.insert(Vec::new(), new_accumulators());
    }

    for row in rows {
        let key: Vec<_> = plan.group_by.iter().map(|idx| row[*idx].clone()).collect();
        let accumulators = groups.entry(key).or_insert_with(new_accumulators);
        for (acc, input) in accumulators.iter_mut().zip(&inputs) {
            acc.update(input.map(|idx| &row[idx]))?;
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut finished = accumulators.into_iter().map(Accumulator::finish);
            plan.outputs
                .iter()
                .map(|out| match out {
                    AggregateOutput::Group(pos) => key[*pos].clone(),
                    AggregateOutput::Aggregate { .. } => {
                        finished.next().unwrap_or(ScalarValue::Null)
                    }
                })
                .collect::<Row>()
        })
        .collect())
}
