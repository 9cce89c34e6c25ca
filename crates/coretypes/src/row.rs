use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::scalar::ScalarValue;

/// A single row of values, ordered by column position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row(Vec<ScalarValue>);

impl Row {
    pub fn new(values: Vec<ScalarValue>) -> Self {
        Row(values)
    }

    pub fn empty() -> Self {
        Row(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ScalarValue> {
        self.0.get(idx)
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.0
    }

    pub fn into_values(self) -> Vec<ScalarValue> {
        self.0
    }

    /// Create a new row containing the values of `self` followed by the
    /// values of `other`.
    pub fn concat(&self, other: &Row) -> Row {
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend_from_slice(&self.0);
        values.extend_from_slice(&other.0);
        Row(values)
    }

    /// Create a new row from the values at `indices`.
    ///
    /// Panics if any index is out of bounds.
    pub fn project(&self, indices: &[usize]) -> Row {
        Row(indices.iter().map(|idx| self.0[*idx].clone()).collect())
    }
}

impl Index<usize> for Row {
    type Output = ScalarValue;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<Vec<ScalarValue>> for Row {
    fn from(values: Vec<ScalarValue>) -> Self {
        Row(values)
    }
}

impl FromIterator<ScalarValue> for Row {
    fn from_iter<T: IntoIterator<Item = ScalarValue>>(iter: T) -> Self {
        Row(iter.into_iter().collect())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, val) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, "|")?;
            }
            write!(f, "{val}")?;
        }
        Ok(())
    }
}

/// Build a row from a list of values convertible to scalars.
///
/// ```text
/// row![1000, 10, "init"]
/// ```
#[macro_export]
macro_rules! row {
    ($($val:expr),* $(,)?) => {
        $crate::row::Row::new(vec![$($crate::scalar::ScalarValue::from($val)),*])
    };
}
