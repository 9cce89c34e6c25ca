//! Totally ordered floats.
//!
//! `NotNanF64` disallows constructing NaN floats so that values can be
//! ordered, hashed and used as join keys.
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NotNanF64(f64);

impl NotNanF64 {
    pub fn new(f: f64) -> Option<NotNanF64> {
        if f.is_nan() {
            return None;
        }
        // Normalize negative zero so that hashing agrees with equality.
        if f == 0.0 {
            return Some(NotNanF64(0.0));
        }
        Some(NotNanF64(f))
    }
}

impl Deref for NotNanF64 {
    type Target = f64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for NotNanF64 {
    type Error = f64;
    fn try_from(val: f64) -> Result<Self, f64> {
        Self::new(val).ok_or(val)
    }
}

impl From<NotNanF64> for f64 {
    fn from(val: NotNanF64) -> Self {
        val.0
    }
}

impl Eq for NotNanF64 {}

impl Ord for NotNanF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        // Never NaN, so partial_cmp always returns Some.
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for NotNanF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for NotNanF64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state)
    }
}

impl fmt::Display for NotNanF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nan() {
        assert!(NotNanF64::new(f64::NAN).is_none());
        assert!(NotNanF64::try_from(1.5).is_ok());
    }

    #[test]
    fn negative_zero_equals_zero() {
        let a = NotNanF64::new(-0.0).unwrap();
        let b = NotNanF64::new(0.0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0.to_bits(), b.0.to_bits());
    }
}
