//! Timestamped register cells

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A value paired with the timestamp (seconds since the Unix epoch) it was
/// written at.
///
/// Identity is the value alone: two elements carrying the same value under
/// different timestamps compare equal and hash the same. Ordering decisions
/// read [`Element::timestamp`] explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element<V> {
    value: V,
    timestamp: f64,
}

impl<V> Element<V> {
    pub fn new(value: V, timestamp: f64) -> Self {
        Self { value, timestamp }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn into_value(self) -> V {
        self.value
    }

    /// Whether this element strictly supersedes `other` in an LWW register.
    pub(crate) fn supersedes(&self, other: &Element<V>) -> bool {
        self.timestamp > other.timestamp
    }
}

impl<V: PartialEq> PartialEq for Element<V> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<V: Eq> Eq for Element<V> {}

impl<V: Hash> Hash for Element<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}
