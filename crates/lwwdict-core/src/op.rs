//! Register operations for op-based delivery
//!
//! A transport that ships individual writes instead of whole states carries
//! [`Operation`]s. Applying a replica's [`operations`](LwwDictionary::operations)
//! to another replica has the same effect as merging it.

use crate::dictionary::LwwDictionary;
use serde::{Deserialize, Serialize};

/// A single timestamped write to one of the two registers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Operation<V> {
    Add { key: String, value: V, timestamp: f64 },
    Remove { key: String, value: V, timestamp: f64 },
}

/// An operation a replica recorded locally
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded<V> {
    pub op: Operation<V>,
    /// Whether a register changed; false for a stale write
    pub changed: bool,
}

impl<V> Operation<V> {
    pub fn add(key: impl Into<String>, value: V, timestamp: f64) -> Self {
        Operation::Add {
            key: key.into(),
            value,
            timestamp,
        }
    }

    pub fn remove(key: impl Into<String>, value: V, timestamp: f64) -> Self {
        Operation::Remove {
            key: key.into(),
            value,
            timestamp,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Operation::Add { key, .. } | Operation::Remove { key, .. } => key,
        }
    }

    pub fn value(&self) -> &V {
        match self {
            Operation::Add { value, .. } | Operation::Remove { value, .. } => value,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Operation::Add { timestamp, .. } | Operation::Remove { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, Operation::Add { .. })
    }
}

impl<V, C> LwwDictionary<V, C> {
    /// Apply a delivered operation. Returns `true` when a register changed.
    pub fn apply(&mut self, op: Operation<V>) -> bool {
        match op {
            Operation::Add {
                key,
                value,
                timestamp,
            } => self.add_at(key, value, timestamp),
            Operation::Remove {
                key,
                value,
                timestamp,
            } => self.remove_at(key, value, timestamp),
        }
    }
}

impl<V: Clone, C> LwwDictionary<V, C> {
    /// Replay both registers as operations, additions first
    pub fn operations(&self) -> impl Iterator<Item = Operation<V>> + '_ {
        let adds = self
            .additions()
            .iter()
            .map(|(key, e)| Operation::add(key.clone(), e.value().clone(), e.timestamp()));
        let removes = self
            .removals()
            .iter()
            .map(|(key, e)| Operation::remove(key.clone(), e.value().clone(), e.timestamp()));
        adds.chain(removes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_apply_routes_to_register() {
        let mut d: LwwDictionary<i64, ManualClock> = LwwDictionary::with_clock(ManualClock::new(0.0));

        assert!(d.apply(Operation::add("a", 1, 10.0)));
        assert!(d.apply(Operation::remove("a", 1, 5.0)));
        assert_eq!(d.get("a"), Some(&1));

        assert!(!d.apply(Operation::add("a", 2, 10.0)));
        assert!(d.apply(Operation::remove("a", 1, 10.0)));
        assert_eq!(d.get("a"), None);
    }

    #[test]
    fn test_replaying_operations_equals_merge() {
        let mut source: LwwDictionary<&str> = LwwDictionary::new();
        source.add_at("x", "1", 1.0);
        source.add_at("y", "2", 2.0);
        source.remove_at("y", "2", 3.0);

        let mut merged: LwwDictionary<&str> = LwwDictionary::new();
        merged.add_at("x", "0", 0.5);
        let mut replayed = merged.clone();

        merged.merge(&source);
        for op in source.operations() {
            replayed.apply(op);
        }

        assert_eq!(merged.snapshot(), replayed.snapshot());
        assert_eq!(source.operations().filter(Operation::is_add).count(), 2);
    }

    #[test]
    fn test_json_shape() {
        let op = Operation::add("user:1", "alice".to_string(), 12.5);
        let json = serde_json::to_value(&op).unwrap();

        assert_eq!(json["op"], "add");
        assert_eq!(json["key"], "user:1");
        assert_eq!(json["value"], "alice");
        assert_eq!(json["timestamp"], 12.5);

        let back: Operation<String> = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
