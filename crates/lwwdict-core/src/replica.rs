//! Named, lock-guarded replicas

use crate::clock::{Clock, SystemClock};
use crate::dictionary::{LwwDictionary, MergeSummary};
use crate::error::{Error, Result};
use crate::op::{Operation, Recorded};
use crate::snapshot::Snapshot;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Replica name - UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaName(String);

impl ReplicaName {
    /// Create a new replica name, validating the format
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(Error::InvalidReplicaName("Replica name cannot be empty".into()));
        }

        if name.len() > 512 {
            return Err(Error::InvalidReplicaName("Replica name exceeds 512 bytes".into()));
        }

        // Validate pattern: [a-zA-Z0-9:_-]+
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-') {
            return Err(Error::InvalidReplicaName(
                "Replica name must match pattern [a-zA-Z0-9:_-]+".into(),
            ));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReplicaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ReplicaName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Identity of one replica instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replica metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaMeta {
    pub name: ReplicaName,
    pub id: ReplicaId,
    /// Entries in the additions register
    pub additions: usize,
    /// Entries in the removals register
    pub removals: usize,
    /// Currently visible keys
    pub visible: usize,
}

/// A named dictionary shared behind a read/write lock.
///
/// Every method takes the lock once, so a mutation and the timestamp it is
/// stamped with are observed atomically by other threads.
pub struct Replica<V, C = SystemClock> {
    id: ReplicaId,
    name: ReplicaName,
    dict: RwLock<LwwDictionary<V, C>>,
}

impl<V, C: Clock> Replica<V, C> {
    pub fn new(name: ReplicaName, clock: C) -> Self {
        Self::from_dictionary(name, LwwDictionary::with_clock(clock))
    }

    /// Rebuild a replica from persisted state, under a fresh id
    pub fn from_snapshot(name: ReplicaName, snapshot: Snapshot<V>, clock: C) -> Self {
        Self::from_dictionary(name, LwwDictionary::from_snapshot_with_clock(snapshot, clock))
    }

    pub fn from_dictionary(name: ReplicaName, dict: LwwDictionary<V, C>) -> Self {
        Self {
            id: ReplicaId::new(),
            name,
            dict: RwLock::new(dict),
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn name(&self) -> &ReplicaName {
        &self.name
    }

    /// Apply a delivered operation
    pub fn apply(&self, op: Operation<V>) -> bool {
        self.dict.write().apply(op)
    }

    /// Run `f` against a consistent view of the dictionary
    pub fn read<R>(&self, f: impl FnOnce(&LwwDictionary<V, C>) -> R) -> R {
        f(&self.dict.read())
    }

    /// Run `f` with exclusive access to the dictionary
    pub fn write<R>(&self, f: impl FnOnce(&mut LwwDictionary<V, C>) -> R) -> R {
        f(&mut self.dict.write())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.dict.read().contains_key(key)
    }

    pub fn meta(&self) -> ReplicaMeta {
        let dict = self.dict.read();
        ReplicaMeta {
            name: self.name.clone(),
            id: self.id,
            additions: dict.additions().len(),
            removals: dict.removals().len(),
            visible: dict.len(),
        }
    }
}

impl<V: Clone, C: Clock> Replica<V, C> {
    /// Record an addition at the current clock time
    pub fn add(&self, key: impl Into<String>, value: V) -> Recorded<V> {
        let key = key.into();
        let mut dict = self.dict.write();
        let timestamp = dict.clock().now();
        let changed = dict.add_at(key.clone(), value.clone(), timestamp);
        Recorded {
            op: Operation::add(key, value, timestamp),
            changed,
        }
    }

    /// Record a removal at the current clock time
    pub fn remove(&self, key: impl Into<String>, value: V) -> Recorded<V> {
        let key = key.into();
        let mut dict = self.dict.write();
        let timestamp = dict.clock().now();
        let changed = dict.remove_at(key.clone(), value.clone(), timestamp);
        Recorded {
            op: Operation::remove(key, value, timestamp),
            changed,
        }
    }

    /// Update a visible key at the current clock time.
    ///
    /// Returns `None` without touching the dictionary when the key is hidden.
    /// A visible key whose stored addition is not older than the clock comes
    /// back with `changed` false.
    pub fn update(&self, key: impl Into<String>, value: V) -> Option<Recorded<V>> {
        let key = key.into();
        let mut dict = self.dict.write();
        if !dict.contains_key(&key) {
            return None;
        }
        let timestamp = dict.clock().now();
        let changed = dict.add_at(key.clone(), value.clone(), timestamp);
        Some(Recorded {
            op: Operation::add(key, value, timestamp),
            changed,
        })
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.dict.read().get(key).cloned()
    }

    pub fn projection(&self) -> HashMap<String, V> {
        self.dict.read().projection()
    }

    pub fn snapshot(&self) -> Snapshot<V> {
        self.dict.read().snapshot()
    }

    pub fn merge_snapshot(&self, snapshot: &Snapshot<V>) -> MergeSummary {
        self.dict.write().merge_snapshot(snapshot)
    }

    /// Merge another replica's state into this one.
    ///
    /// The source is copied under its read lock and released before this
    /// replica is write-locked, so concurrent merges in both directions
    /// cannot deadlock.
    pub fn merge_from<C2: Clock>(&self, other: &Replica<V, C2>) -> MergeSummary {
        if self.id == other.id {
            return MergeSummary::default();
        }
        let snapshot = other.snapshot();
        self.merge_snapshot(&snapshot)
    }
}

impl<V, C> std::fmt::Debug for Replica<V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn replica(name: &str, clock: &Arc<ManualClock>) -> Replica<String, Arc<ManualClock>> {
        Replica::new(ReplicaName::new(name).unwrap(), Arc::clone(clock))
    }

    #[test]
    fn test_replica_name_valid() {
        assert!(ReplicaName::new("node:1").is_ok());
        assert!(ReplicaName::new("eu-west_2").is_ok());
    }

    #[test]
    fn test_replica_name_invalid() {
        assert!(ReplicaName::new("").is_err());
        assert!(ReplicaName::new("node/1").is_err());
        assert!(ReplicaName::new("a".repeat(513)).is_err());
    }

    #[test]
    fn test_ops_carry_clock_time() {
        let clock = Arc::new(ManualClock::new(42.0));
        let r = replica("a", &clock);

        let recorded = r.add("key", "value".into());
        assert_eq!(recorded.op, Operation::add("key", "value".to_string(), 42.0));
        assert!(recorded.changed);

        clock.advance(1.0);
        let op = r.remove("key", "value".into()).op;
        assert!(!op.is_add());
        assert_eq!(op.timestamp(), 43.0);
        assert!(r.get("key").is_none());
    }

    #[test]
    fn test_update_hidden_key_returns_none() {
        let clock = Arc::new(ManualClock::new(1.0));
        let r = replica("a", &clock);

        assert!(r.update("missing", "x".into()).is_none());
        assert_eq!(r.meta().additions, 0);

        r.add("k", "v1".into());
        clock.advance(1.0);
        let recorded = r.update("k", "v2".into()).unwrap();
        assert!(recorded.changed);
        assert_eq!(recorded.op.timestamp(), 2.0);
        assert_eq!(r.get("k").as_deref(), Some("v2"));
    }

    #[test]
    fn test_stale_writes_report_unchanged() {
        let clock = Arc::new(ManualClock::new(5.0));
        let r = replica("a", &clock);
        r.apply(Operation::add("k", "future".to_string(), 100.0));
        r.apply(Operation::remove("gone", "x".to_string(), 100.0));

        let add = r.add("k", "now".into());
        assert!(!add.changed);
        assert_eq!(add.op.timestamp(), 5.0);

        let update = r.update("k", "now".into()).unwrap();
        assert!(!update.changed);
        assert_eq!(r.get("k").as_deref(), Some("future"));

        assert!(!r.remove("gone", "x".into()).changed);
    }

    #[test]
    fn test_merge_from_self_is_noop() {
        let clock = Arc::new(ManualClock::new(1.0));
        let r = replica("a", &clock);
        r.add("k", "v".into());

        assert!(r.merge_from(&r).is_empty());
    }

    #[test]
    fn test_merge_from_other() {
        let clock = Arc::new(ManualClock::new(1.0));
        let a = replica("a", &clock);
        let b = replica("b", &clock);

        a.add("x", "from-a".into());
        clock.advance(1.0);
        b.add("y", "from-b".into());

        let summary = a.merge_from(&b);
        assert_eq!(summary.additions_applied, 1);
        assert_eq!(a.projection().len(), 2);

        let meta = a.meta();
        assert_eq!(meta.visible, 2);
        assert_eq!(meta.name.as_str(), "a");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_from_snapshot_gets_fresh_id() {
        let clock = Arc::new(ManualClock::new(1.0));
        let a = replica("a", &clock);
        a.add("x", "1".into());

        let restored = Replica::from_snapshot(a.name().clone(), a.snapshot(), Arc::clone(&clock));
        assert_ne!(restored.id(), a.id());
        assert_eq!(restored.get("x").as_deref(), Some("1"));
        assert!(restored.read(|d| d.contains_key("x")));
    }
}
