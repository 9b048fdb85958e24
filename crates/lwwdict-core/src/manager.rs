//! Replica Manager - hosts named replicas and fans out their operations

use crate::clock::{Clock, SystemClock};
use crate::dictionary::{LwwDictionary, MergeSummary};
use crate::error::{Error, Result};
use crate::op::{Operation, Recorded};
use crate::replica::{Replica, ReplicaId, ReplicaMeta, ReplicaName};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// An operation recorded by one replica, addressed to everyone else
#[derive(Debug, Clone)]
pub struct Delta<V> {
    pub origin: ReplicaId,
    pub replica: ReplicaName,
    pub op: Operation<V>,
}

/// Replica manager holds every replica in the process and a broadcast
/// channel of the operations they record
pub struct ReplicaManager<V, C = SystemClock> {
    /// All replicas indexed by name
    replicas: DashMap<String, Arc<Replica<V, C>>>,
    /// Clock handed to every replica created here
    clock: C,
    /// Broadcast channel for recorded operations
    update_sender: broadcast::Sender<Delta<V>>,
}

impl<V: Clone> ReplicaManager<V, SystemClock> {
    /// Create a new replica manager on the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<V: Clone> Default for ReplicaManager<V, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone, C: Clock + Clone> ReplicaManager<V, C> {
    pub fn with_clock(clock: C) -> Self {
        let (update_sender, _) = broadcast::channel(10000);

        Self {
            replicas: DashMap::new(),
            clock,
            update_sender,
        }
    }

    /// Create a new, empty replica
    pub fn create(&self, name: ReplicaName) -> Result<Arc<Replica<V, C>>> {
        self.insert(Replica::new(name, self.clock.clone()))
    }

    /// Register an existing replica, e.g. one restored from storage
    pub fn insert(&self, replica: Replica<V, C>) -> Result<Arc<Replica<V, C>>> {
        match self.replicas.entry(replica.name().as_str().to_string()) {
            Entry::Occupied(entry) => Err(Error::ReplicaExists(entry.key().clone())),
            Entry::Vacant(slot) => {
                debug!(replica = %replica.name(), id = %replica.id(), "replica created");
                let replica = Arc::new(replica);
                slot.insert(Arc::clone(&replica));
                Ok(replica)
            }
        }
    }

    /// Get an existing replica
    pub fn get(&self, name: &ReplicaName) -> Result<Arc<Replica<V, C>>> {
        self.replicas
            .get(name.as_str())
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| Error::ReplicaNotFound(name.to_string()))
    }

    /// Get or create a replica
    pub fn get_or_create(&self, name: ReplicaName) -> Arc<Replica<V, C>> {
        let key = name.as_str().to_string();

        self.replicas
            .entry(key)
            .or_insert_with(|| Arc::new(Replica::new(name, self.clock.clone())))
            .value()
            .clone()
    }

    /// Drop a replica from the manager
    pub fn drop_replica(&self, name: &ReplicaName) -> Result<()> {
        self.replicas
            .remove(name.as_str())
            .map(|_| debug!(replica = %name, "replica dropped"))
            .ok_or_else(|| Error::ReplicaNotFound(name.to_string()))
    }

    /// List all replicas matching a pattern (glob syntax)
    pub fn list(&self, pattern: Option<&str>) -> Vec<ReplicaMeta> {
        let mut metas: Vec<ReplicaMeta> = self
            .all()
            .into_iter()
            .filter(|r| pattern.map_or(true, |p| matches_pattern(r.name().as_str(), p)))
            .map(|r| r.meta())
            .collect();
        metas.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        metas
    }

    /// Add on the named replica and publish the operation if it changed
    /// the replica
    pub fn add(&self, name: &ReplicaName, key: impl Into<String>, value: V) -> Result<Recorded<V>> {
        let replica = self.get(name)?;
        let recorded = replica.add(key, value);
        self.publish_recorded(&replica, &recorded);
        Ok(recorded)
    }

    /// Remove on the named replica and publish the operation if it changed
    /// the replica
    pub fn remove(&self, name: &ReplicaName, key: impl Into<String>, value: V) -> Result<Recorded<V>> {
        let replica = self.get(name)?;
        let recorded = replica.remove(key, value);
        self.publish_recorded(&replica, &recorded);
        Ok(recorded)
    }

    /// Update on the named replica; `None` when the key is hidden
    pub fn update(
        &self,
        name: &ReplicaName,
        key: impl Into<String>,
        value: V,
    ) -> Result<Option<Recorded<V>>> {
        let replica = self.get(name)?;
        let recorded = replica.update(key, value);
        if let Some(recorded) = &recorded {
            self.publish_recorded(&replica, recorded);
        }
        Ok(recorded)
    }

    /// Subscribe to recorded operations
    pub fn subscribe(&self) -> broadcast::Receiver<Delta<V>> {
        self.update_sender.subscribe()
    }

    /// Publish a delta to all subscribers. Returns the number of receivers.
    pub fn publish(&self, delta: Delta<V>) -> usize {
        self.update_sender.send(delta).unwrap_or(0)
    }

    /// Apply a delta to every replica except the one it came from.
    /// Returns how many replicas changed.
    pub fn relay(&self, delta: &Delta<V>) -> usize {
        let changed = self
            .all()
            .into_iter()
            .filter(|r| r.id() != delta.origin)
            .filter(|r| r.apply(delta.op.clone()))
            .count();
        debug!(origin = %delta.replica, key = %delta.op.key(), changed, "relayed delta");
        changed
    }

    /// Merge two replicas into each other
    pub fn sync(&self, a: &ReplicaName, b: &ReplicaName) -> Result<MergeSummary> {
        let left = self.get(a)?;
        let right = self.get(b)?;

        let mut summary = left.merge_from(&right);
        summary += right.merge_from(&left);
        debug!(a = %a, b = %b, changed = summary.total(), "synced replicas");
        Ok(summary)
    }

    /// Bring every replica to the join of all replicas.
    /// Returns the total number of register entries changed.
    pub fn sync_all(&self) -> MergeSummary {
        let replicas = self.all();

        let mut joined: LwwDictionary<V, C> = LwwDictionary::with_clock(self.clock.clone());
        for replica in &replicas {
            joined.merge_snapshot(&replica.snapshot());
        }
        let joined = joined.snapshot();

        let mut summary = MergeSummary::default();
        for replica in &replicas {
            summary += replica.merge_snapshot(&joined);
        }
        debug!(replicas = replicas.len(), changed = summary.total(), "synced all replicas");
        summary
    }

    /// Get statistics
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            replica_count: self.replicas.len(),
            subscriber_count: self.update_sender.receiver_count(),
        }
    }

    // Stale writes left the replica unchanged and are not published.
    fn publish_recorded(&self, replica: &Replica<V, C>, recorded: &Recorded<V>) {
        if !recorded.changed {
            return;
        }
        self.publish(Delta {
            origin: replica.id(),
            replica: replica.name().clone(),
            op: recorded.op.clone(),
        });
    }

    // Collected up front so no shard lock is held while replicas are locked.
    fn all(&self) -> Vec<Arc<Replica<V, C>>> {
        self.replicas.iter().map(|r| Arc::clone(r.value())).collect()
    }
}

/// Manager statistics
#[derive(Debug, Clone)]
pub struct ManagerStats {
    pub replica_count: usize,
    pub subscriber_count: usize,
}

/// Simple glob pattern matching
pub fn matches_pattern(key: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        return key.starts_with(prefix);
    }

    if let Some(suffix) = pattern.strip_prefix('*') {
        return key.ends_with(suffix);
    }

    key == pattern
}
