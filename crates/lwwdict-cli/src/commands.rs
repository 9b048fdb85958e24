//! Replica operations backed by a storage backend
//!
//! Every call loads the named replica from storage, applies one change and
//! writes it back, so separate invocations of the binary behave like
//! separate sessions against the same replica.

use anyhow::{bail, Context, Result};
use lwwdict_core::{Clock, MergeSummary, Replica, ReplicaMeta, ReplicaName, Snapshot, SystemClock};
use lwwdict_storage::{load_snapshot, save_replica, Storage};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SnapshotFormat;

/// Outcome of a single mutation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applied {
    /// Whether a register changed
    pub changed: bool,
    pub timestamp: f64,
}

pub struct Session {
    storage: Box<dyn Storage>,
}

impl Session {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load a replica, or start an empty one if nothing is stored under `name`
    pub async fn open(&self, name: &ReplicaName) -> Result<Replica<Value>> {
        let snapshot = load_snapshot::<Value>(self.storage.as_ref(), name)
            .await
            .with_context(|| format!("Failed to load replica {}", name))?;

        Ok(match snapshot {
            Some(snapshot) => Replica::from_snapshot(name.clone(), snapshot, SystemClock),
            None => {
                debug!(replica = %name, "starting empty replica");
                Replica::new(name.clone(), SystemClock)
            }
        })
    }

    /// Stored state of a replica that must already exist
    pub async fn snapshot(&self, name: &ReplicaName) -> Result<Snapshot<Value>> {
        match load_snapshot::<Value>(self.storage.as_ref(), name).await? {
            Some(snapshot) => Ok(snapshot),
            None => bail!("Replica not found: {}", name),
        }
    }

    pub async fn save(&self, replica: &Replica<Value>) -> Result<()> {
        save_replica(self.storage.as_ref(), replica)
            .await
            .with_context(|| format!("Failed to save replica {}", replica.name()))
    }

    pub async fn add(&self, name: &ReplicaName, key: &str, value: Value, at: Option<f64>) -> Result<Applied> {
        let replica = self.open(name).await?;
        let applied = replica.write(|d| {
            let timestamp = at.unwrap_or_else(|| d.clock().now());
            Applied {
                changed: d.add_at(key, value, timestamp),
                timestamp,
            }
        });
        self.save(&replica).await?;
        Ok(applied)
    }

    /// Tombstone `key`, carrying its current value when there is one
    pub async fn remove(&self, name: &ReplicaName, key: &str, at: Option<f64>) -> Result<Applied> {
        let replica = self.open(name).await?;
        let applied = replica.write(|d| {
            let timestamp = at.unwrap_or_else(|| d.clock().now());
            let value = d.get(key).cloned().unwrap_or(Value::Null);
            Applied {
                changed: d.remove_at(key, value, timestamp),
                timestamp,
            }
        });
        self.save(&replica).await?;
        Ok(applied)
    }

    /// Update a visible key.
    ///
    /// `None` when the key is hidden; `changed` is false when the key is
    /// visible but the write is not newer than its stored addition.
    pub async fn update(
        &self,
        name: &ReplicaName,
        key: &str,
        value: Value,
        at: Option<f64>,
    ) -> Result<Option<Applied>> {
        let replica = self.open(name).await?;
        let applied = replica.write(|d| {
            if !d.contains_key(key) {
                return None;
            }
            let timestamp = at.unwrap_or_else(|| d.clock().now());
            Some(Applied {
                changed: d.add_at(key, value, timestamp),
                timestamp,
            })
        });
        if applied.is_some_and(|a| a.changed) {
            self.save(&replica).await?;
        }
        Ok(applied)
    }

    pub async fn get(&self, name: &ReplicaName, key: &str) -> Result<Option<Value>> {
        Ok(self.open(name).await?.get(key))
    }

    /// Visible entries sorted by key
    pub async fn list(&self, name: &ReplicaName) -> Result<Vec<(String, Value)>> {
        let mut entries: Vec<_> = self.open(name).await?.projection().into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Merge every source replica into `target` and persist the result
    pub async fn merge(&self, target: &ReplicaName, sources: &[ReplicaName]) -> Result<MergeSummary> {
        let replica = self.open(target).await?;
        let mut summary = MergeSummary::default();

        for source in sources {
            if source == target {
                continue;
            }
            let snapshot = self.snapshot(source).await?;
            let applied = replica.merge_snapshot(&snapshot);
            debug!(target = %target, source = %source, applied = applied.total(), "merged");
            summary += applied;
        }

        self.save(&replica).await?;
        info!(target = %target, sources = sources.len(), applied = summary.total(), "merge complete");
        Ok(summary)
    }

    pub async fn export(&self, name: &ReplicaName, format: SnapshotFormat) -> Result<Vec<u8>> {
        let snapshot = self.snapshot(name).await?;
        let bytes = match format {
            SnapshotFormat::Json => snapshot.to_json_pretty()?.into_bytes(),
            SnapshotFormat::Msgpack => snapshot.to_msgpack()?.to_vec(),
        };
        Ok(bytes)
    }

    /// Merge an exported snapshot into `name`, creating the replica if needed
    pub async fn import(&self, name: &ReplicaName, data: &[u8], format: SnapshotFormat) -> Result<MergeSummary> {
        let snapshot: Snapshot<Value> = match format {
            SnapshotFormat::Json => {
                let text = std::str::from_utf8(data).context("Snapshot is not valid UTF-8")?;
                Snapshot::from_json(text)?
            }
            SnapshotFormat::Msgpack => Snapshot::from_msgpack(data)?,
        };

        let replica = self.open(name).await?;
        let summary = replica.merge_snapshot(&snapshot);
        self.save(&replica).await?;
        Ok(summary)
    }

    /// Metadata of stored replicas, sorted by name
    pub async fn replicas(&self, pattern: Option<&str>) -> Result<Vec<ReplicaMeta>> {
        let mut metas = Vec::new();
        for name in self.storage.list(pattern).await? {
            if let Some((meta, _)) = self.storage.load(&name).await? {
                metas.push(meta);
            }
        }
        Ok(metas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lwwdict_storage::MemoryStorage;
    use serde_json::json;

    fn session() -> Session {
        Session::new(Box::new(MemoryStorage::new()))
    }

    fn name(s: &str) -> ReplicaName {
        ReplicaName::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_add_get_persists_across_opens() {
        let s = session();
        let a = name("a");

        let applied = s.add(&a, "greeting", json!("hello"), Some(1.0)).await.unwrap();
        assert!(applied.changed);
        assert_eq!(applied.timestamp, 1.0);

        assert_eq!(s.get(&a, "greeting").await.unwrap(), Some(json!("hello")));
        assert_eq!(s.get(&a, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_add_is_reported() {
        let s = session();
        let a = name("a");

        s.add(&a, "k", json!(1), Some(10.0)).await.unwrap();
        let applied = s.add(&a, "k", json!(2), Some(5.0)).await.unwrap();

        assert!(!applied.changed);
        assert_eq!(s.get(&a, "k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_remove_hides_key() {
        let s = session();
        let a = name("a");

        s.add(&a, "k", json!({"n": 1}), Some(1.0)).await.unwrap();
        s.remove(&a, "k", Some(2.0)).await.unwrap();

        assert_eq!(s.get(&a, "k").await.unwrap(), None);
        assert!(s.list(&a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_hidden_key_is_ignored() {
        let s = session();
        let a = name("a");

        assert_eq!(s.update(&a, "ghost", json!(1), Some(1.0)).await.unwrap(), None);
        assert!(s.replicas(None).await.unwrap().is_empty());

        s.add(&a, "k", json!(1), Some(1.0)).await.unwrap();
        assert!(s.update(&a, "k", json!(2), Some(2.0)).await.unwrap().unwrap().changed);
        assert_eq!(s.get(&a, "k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_stale_update_of_visible_key() {
        let s = session();
        let a = name("a");

        s.add(&a, "k", json!(1), Some(9e12)).await.unwrap();
        let applied = s.update(&a, "k", json!(2), Some(5.0)).await.unwrap();

        assert_eq!(applied, Some(Applied { changed: false, timestamp: 5.0 }));
        assert_eq!(s.get(&a, "k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let s = session();
        let a = name("a");

        s.add(&a, "b", json!(2), Some(1.0)).await.unwrap();
        s.add(&a, "a", json!(1), Some(1.0)).await.unwrap();

        let keys: Vec<_> = s.list(&a).await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_merge_replicas() {
        let s = session();
        let (a, b, c) = (name("a"), name("b"), name("c"));

        s.add(&a, "x", json!("a"), Some(1.0)).await.unwrap();
        s.add(&b, "y", json!("b"), Some(2.0)).await.unwrap();
        s.remove(&b, "x", Some(3.0)).await.unwrap();

        let summary = s.merge(&c, &[a.clone(), b.clone()]).await.unwrap();
        assert_eq!(summary.additions_applied, 2);
        assert_eq!(summary.removals_applied, 1);

        let entries = s.list(&c).await.unwrap();
        assert_eq!(entries, vec![("y".to_string(), json!("b"))]);
    }

    #[tokio::test]
    async fn test_merge_missing_source_fails() {
        let s = session();
        assert!(s.merge(&name("a"), &[name("nope")]).await.is_err());
    }

    #[tokio::test]
    async fn test_export_import_json_and_msgpack() {
        let s = session();
        let (a, b, c) = (name("a"), name("b"), name("c"));

        s.add(&a, "k", json!([1, 2, 3]), Some(1.0)).await.unwrap();
        s.remove(&a, "gone", Some(2.0)).await.unwrap();

        let json = s.export(&a, SnapshotFormat::Json).await.unwrap();
        let summary = s.import(&b, &json, SnapshotFormat::Json).await.unwrap();
        assert_eq!(summary.total(), 2);

        let packed = s.export(&a, SnapshotFormat::Msgpack).await.unwrap();
        s.import(&c, &packed, SnapshotFormat::Msgpack).await.unwrap();

        assert_eq!(s.list(&b).await.unwrap(), s.list(&a).await.unwrap());
        assert_eq!(s.list(&c).await.unwrap(), s.list(&a).await.unwrap());
    }

    #[tokio::test]
    async fn test_replicas_lists_meta() {
        let s = session();
        s.add(&name("eu:1"), "k", json!(1), Some(1.0)).await.unwrap();
        s.add(&name("us:1"), "k", json!(1), Some(1.0)).await.unwrap();

        let metas = s.replicas(Some("eu:*")).await.unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].name.as_str(), "eu:1");
        assert_eq!(metas[0].visible, 1);
    }
}
