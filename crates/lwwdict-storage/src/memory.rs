//! In-memory storage backend

use crate::{Storage, StorageError, StorageStats};
use async_trait::async_trait;
use dashmap::DashMap;
use lwwdict_core::manager::matches_pattern;
use lwwdict_core::{ReplicaMeta, ReplicaName};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory storage backend
///
/// Fast, volatile storage suitable for tests and simulations.
/// Data is lost when the process exits.
pub struct MemoryStorage {
    /// Replica data: name -> (meta_bytes, snapshot_bytes)
    data: DashMap<String, (Vec<u8>, Vec<u8>)>,
    /// Total size tracking
    total_size: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            total_size: AtomicUsize::new(0),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, name: &ReplicaName, meta: &ReplicaMeta, data: &[u8]) -> Result<(), StorageError> {
        let meta_bytes = serde_json::to_vec(meta)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let new_size = meta_bytes.len() + data.len();
        let previous = self.data.insert(name.as_str().to_string(), (meta_bytes, data.to_vec()));

        if let Some((old_meta, old_data)) = previous {
            self.total_size.fetch_sub(old_meta.len() + old_data.len(), Ordering::Relaxed);
        }
        self.total_size.fetch_add(new_size, Ordering::Relaxed);

        Ok(())
    }

    async fn load(&self, name: &ReplicaName) -> Result<Option<(ReplicaMeta, Vec<u8>)>, StorageError> {
        match self.data.get(name.as_str()) {
            Some(entry) => {
                let (meta_bytes, data) = entry.value();
                let meta: ReplicaMeta = serde_json::from_slice(meta_bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some((meta, data.clone())))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, name: &ReplicaName) -> Result<bool, StorageError> {
        match self.data.remove(name.as_str()) {
            Some((_, (meta_bytes, data))) => {
                let size = meta_bytes.len() + data.len();
                self.total_size.fetch_sub(size, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, pattern: Option<&str>) -> Result<Vec<ReplicaName>, StorageError> {
        let mut names: Vec<ReplicaName> = self
            .data
            .iter()
            .filter(|entry| pattern.map_or(true, |p| matches_pattern(entry.key(), p)))
            .filter_map(|entry| ReplicaName::new(entry.key().clone()).ok())
            .collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(names)
    }

    async fn exists(&self, name: &ReplicaName) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(name.as_str()))
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            replica_count: self.data.len(),
            total_size_bytes: self.total_size.load(Ordering::Relaxed),
        })
    }
}
