//! lwwdict Storage Backends
//!
//! Persists replica snapshots so a replica can be reloaded and merged later:
//! - Memory (default): Fast, volatile storage
//! - SQLite: Embedded persistence
//!
//! Backends store opaque bytes next to a [`ReplicaMeta`]; the bytes are the
//! MessagePack encoding of the replica's [`Snapshot`].

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use lwwdict_core::{Clock, Replica, ReplicaMeta, ReplicaName, Snapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Storage backend trait
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store a replica snapshot
    async fn store(&self, name: &ReplicaName, meta: &ReplicaMeta, data: &[u8]) -> Result<(), StorageError>;

    /// Load a replica snapshot
    async fn load(&self, name: &ReplicaName) -> Result<Option<(ReplicaMeta, Vec<u8>)>, StorageError>;

    /// Delete a replica
    async fn delete(&self, name: &ReplicaName) -> Result<bool, StorageError>;

    /// List replica names matching a pattern
    async fn list(&self, pattern: Option<&str>) -> Result<Vec<ReplicaName>, StorageError>;

    /// Check if a replica exists
    async fn exists(&self, name: &ReplicaName) -> Result<bool, StorageError>;

    /// Get storage statistics
    async fn stats(&self) -> Result<StorageStats, StorageError>;
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Replica not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<lwwdict_core::Error> for StorageError {
    fn from(e: lwwdict_core::Error) -> Self {
        match e {
            lwwdict_core::Error::ReplicaNotFound(name) => StorageError::NotFound(name),
            other => StorageError::Serialization(other.to_string()),
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub replica_count: usize,
    pub total_size_bytes: usize,
}

/// Persist a replica's current state
pub async fn save_replica<V, C>(storage: &dyn Storage, replica: &Replica<V, C>) -> Result<(), StorageError>
where
    V: Serialize + Clone,
    C: Clock,
{
    let meta = replica.meta();
    let data = replica.snapshot().to_msgpack()?;
    debug!(replica = %meta.name, bytes = data.len(), "saving replica");
    storage.store(replica.name(), &meta, &data).await
}

/// Load and decode a replica's persisted snapshot
pub async fn load_snapshot<V>(storage: &dyn Storage, name: &ReplicaName) -> Result<Option<Snapshot<V>>, StorageError>
where
    V: DeserializeOwned,
{
    match storage.load(name).await? {
        Some((meta, data)) => {
            debug!(replica = %meta.name, bytes = data.len(), "loaded replica");
            Ok(Some(Snapshot::from_msgpack(&data)?))
        }
        None => Ok(None),
    }
}

pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
