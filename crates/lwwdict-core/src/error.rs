//! Error types for lwwdict Core
//!
//! Dictionary mutations and queries are infallible. Errors only arise at the
//! edges: decoding snapshots and addressing replicas by name.

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Replica not found: {0}")]
    ReplicaNotFound(String),

    #[error("Replica already exists: {0}")]
    ReplicaExists(String),

    #[error("Invalid replica name: {0}")]
    InvalidReplicaName(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias for lwwdict Core operations
pub type Result<T> = std::result::Result<T, Error>;
