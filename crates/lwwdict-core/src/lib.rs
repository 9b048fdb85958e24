//! lwwdict Core - Last-Writer-Wins Element Dictionary
//!
//! This crate provides:
//! - A conflict-free replicated key/value dictionary with LWW registers
//! - Injectable clocks for default timestamps
//! - Operation and snapshot forms for delivery between replicas
//! - Named replicas and an in-process replica manager

pub mod clock;
pub mod dictionary;
pub mod element;
pub mod error;
pub mod manager;
pub mod op;
pub mod replica;
pub mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dictionary::{LwwDictionary, MergeSummary, Register};
pub use element::Element;
pub use error::{Error, Result};
pub use manager::{Delta, ManagerStats, ReplicaManager};
pub use op::{Operation, Recorded};
pub use replica::{Replica, ReplicaId, ReplicaMeta, ReplicaName};
pub use snapshot::{Entry, Snapshot};
