//! Register snapshots
//!
//! A [`Snapshot`] is the full state of a dictionary as two key-sorted lists
//! of `(key, value, timestamp)` triples. It is what storage backends persist
//! and what a state-based transport ships between replicas.

use crate::clock::SystemClock;
use crate::dictionary::{LwwDictionary, MergeSummary, Register};
use crate::error::Result;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One register entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<V> {
    pub key: String,
    pub value: V,
    pub timestamp: f64,
}

/// Both registers of a dictionary, each sorted by key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<V> {
    pub additions: Vec<Entry<V>>,
    pub removals: Vec<Entry<V>>,
}

impl<V> Default for Snapshot<V> {
    fn default() -> Self {
        Self {
            additions: Vec::new(),
            removals: Vec::new(),
        }
    }
}

impl<V> Snapshot<V> {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

impl<V: Serialize> Snapshot<V> {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// MessagePack encoding with named fields
    pub fn to_msgpack(&self) -> Result<Bytes> {
        Ok(Bytes::from(rmp_serde::to_vec_named(self)?))
    }
}

impl<V: DeserializeOwned> Snapshot<V> {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_msgpack(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

fn sorted_entries<V: Clone>(register: &Register<V>) -> Vec<Entry<V>> {
    let mut entries: Vec<Entry<V>> = register
        .iter()
        .map(|(key, element)| Entry {
            key: key.clone(),
            value: element.value().clone(),
            timestamp: element.timestamp(),
        })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    entries
}

impl<V> LwwDictionary<V, SystemClock> {
    /// Rebuild a dictionary stamped by the system clock
    pub fn restore(snapshot: Snapshot<V>) -> Self {
        Self::from_snapshot_with_clock(snapshot, SystemClock)
    }
}

impl<V, C> LwwDictionary<V, C> {
    /// Rebuild a dictionary by replaying `snapshot` through the register
    /// rule, so repeated keys resolve exactly as they would live.
    pub fn from_snapshot_with_clock(snapshot: Snapshot<V>, clock: C) -> Self {
        let mut dict = Self::with_clock(clock);
        for entry in snapshot.additions {
            dict.add_at(entry.key, entry.value, entry.timestamp);
        }
        for entry in snapshot.removals {
            dict.remove_at(entry.key, entry.value, entry.timestamp);
        }
        dict
    }
}

impl<V: Clone, C> LwwDictionary<V, C> {
    pub fn snapshot(&self) -> Snapshot<V> {
        Snapshot {
            additions: sorted_entries(self.additions()),
            removals: sorted_entries(self.removals()),
        }
    }

    /// Merge a delivered full state without materializing a dictionary
    pub fn merge_snapshot(&mut self, snapshot: &Snapshot<V>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for entry in &snapshot.additions {
            if self.add_at(entry.key.clone(), entry.value.clone(), entry.timestamp) {
                summary.additions_applied += 1;
            }
        }
        for entry in &snapshot.removals {
            if self.remove_at(entry.key.clone(), entry.value.clone(), entry.timestamp) {
                summary.removals_applied += 1;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LwwDictionary<String> {
        let mut d = LwwDictionary::new();
        d.add_at("b", "two".to_string(), 2.0);
        d.add_at("a", "one".to_string(), 1.0);
        d.remove_at("b", "two".to_string(), 3.0);
        d
    }

    #[test]
    fn test_snapshot_is_key_sorted() {
        let snapshot = sample().snapshot();
        let keys: Vec<&str> = snapshot.additions.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(snapshot.removals.len(), 1);
        assert_eq!(snapshot.removals[0].timestamp, 3.0);
    }

    #[test]
    fn test_restore_preserves_registers() {
        let original = sample();
        let restored = LwwDictionary::restore(original.snapshot());

        assert_eq!(restored.snapshot(), original.snapshot());
        assert_eq!(restored.get("a").map(String::as_str), Some("one"));
        assert!(restored.get("b").is_none());
    }

    fn entry(key: &str, value: i32, timestamp: f64) -> Entry<i32> {
        Entry {
            key: key.to_string(),
            value,
            timestamp,
        }
    }

    #[test]
    fn test_restore_resolves_duplicate_keys() {
        let snapshot = Snapshot {
            additions: vec![
                entry("k", 1, 5.0),
                entry("k", 2, 9.0),
                entry("k", 3, 9.0),
            ],
            removals: vec![],
        };

        let d = LwwDictionary::restore(snapshot);
        assert_eq!(d.get("k"), Some(&2));
        assert_eq!(d.additions().len(), 1);
    }

    #[test]
    fn test_encodings() {
        let snapshot = sample().snapshot();

        let json = snapshot.to_json().unwrap();
        assert_eq!(Snapshot::<String>::from_json(&json).unwrap(), snapshot);

        let packed = snapshot.to_msgpack().unwrap();
        assert_eq!(Snapshot::<String>::from_msgpack(&packed).unwrap(), snapshot);
    }

    #[test]
    fn test_decode_failure_is_serialization_error() {
        let err = Snapshot::<String>::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::Error::Serialization(_)));

        let err = Snapshot::<String>::from_msgpack(&[0xc1]).unwrap_err();
        assert!(matches!(err, crate::Error::Serialization(_)));
    }

    #[test]
    fn test_merge_snapshot() {
        let mut d: LwwDictionary<String> = LwwDictionary::new();
        d.add_at("a", "old".to_string(), 0.5);

        let summary = d.merge_snapshot(&sample().snapshot());
        assert_eq!(summary.additions_applied, 2);
        assert_eq!(summary.removals_applied, 1);
        assert_eq!(d.get("a").map(String::as_str), Some("one"));
    }
}
