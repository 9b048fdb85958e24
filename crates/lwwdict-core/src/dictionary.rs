//! Last-Writer-Wins element dictionary
//!
//! A dictionary is two independent per-key LWW registers, `additions` and
//! `removals`. The visible key/value state is never stored; it is recomputed
//! from both registers on every query:
//!
//! - a key is visible when it has an addition and either no removal or a
//!   removal strictly older than the addition (ties hide the key);
//! - a register entry is replaced only by a strictly newer timestamp, so on a
//!   tie the element recorded first stays.
//!
//! Merge replays the other replica's registers through the same add/remove
//! rule, which makes it idempotent, commutative and associative as long as
//! no two replicas record conflicting values for a key under the identical
//! timestamp. Under such a tie the outcome depends on which write each
//! replica saw first.

use crate::clock::{Clock, SystemClock};
use crate::element::Element;
use std::collections::hash_map::{Entry, HashMap};
use tracing::{debug, trace};

/// Key to winning element, one per register.
pub type Register<V> = HashMap<String, Element<V>>;

/// Last-Writer-Wins element dictionary, generic over its value type and the
/// clock used for default timestamps.
///
/// Not internally synchronized. Share it behind a lock (see
/// [`Replica`](crate::Replica)) when several threads need it.
#[derive(Debug, Clone)]
pub struct LwwDictionary<V, C = SystemClock> {
    additions: Register<V>,
    removals: Register<V>,
    clock: C,
}

/// Register entries changed by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub additions_applied: usize,
    pub removals_applied: usize,
}

impl MergeSummary {
    pub fn total(&self) -> usize {
        self.additions_applied + self.removals_applied
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl std::ops::AddAssign for MergeSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.additions_applied += rhs.additions_applied;
        self.removals_applied += rhs.removals_applied;
    }
}

impl<V> LwwDictionary<V, SystemClock> {
    /// Create an empty dictionary stamped by the system wall clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<V> Default for LwwDictionary<V, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C> LwwDictionary<V, C> {
    /// Create an empty dictionary that takes default timestamps from `clock`
    pub fn with_clock(clock: C) -> Self {
        Self {
            additions: HashMap::new(),
            removals: HashMap::new(),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Record an addition of `key` at `timestamp`.
    ///
    /// Returns `true` when the additions register changed.
    pub fn add_at(&mut self, key: impl Into<String>, value: V, timestamp: f64) -> bool {
        record(&mut self.additions, "additions", key.into(), Element::new(value, timestamp))
    }

    /// Record a removal of `key` at `timestamp`.
    ///
    /// The value is kept with the tombstone but never consulted by queries
    /// or merge. Returns `true` when the removals register changed.
    pub fn remove_at(&mut self, key: impl Into<String>, value: V, timestamp: f64) -> bool {
        record(&mut self.removals, "removals", key.into(), Element::new(value, timestamp))
    }

    /// Add `key` only if it is currently visible.
    ///
    /// The removal tombstone is not consulted: an update stamped at or
    /// before the key's last removal still lands in the additions register
    /// but leaves the key hidden.
    pub fn update_at(&mut self, key: impl Into<String>, value: V, timestamp: f64) -> bool {
        let key = key.into();
        if !self.contains_key(&key) {
            trace!(key = %key, "update of hidden key ignored");
            return false;
        }
        self.add_at(key, value, timestamp)
    }

    /// Current value of `key`, if visible
    pub fn get(&self, key: &str) -> Option<&V> {
        self.get_element(key).map(Element::value)
    }

    /// Winning addition for `key`, if visible
    pub fn get_element(&self, key: &str) -> Option<&Element<V>> {
        self.additions
            .get(key)
            .filter(|addition| self.is_visible(key, addition))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get_element(key).is_some()
    }

    /// Visible `(key, value)` pairs, in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> + '_ {
        self.additions
            .iter()
            .filter(move |(key, addition)| self.is_visible(key, addition))
            .map(|(key, addition)| (key.as_str(), addition.value()))
    }

    /// Number of visible keys
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn additions(&self) -> &Register<V> {
        &self.additions
    }

    pub fn removals(&self) -> &Register<V> {
        &self.removals
    }

    fn is_visible(&self, key: &str, addition: &Element<V>) -> bool {
        match self.removals.get(key) {
            Some(removal) => removal.timestamp() < addition.timestamp(),
            None => true,
        }
    }
}

impl<V: Clone, C> LwwDictionary<V, C> {
    /// The visible key/value state
    pub fn projection(&self) -> HashMap<String, V> {
        self.iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    /// Fold `other`'s registers into this dictionary.
    pub fn merge<C2>(&mut self, other: &LwwDictionary<V, C2>) -> MergeSummary {
        let mut summary = MergeSummary::default();

        for (key, element) in &other.additions {
            if self.add_at(key.clone(), element.value().clone(), element.timestamp()) {
                summary.additions_applied += 1;
            }
        }
        for (key, element) in &other.removals {
            if self.remove_at(key.clone(), element.value().clone(), element.timestamp()) {
                summary.removals_applied += 1;
            }
        }

        debug!(
            additions = summary.additions_applied,
            removals = summary.removals_applied,
            "merged dictionary"
        );
        summary
    }
}

impl<V, C: Clock> LwwDictionary<V, C> {
    /// [`add_at`](Self::add_at) stamped with the current clock time
    pub fn add(&mut self, key: impl Into<String>, value: V) -> bool {
        let timestamp = self.clock.now();
        self.add_at(key, value, timestamp)
    }

    /// [`remove_at`](Self::remove_at) stamped with the current clock time
    pub fn remove(&mut self, key: impl Into<String>, value: V) -> bool {
        let timestamp = self.clock.now();
        self.remove_at(key, value, timestamp)
    }

    /// [`update_at`](Self::update_at) stamped with the current clock time
    pub fn update(&mut self, key: impl Into<String>, value: V) -> bool {
        let timestamp = self.clock.now();
        self.update_at(key, value, timestamp)
    }
}

fn record<V>(
    register: &mut Register<V>,
    name: &'static str,
    key: String,
    element: Element<V>,
) -> bool {
    match register.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(element);
            true
        }
        Entry::Occupied(mut slot) => {
            if element.supersedes(slot.get()) {
                slot.insert(element);
                true
            } else {
                trace!(
                    register = name,
                    key = %slot.key(),
                    stored = slot.get().timestamp(),
                    incoming = element.timestamp(),
                    "stale write ignored"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn dict(start: f64) -> (Arc<ManualClock>, LwwDictionary<&'static str, Arc<ManualClock>>) {
        let clock = Arc::new(ManualClock::new(start));
        let dict = LwwDictionary::with_clock(Arc::clone(&clock));
        (clock, dict)
    }

    #[test]
    fn test_add_item() {
        let (_, mut d) = dict(100.0);
        assert!(d.add("key", "value"));
        assert_eq!(d.additions().len(), 1);
        assert_eq!(d.get("key"), Some(&"value"));
    }

    #[test]
    fn test_add_then_add_more_recent() {
        let (clock, mut d) = dict(100.0);
        d.add("key", "value");
        clock.advance(1.0);
        d.add("key", "value2");

        assert_eq!(d.additions().len(), 1);
        assert_eq!(d.get("key"), Some(&"value2"));
    }

    #[test]
    fn test_add_then_add_older() {
        let (_, mut d) = dict(100.0);
        d.add("key", "value");
        assert!(!d.add_at("key", "value2", f64::MIN));

        assert_eq!(d.additions().len(), 1);
        assert_eq!(d.get("key"), Some(&"value"));
    }

    #[test]
    fn test_equal_timestamp_keeps_first_writer() {
        let (_, mut d) = dict(0.0);
        d.add_at("key", "first", 100.0);
        assert!(!d.add_at("key", "second", 100.0));
        assert_eq!(d.get("key"), Some(&"first"));
    }

    #[test]
    fn test_remove_item() {
        let (_, mut d) = dict(100.0);
        d.remove("key", "value");
        assert_eq!(d.removals().len(), 1);
        assert!(d.get("key").is_none());
    }

    #[test]
    fn test_remove_then_remove_more_recent() {
        let (clock, mut d) = dict(100.0);
        d.remove("key", "value");
        clock.advance(1.0);
        assert!(d.remove("key", "value2"));

        assert_eq!(d.removals().len(), 1);
        assert_eq!(d.removals()["key"].timestamp(), 101.0);
        assert!(d.get("key").is_none());
    }

    #[test]
    fn test_add_then_remove_more_recent() {
        let (clock, mut d) = dict(100.0);
        d.add("key", "value");
        clock.advance(1.0);
        d.remove("key", "value2");

        assert_eq!(d.additions().len(), 1);
        assert_eq!(d.removals().len(), 1);
        assert!(d.get("key").is_none());
        assert!(d.is_empty());
    }

    #[test]
    fn test_add_then_remove_older() {
        let (_, mut d) = dict(100.0);
        d.add("key", "value");
        d.remove_at("key", "value2", f64::MIN);

        assert_eq!(d.removals().len(), 1);
        assert_eq!(d.get("key"), Some(&"value"));
    }

    #[test]
    fn test_remove_tie_hides_key() {
        let (_, mut d) = dict(0.0);
        d.add_at("key", "value", 100.0);
        d.remove_at("key", "value", 100.0);
        assert!(d.get("key").is_none());
    }

    #[test]
    fn test_add_then_update() {
        let (clock, mut d) = dict(100.0);
        d.add("key", "value");
        clock.advance(1.0);
        assert!(d.update("key", "value2"));

        assert_eq!(d.additions().len(), 1);
        assert_eq!(d.removals().len(), 0);
        assert_eq!(d.get("key"), Some(&"value2"));
    }

    #[test]
    fn test_update_missing_key_is_noop() {
        let (_, mut d) = dict(100.0);
        assert!(!d.update("key", "value"));
        assert!(d.additions().is_empty());
        assert!(d.get("key").is_none());
    }

    #[test]
    fn test_add_remove_then_update() {
        let (clock, mut d) = dict(100.0);
        d.add("key", "value");
        clock.advance(1.0);
        d.remove("key", "value");
        clock.advance(1.0);
        assert!(!d.update("key", "value2"));

        assert!(d.get("key").is_none());
        assert_eq!(d.additions()["key"].value(), &"value");
    }

    #[test]
    fn test_add_remove_add_then_update() {
        let (clock, mut d) = dict(100.0);
        d.add("key", "value");
        d.remove("key", "value");
        d.add_at("key", "value", clock.now() + 1.0);
        d.update_at("key", "value2", clock.now() + 2.0);

        assert_eq!(d.get("key"), Some(&"value2"));
    }

    #[test]
    fn test_projection_and_iter_agree() {
        let (_, mut d) = dict(0.0);
        d.add_at("a", "1", 10.0);
        d.add_at("b", "2", 10.0);
        d.add_at("c", "3", 10.0);
        d.remove_at("b", "2", 11.0);
        d.remove_at("c", "3", 9.0);

        let projection = d.projection();
        assert_eq!(projection.len(), 2);
        assert_eq!(projection.get("a"), Some(&"1"));
        assert_eq!(projection.get("c"), Some(&"3"));
        assert_eq!(d.len(), 2);

        let mut keys: Vec<&str> = d.iter().map(|(k, _)| k).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_merge_only_additions() {
        let (_, mut d) = dict(100.0);
        d.add_at("key", "value", f64::MAX);
        d.add("key2", "value");

        let (_, mut other) = dict(101.0);
        other.add("key", "value2");
        other.add("key2", "value2");

        let summary = d.merge(&other);

        assert_eq!(summary.additions_applied, 1);
        assert_eq!(d.additions().len(), 2);
        assert_eq!(d.get("key"), Some(&"value"));
        assert_eq!(d.get("key2"), Some(&"value2"));
    }

    #[test]
    fn test_merge_summary_counts_changes() {
        let (_, mut d) = dict(0.0);
        let (_, mut other) = dict(0.0);
        other.add_at("a", "1", 1.0);
        other.remove_at("b", "2", 1.0);

        let first = d.merge(&other);
        assert_eq!(first.total(), 2);

        let second = d.merge(&other);
        assert!(second.is_empty());
    }

    #[test]
    fn test_merge_across_clock_types() {
        let mut system: LwwDictionary<&str> = LwwDictionary::new();
        let (_, mut manual) = dict(5.0);
        manual.add("key", "value");

        system.merge(&manual);
        assert_eq!(system.get("key"), Some(&"value"));
    }
}
