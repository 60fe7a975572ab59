//! Bounded TTL cache for composite index results.
//!
//! Keys are content hashes of the exact calculation input. Entries
//! expire after the TTL and are evicted oldest-inserted-first once the
//! size cap is exceeded; a periodic sweep (driven by the calculator's
//! sweeper task) removes expired entries independent of reads.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::CompositeIndexResult;

struct CachedEntry {
    result: CompositeIndexResult,
    stored_at: Instant,
}

pub(crate) struct IndexCache {
    entries: HashMap<String, CachedEntry>,
    /// Keys in insertion order, oldest first.
    order: VecDeque<String>,
    ttl: Duration,
    max_entries: usize,
}

impl IndexCache {
    pub(crate) fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            max_entries,
        }
    }

    /// Returns the live entry for `key`, dropping it if expired.
    pub(crate) fn get(&mut self, key: &str) -> Option<CompositeIndexResult> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() >= self.ttl {
            self.remove(key);
            return None;
        }
        Some(self.entries[key].result.clone())
    }

    /// Inserts `result`, evicting the oldest-inserted entries once the
    /// cap is exceeded.
    pub(crate) fn insert(&mut self, key: String, result: CompositeIndexResult) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }

        self.entries.insert(
            key.clone(),
            CachedEntry {
                result,
                stored_at: Instant::now(),
            },
        );
        self.order.push_back(key);

        while self.entries.len() > self.max_entries {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    /// Removes every expired entry, returning how many were dropped.
    pub(crate) fn sweep_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();

        self.entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        self.order.retain(|k| self.entries.contains_key(k));

        before - self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::PovertyLevel;

    use super::*;

    fn result() -> CompositeIndexResult {
        CompositeIndexResult {
            poverty_index: 50,
            poverty_level: PovertyLevel::Medium,
            confidence_score: 60,
            breakdown: Vec::new(),
            recommendations: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn exceeding_the_cap_evicts_exactly_the_oldest_entry() {
        let mut cache = IndexCache::new(Duration::from_secs(300), 3);

        for key in ["a", "b", "c", "d"] {
            cache.insert(key.to_string(), result());
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn the_1001st_entry_evicts_only_the_oldest() {
        let mut cache = IndexCache::new(Duration::from_secs(300), 1000);

        for i in 0..1001 {
            cache.insert(format!("k{i}"), result());
        }

        assert_eq!(cache.len(), 1000);
        assert!(cache.get("k0").is_none());
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k1000").is_some());
    }

    #[test]
    fn reinserting_a_key_does_not_grow_the_cache() {
        let mut cache = IndexCache::new(Duration::from_secs(300), 3);

        cache.insert("a".to_string(), result());
        cache.insert("b".to_string(), result());
        cache.insert("a".to_string(), result());

        assert_eq!(cache.len(), 2);

        // "a" was refreshed, so "b" is now the oldest.
        cache.insert("c".to_string(), result());
        cache.insert("d".to_string(), result());
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let mut cache = IndexCache::new(Duration::ZERO, 10);

        cache.insert("a".to_string(), result());
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn sweep_removes_expired_entries_without_reads() {
        let mut cache = IndexCache::new(Duration::ZERO, 10);

        cache.insert("a".to_string(), result());
        cache.insert("b".to_string(), result());

        assert_eq!(cache.sweep_expired(), 2);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.sweep_expired(), 0);
    }

    #[test]
    fn live_entries_survive_a_sweep() {
        let mut cache = IndexCache::new(Duration::from_secs(300), 10);

        cache.insert("a".to_string(), result());
        assert_eq!(cache.sweep_expired(), 0);
        assert!(cache.get("a").is_some());
    }
}
