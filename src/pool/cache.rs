use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::results::ResultSet;

/// Default TTL for result-cache entries.
pub const DEFAULT_RESULT_TTL_MS: u64 = 300_000;

/// Per-call opt-in for the pool's result cache.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub use_cache: bool,
    pub cache_key: String,
    pub ttl_ms: u64,
}

impl CacheOptions {
    /// Cache under `key` with the default five-minute TTL.
    #[must_use]
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            use_cache: true,
            cache_key: key.into(),
            ttl_ms: DEFAULT_RESULT_TTL_MS,
        }
    }

    #[must_use]
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }
}

struct CacheEntry {
    value: ResultSet,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

/// TTL-bound result cache with FIFO eviction at capacity.
pub(super) struct ResultCache {
    entries: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
    max_entries: usize,
}

impl ResultCache {
    pub(super) fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            max_entries,
        }
    }

    /// Fetch a live entry; expired entries are removed on the way.
    pub(super) fn get(&mut self, key: &str) -> Option<ResultSet> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            self.insertion_order.retain(|k| k != key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub(super) fn insert(&mut self, key: String, value: ResultSet, ttl_ms: u64) {
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.max_entries {
                let Some(oldest) = self.insertion_order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
            }
            self.insertion_order.push_back(key.clone());
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl: Duration::from_millis(ttl_ms),
            },
        );
    }

    /// Drop every expired entry; called from the reaper.
    pub(super) fn evict_expired(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let entries = &self.entries;
        self.insertion_order.retain(|key| entries.contains_key(key));
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Interning table for statement text.
///
/// The compiled plans themselves live in each worker connection's
/// prepared-statement cache keyed by SQL text, and are finalized when the
/// connection closes; this table gives every caller the same `Arc` key so
/// those per-connection caches actually hit.
#[derive(Default)]
pub(super) struct StatementCache {
    entries: HashMap<String, Arc<String>>,
}

impl StatementCache {
    pub(super) fn intern(&mut self, sql: &str) -> Arc<String> {
        if let Some(cached) = self.entries.get(sql) {
            return Arc::clone(cached);
        }
        let arc = Arc::new(sql.to_owned());
        self.entries.insert(sql.to_owned(), Arc::clone(&arc));
        arc
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_set(marker: i64) -> ResultSet {
        let mut rs = ResultSet::with_capacity(1);
        rs.set_column_names(Arc::new(vec!["n".to_string()]));
        rs.add_row_values(vec![crate::types::DbValue::Int(marker)]);
        rs
    }

    #[test]
    fn fifo_eviction_at_capacity() {
        let mut cache = ResultCache::new(2);
        cache.insert("a".into(), result_set(1), 60_000);
        cache.insert("b".into(), result_set(2), 60_000);
        cache.insert("c".into(), result_set(3), 60_000);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinsert_refreshes_without_growth() {
        let mut cache = ResultCache::new(2);
        cache.insert("a".into(), result_set(1), 60_000);
        cache.insert("a".into(), result_set(2), 60_000);
        assert_eq!(cache.len(), 1);
        let hit = cache.get("a").unwrap();
        assert_eq!(
            hit.first().unwrap().get("n"),
            Some(&crate::types::DbValue::Int(2))
        );
    }

    #[test]
    fn expired_entries_are_dropped_on_get() {
        let mut cache = ResultCache::new(10);
        cache.insert("k".into(), result_set(1), 0);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn statement_interning_returns_same_arc() {
        let mut cache = StatementCache::default();
        let a = cache.intern("SELECT 1");
        let b = cache.intern("SELECT 1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }
}
