//! Size- and time-bounded key/value region

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::debug;

use super::CacheStats;
use crate::config::RegionSettings;
use crate::record::{DirectoryRecord, OrgUnitRecord};

/// Per-entry bookkeeping not covered by the value's own size
const ENTRY_OVERHEAD: usize = 64;

/// Values storable in a region
pub trait Cacheable: Clone + Send + Sync {
    fn approx_size(&self) -> usize;
}

impl Cacheable for DirectoryRecord {
    fn approx_size(&self) -> usize {
        DirectoryRecord::approx_size(self)
    }
}

impl Cacheable for OrgUnitRecord {
    fn approx_size(&self) -> usize {
        OrgUnitRecord::approx_size(self)
    }
}

/// Cached entry with TTL
struct CachedEntry<V> {
    value: V,
    cached_at: Instant,
    size: usize,
    seq: u64,
}

/// One cache region
pub struct RegionCache<V> {
    name: &'static str,
    entries: DashMap<String, CachedEntry<V>>,
    settings: RegionSettings,
    bytes: AtomicUsize,
    next_seq: AtomicU64,
    /// Insertion order: seq -> key, oldest first
    age: Mutex<BTreeMap<u64, String>>,
    stats: DashMap<&'static str, usize>,
}

impl<V: Cacheable> RegionCache<V> {
    pub fn new(name: &'static str, settings: RegionSettings) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            settings,
            bytes: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            age: Mutex::new(BTreeMap::new()),
            stats: DashMap::new(),
        }
    }

    /// Fetch a live entry, dropping it when expired
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            let expired = self
                .settings
                .ttl
                .as_duration()
                .map_or(false, |ttl| entry.cached_at.elapsed() > ttl);

            if expired {
                drop(entry);
                self.remove_entry(key);
                self.increment_stat("expirations");
                self.increment_stat("misses");
                debug!("[{}] expired {}", self.name, key);
                return None;
            }

            self.increment_stat("hits");
            return Some(entry.value.clone());
        }

        self.increment_stat("misses");
        None
    }

    /// Insert or overwrite, restarting the entry's expiry clock
    pub fn put(&self, key: String, value: V) {
        let size = value.approx_size() + key.len() + ENTRY_OVERHEAD;

        if !self.entries.contains_key(&key) {
            self.make_room(size);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let entry = CachedEntry {
            value,
            cached_at: Instant::now(),
            size,
            seq,
        };

        debug!("[{}] put {}", self.name, key);
        self.bytes.fetch_add(size, Ordering::Relaxed);
        let previous = self.entries.insert(key.clone(), entry);

        let mut age = self.age.lock();
        if let Some(previous) = previous {
            self.release(previous.size);
            age.remove(&previous.seq);
        }
        age.insert(seq, key);
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.remove_entry(key);
        if removed {
            debug!("[{}] removed {}", self.name, key);
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.age.lock().clear();
        self.bytes.store(0, Ordering::Relaxed);
        debug!("[{}] cleared", self.name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            evictions: self.get_stat("evictions"),
            entries: self.entries.len(),
            max_entries: self.settings.max_objects,
            approx_bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    fn remove_entry(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.release(entry.size);
                self.age.lock().remove(&entry.seq);
                true
            }
            None => false,
        }
    }

    /// Evict oldest entries until `incoming` more bytes and one more object fit
    fn make_room(&self, incoming: usize) {
        let budget = self.settings.heap_bytes();

        while self.entries.len() >= self.settings.max_objects
            || self.bytes.load(Ordering::Relaxed) + incoming > budget
        {
            let Some((seq, key)) = self.age.lock().pop_first() else {
                break;
            };

            // A concurrent overwrite gives the key a newer seq; leave it be
            if let Some((_, entry)) = self.entries.remove_if(&key, |_, e| e.seq == seq) {
                self.release(entry.size);
                self.increment_stat("evictions");
                debug!("[{}] evicted {}", self.name, key);
            }
        }
    }

    fn release(&self, size: usize) {
        let _ = self
            .bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| {
                Some(b.saturating_sub(size))
            });
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeToLive;
    use std::time::Duration;

    fn settings(max_objects: usize, ttl: TimeToLive) -> RegionSettings {
        RegionSettings {
            heap_mb: 1,
            max_objects,
            ttl,
        }
    }

    #[test]
    fn test_put_and_get() {
        let region = RegionCache::new("org", settings(10, TimeToLive::Infinite));
        region.put("A1".into(), OrgUnitRecord::new("A1"));

        assert_eq!(region.get("A1").map(|r| r.id), Some("A1".to_string()));
        assert!(region.get("A2").is_none());

        let stats = region.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!(stats.approx_bytes > 0);
    }

    #[test]
    fn test_expiry() {
        let region = RegionCache::new(
            "org",
            settings(10, TimeToLive::Finite(Duration::from_millis(10))),
        );
        region.put("A1".into(), OrgUnitRecord::new("A1"));
        std::thread::sleep(Duration::from_millis(30));

        assert!(region.get("A1").is_none());
        assert_eq!(region.stats().expirations, 1);
        assert!(region.is_empty());
        assert_eq!(region.stats().approx_bytes, 0);
    }

    #[test]
    fn test_evicts_oldest_over_capacity() {
        let region = RegionCache::new("org", settings(2, TimeToLive::Infinite));
        region.put("A1".into(), OrgUnitRecord::new("A1"));
        region.put("A2".into(), OrgUnitRecord::new("A2"));
        region.put("A3".into(), OrgUnitRecord::new("A3"));

        assert_eq!(region.len(), 2);
        assert!(!region.contains("A1"));
        assert!(region.contains("A3"));
        assert_eq!(region.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let region = RegionCache::new("org", settings(2, TimeToLive::Infinite));
        region.put("A1".into(), OrgUnitRecord::new("A1"));
        region.put("A2".into(), OrgUnitRecord::new("A2"));
        region.put("A2".into(), OrgUnitRecord::negative("A2"));

        assert_eq!(region.len(), 2);
        assert!(region.get("A2").map_or(false, |r| r.is_negative()));
    }

    #[test]
    fn test_overwrite_refreshes_age() {
        let region = RegionCache::new("org", settings(2, TimeToLive::Infinite));
        region.put("A1".into(), OrgUnitRecord::new("A1"));
        region.put("A2".into(), OrgUnitRecord::new("A2"));
        region.put("A1".into(), OrgUnitRecord::negative("A1"));
        region.put("A3".into(), OrgUnitRecord::new("A3"));

        assert_eq!(region.len(), 2);
        assert!(region.contains("A1"));
        assert!(!region.contains("A2"));
        assert!(region.contains("A3"));
    }

    #[test]
    fn test_sustained_inserts_over_capacity() {
        let region = RegionCache::new(
            "org",
            RegionSettings {
                heap_mb: 128,
                max_objects: 5_000,
                ttl: TimeToLive::Infinite,
            },
        );
        for i in 0..25_000 {
            region.put(format!("A{i}"), OrgUnitRecord::new(format!("A{i}")));
        }

        let stats = region.stats();
        assert_eq!(stats.entries, 5_000);
        assert_eq!(stats.evictions, 20_000);
        assert!(!region.contains("A0"));
        assert!(!region.contains("A19999"));
        assert!(region.contains("A20000"));
        assert!(region.contains("A24999"));
    }

    #[test]
    fn test_byte_budget() {
        let region = RegionCache::new(
            "org",
            RegionSettings {
                heap_mb: 0,
                max_objects: 100,
                ttl: TimeToLive::Infinite,
            },
        );
        region.put("A1".into(), OrgUnitRecord::new("A1"));
        region.put("A2".into(), OrgUnitRecord::new("A2"));

        // a zero budget keeps at most the newest entry
        assert_eq!(region.len(), 1);
        assert!(region.contains("A2"));
    }

    #[test]
    fn test_clear() {
        let region = RegionCache::new("org", settings(10, TimeToLive::Infinite));
        region.put("A1".into(), OrgUnitRecord::new("A1"));
        region.clear();

        assert!(region.is_empty());
        assert_eq!(region.stats().approx_bytes, 0);

        // nothing stale left to evict after a clear
        let region = RegionCache::new("org", settings(1, TimeToLive::Infinite));
        region.put("A1".into(), OrgUnitRecord::new("A1"));
        region.clear();
        region.put("A2".into(), OrgUnitRecord::new("A2"));
        assert_eq!(region.stats().evictions, 0);
    }
}
