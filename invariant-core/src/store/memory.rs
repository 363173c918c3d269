//! In-memory artifact store with pluggable eviction.
//!
//! Fast and ephemeral. The default configuration is a bounded LRU with
//! capacity 1000; unbounded and LFU variants are available, and callers
//! may supply their own [`ArtifactCache`] for anything else (TTL caches,
//! instrumented wrappers).
//!
//! `exists` peeks without touching eviction metadata; `get` counts as a
//! use and updates recency/frequency.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::hash::Digest;
use crate::store::{slot_key, ArtifactStore, CacheStats};
use crate::value::Value;
use crate::{Error, Result};

const DEFAULT_CAPACITY: usize = 1000;

/// Eviction policy for the built-in cache variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Grow without limit.
    Unbounded,
    /// Evict the least recently used slot.
    Lru,
    /// Evict the least frequently used slot.
    Lfu,
}

/// Store configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreConfigError {
    /// A bounded policy needs a capacity of at least 1.
    #[error("capacity must be non-zero")]
    ZeroCapacity,
}

/// The slot container behind a [`MemoryStore`].
///
/// Implement this to plug a custom eviction strategy into the store.
pub trait ArtifactCache: Send {
    /// Whether `key` is present. Must not touch eviction metadata.
    fn contains(&self, key: &str) -> bool;

    /// The value at `key`, counting as a use.
    fn get(&mut self, key: &str) -> Option<Value>;

    /// Insert (or overwrite) `key`, evicting per policy if full.
    fn insert(&mut self, key: String, value: Value);

    /// Number of occupied slots.
    fn len(&self) -> usize;

    /// Whether no slots are occupied.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every slot.
    fn clear(&mut self);
}

/// In-memory artifact store.
pub struct MemoryStore {
    cache: Box<dyn ArtifactCache>,
    stats: CacheStats,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("stats", &self.stats)
            .finish()
    }
}

impl MemoryStore {
    /// The default store: LRU with capacity 1000.
    pub fn new() -> Self {
        Self::with_policy(EvictionPolicy::Lru, None).expect("default capacity is non-zero")
    }

    /// An unbounded store.
    pub fn unbounded() -> Self {
        Self::with_policy(EvictionPolicy::Unbounded, None)
            .expect("unbounded needs no capacity")
    }

    /// A store with the given policy. Bounded policies default to capacity
    /// 1000 when `capacity` is `None` and reject a capacity of zero.
    pub fn with_policy(
        policy: EvictionPolicy,
        capacity: Option<usize>,
    ) -> core::result::Result<Self, StoreConfigError> {
        let cache: Box<dyn ArtifactCache> = match policy {
            EvictionPolicy::Unbounded => Box::new(UnboundedCache::default()),
            EvictionPolicy::Lru => {
                let capacity = NonZeroUsize::new(capacity.unwrap_or(DEFAULT_CAPACITY))
                    .ok_or(StoreConfigError::ZeroCapacity)?;
                Box::new(LruArtifacts(LruCache::new(capacity)))
            }
            EvictionPolicy::Lfu => {
                let capacity = NonZeroUsize::new(capacity.unwrap_or(DEFAULT_CAPACITY))
                    .ok_or(StoreConfigError::ZeroCapacity)?;
                Box::new(LfuCache::new(capacity))
            }
        };
        Ok(Self {
            cache,
            stats: CacheStats::default(),
        })
    }

    /// A store over a caller-supplied cache.
    pub fn with_cache(cache: Box<dyn ArtifactCache>) -> Self {
        Self {
            cache,
            stats: CacheStats::default(),
        }
    }

    /// Number of artifacts currently held.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the store holds no artifacts.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop all artifacts and zero the counters.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.stats = CacheStats::default();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&mut self, op_name: &str, digest: &Digest) -> Result<bool> {
        let present = self.cache.contains(&slot_key(op_name, digest));
        if present {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        Ok(present)
    }

    fn get(&mut self, op_name: &str, digest: &Digest) -> Result<Value> {
        self.cache
            .get(&slot_key(op_name, digest))
            .ok_or_else(|| Error::ArtifactMissing {
                op_name: op_name.to_string(),
                digest: digest.to_hex(),
            })
    }

    fn put(&mut self, op_name: &str, digest: &Digest, artifact: &Value) -> Result<()> {
        self.cache.insert(slot_key(op_name, digest), artifact.clone());
        self.stats.puts += 1;
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }
}

#[derive(Default)]
struct UnboundedCache(BTreeMap<String, Value>);

impl ArtifactCache for UnboundedCache {
    fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn get(&mut self, key: &str) -> Option<Value> {
        self.0.get(key).cloned()
    }

    fn insert(&mut self, key: String, value: Value) {
        self.0.insert(key, value);
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

struct LruArtifacts(LruCache<String, Value>);

impl ArtifactCache for LruArtifacts {
    fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    fn get(&mut self, key: &str) -> Option<Value> {
        self.0.get(key).cloned()
    }

    fn insert(&mut self, key: String, value: Value) {
        self.0.put(key, value);
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// Least-frequently-used cache. Ties evict the smallest key, which keeps
/// eviction deterministic.
struct LfuCache {
    capacity: NonZeroUsize,
    entries: BTreeMap<String, (u64, Value)>,
}

impl LfuCache {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: BTreeMap::new(),
        }
    }

    fn evict_least_frequent(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by(|(ka, (fa, _)), (kb, (fb, _))| fa.cmp(fb).then_with(|| ka.cmp(kb)))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

impl ArtifactCache for LfuCache {
    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&mut self, key: &str) -> Option<Value> {
        let (freq, value) = self.entries.get_mut(key)?;
        *freq += 1;
        Some(value.clone())
    }

    fn insert(&mut self, key: String, value: Value) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.1 = value;
            return;
        }
        if self.entries.len() >= self.capacity.get() {
            self.evict_least_frequent();
        }
        self.entries.insert(key, (1, value));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::stable_digest;

    fn digest_of(i: i64) -> Digest {
        stable_digest(&Value::Int(i))
    }

    #[test]
    fn put_then_get_roundtrips() {
        let mut store = MemoryStore::new();
        let digest = digest_of(1);
        store.put("op", &digest, &Value::Int(42)).unwrap();
        assert!(store.exists("op", &digest).unwrap());
        assert_eq!(store.get("op", &digest).unwrap(), Value::Int(42));
    }

    #[test]
    fn missing_slot_reports_op_and_digest() {
        let mut store = MemoryStore::new();
        let digest = digest_of(1);
        let err = store.get("poly:add", &digest).unwrap_err();
        assert!(matches!(
            err,
            Error::ArtifactMissing { op_name, .. } if op_name == "poly:add"
        ));
    }

    #[test]
    fn exists_moves_stats() {
        let mut store = MemoryStore::new();
        let digest = digest_of(1);
        assert!(!store.exists("op", &digest).unwrap());
        store.put("op", &digest, &Value::Null).unwrap();
        assert!(store.exists("op", &digest).unwrap());
        assert_eq!(
            store.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                puts: 1
            }
        );
    }

    #[test]
    fn idempotent_put_overwrites_in_place() {
        let mut store = MemoryStore::unbounded();
        let digest = digest_of(1);
        store.put("op", &digest, &Value::Int(7)).unwrap();
        store.put("op", &digest, &Value::Int(7)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("op", &digest).unwrap(), Value::Int(7));
    }

    #[test]
    fn lru_evicts_the_stalest_slot() {
        let mut store = MemoryStore::with_policy(EvictionPolicy::Lru, Some(2)).unwrap();
        let (d1, d2, d3) = (digest_of(1), digest_of(2), digest_of(3));
        store.put("op", &d1, &Value::Int(1)).unwrap();
        store.put("op", &d2, &Value::Int(2)).unwrap();
        // Touch d1 so d2 becomes the eviction candidate.
        store.get("op", &d1).unwrap();
        store.put("op", &d3, &Value::Int(3)).unwrap();
        assert!(store.exists("op", &d1).unwrap());
        assert!(!store.exists("op", &d2).unwrap());
        assert!(store.exists("op", &d3).unwrap());
    }

    #[test]
    fn lfu_evicts_the_coldest_slot() {
        let mut store = MemoryStore::with_policy(EvictionPolicy::Lfu, Some(2)).unwrap();
        let (d1, d2, d3) = (digest_of(1), digest_of(2), digest_of(3));
        store.put("op", &d1, &Value::Int(1)).unwrap();
        store.put("op", &d2, &Value::Int(2)).unwrap();
        store.get("op", &d1).unwrap();
        store.get("op", &d1).unwrap();
        store.put("op", &d3, &Value::Int(3)).unwrap();
        assert!(store.exists("op", &d1).unwrap());
        assert!(!store.exists("op", &d2).unwrap());
    }

    #[test]
    fn unbounded_never_evicts() {
        let mut store = MemoryStore::unbounded();
        for i in 0..2000 {
            store.put("op", &digest_of(i), &Value::Int(i)).unwrap();
        }
        assert_eq!(store.len(), 2000);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = MemoryStore::with_policy(EvictionPolicy::Lru, Some(0)).unwrap_err();
        assert_eq!(err, StoreConfigError::ZeroCapacity);
    }

    #[test]
    fn bounded_policies_default_to_capacity_1000() {
        let mut store = MemoryStore::with_policy(EvictionPolicy::Lru, None).unwrap();
        for i in 0..1001 {
            store.put("op", &digest_of(i), &Value::Int(i)).unwrap();
        }
        assert_eq!(store.len(), 1000);
    }

    #[test]
    fn clear_resets_contents_and_stats() {
        let mut store = MemoryStore::new();
        let digest = digest_of(1);
        store.put("op", &digest, &Value::Null).unwrap();
        store.exists("op", &digest).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.stats(), CacheStats::default());
    }
}
