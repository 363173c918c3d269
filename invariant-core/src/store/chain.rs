//! Two-tier composite store.
//!
//! Chains a fast L1 over a persistent L2 (typically memory over disk).
//! `exists` hits if either tier holds the slot; `get` promotes an L2 hit
//! into L1 before returning; `put` writes both tiers.

use crate::hash::Digest;
use crate::store::{ArtifactStore, CacheStats};
use crate::value::Value;
use crate::{Error, Result};

/// L1-over-L2 composite store.
#[derive(Debug)]
pub struct ChainStore<L1, L2> {
    l1: L1,
    l2: L2,
    stats: CacheStats,
}

impl<L1: ArtifactStore, L2: ArtifactStore> ChainStore<L1, L2> {
    /// Chain `l1` over `l2`.
    pub fn new(l1: L1, l2: L2) -> Self {
        Self {
            l1,
            l2,
            stats: CacheStats::default(),
        }
    }

    /// The L1 tier.
    pub fn l1(&self) -> &L1 {
        &self.l1
    }

    /// The L1 tier, mutably (tests seed and inspect tiers directly).
    pub fn l1_mut(&mut self) -> &mut L1 {
        &mut self.l1
    }

    /// The L2 tier.
    pub fn l2(&self) -> &L2 {
        &self.l2
    }

    /// The L2 tier, mutably.
    pub fn l2_mut(&mut self) -> &mut L2 {
        &mut self.l2
    }

    /// Take the tiers back.
    pub fn into_tiers(self) -> (L1, L2) {
        (self.l1, self.l2)
    }
}

impl<L1: ArtifactStore, L2: ArtifactStore> ArtifactStore for ChainStore<L1, L2> {
    fn exists(&mut self, op_name: &str, digest: &Digest) -> Result<bool> {
        if self.l1.exists(op_name, digest)? || self.l2.exists(op_name, digest)? {
            self.stats.hits += 1;
            return Ok(true);
        }
        self.stats.misses += 1;
        Ok(false)
    }

    fn get(&mut self, op_name: &str, digest: &Digest) -> Result<Value> {
        if self.l1.exists(op_name, digest)? {
            return self.l1.get(op_name, digest);
        }
        if self.l2.exists(op_name, digest)? {
            let artifact = self.l2.get(op_name, digest)?;
            self.l1.put(op_name, digest, &artifact)?;
            return Ok(artifact);
        }
        Err(Error::ArtifactMissing {
            op_name: op_name.to_string(),
            digest: digest.to_hex(),
        })
    }

    fn put(&mut self, op_name: &str, digest: &Digest, artifact: &Value) -> Result<()> {
        self.l1.put(op_name, digest, artifact)?;
        self.l2.put(op_name, digest, artifact)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::stable_digest;
    use crate::store::MemoryStore;

    fn chain() -> ChainStore<MemoryStore, MemoryStore> {
        ChainStore::new(MemoryStore::unbounded(), MemoryStore::unbounded())
    }

    #[test]
    fn put_writes_both_tiers() {
        let mut store = chain();
        let digest = stable_digest(&Value::Int(1));
        store.put("op", &digest, &Value::Int(1)).unwrap();
        assert!(store.l1_mut().exists("op", &digest).unwrap());
        assert!(store.l2_mut().exists("op", &digest).unwrap());
    }

    #[test]
    fn l2_hit_promotes_into_l1() {
        let mut store = chain();
        let digest = stable_digest(&Value::Int(2));
        store.l2_mut().put("op", &digest, &Value::Int(2)).unwrap();
        assert!(!store.l1_mut().exists("op", &digest).unwrap());

        assert_eq!(store.get("op", &digest).unwrap(), Value::Int(2));
        assert!(store.l1_mut().exists("op", &digest).unwrap());
    }

    #[test]
    fn exists_hits_on_either_tier() {
        let mut store = chain();
        let digest = stable_digest(&Value::Int(3));
        store.l2_mut().put("op", &digest, &Value::Int(3)).unwrap();
        assert!(store.exists("op", &digest).unwrap());
        assert_eq!(store.stats().hits, 1);

        let other = stable_digest(&Value::Int(4));
        assert!(!store.exists("op", &other).unwrap());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn missing_everywhere_is_an_error() {
        let mut store = chain();
        let digest = stable_digest(&Value::Int(5));
        assert!(matches!(
            store.get("op", &digest).unwrap_err(),
            Error::ArtifactMissing { .. }
        ));
    }
}
