//! Store that never caches.
//!
//! Every `exists` misses, every `put` is discarded, `get` is an error.
//! For execution-correctness tests where cache behavior is irrelevant.
//! Stats stay zero.

use crate::hash::Digest;
use crate::store::{ArtifactStore, CacheStats};
use crate::value::Value;
use crate::{Error, Result};

/// The no-op store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl NullStore {
    /// A store that never caches.
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactStore for NullStore {
    fn exists(&mut self, _op_name: &str, _digest: &Digest) -> Result<bool> {
        Ok(false)
    }

    fn get(&mut self, op_name: &str, digest: &Digest) -> Result<Value> {
        // Unreachable through the executor: `exists` never reports a hit.
        Err(Error::ArtifactMissing {
            op_name: op_name.to_string(),
            digest: digest.to_hex(),
        })
    }

    fn put(&mut self, _op_name: &str, _digest: &Digest, _artifact: &Value) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }

    fn reset_stats(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::stable_digest;

    #[test]
    fn never_stores_anything() {
        let mut store = NullStore::new();
        let digest = stable_digest(&Value::Int(1));
        store.put("op", &digest, &Value::Int(1)).unwrap();
        assert!(!store.exists("op", &digest).unwrap());
        assert!(matches!(
            store.get("op", &digest).unwrap_err(),
            Error::ArtifactMissing { .. }
        ));
        assert_eq!(store.stats(), CacheStats::default());
    }
}
