//! Artifact storage.
//!
//! Stores hold immutable artifacts under content-addressed
//! `(op_name, digest)` slots. The composite key keeps different operations
//! with coinciding manifests in separate slots. Writes to the same slot are
//! idempotent: the artifact is content-addressed, so every writer carries
//! the same bytes.
//!
//! All methods take `&mut self`: reads move statistics (and, for bounded
//! memory stores, recency/frequency metadata), and a store instance is
//! owned by one executor at a time.

mod chain;
mod memory;
mod null;

pub use chain::ChainStore;
pub use memory::{ArtifactCache, EvictionPolicy, MemoryStore, StoreConfigError};
pub use null::NullStore;

use serde::{Deserialize, Serialize};

use crate::hash::Digest;
use crate::value::Value;
use crate::Result;

/// Hit/miss/put counters, part of the observable store surface.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Presence checks that found the slot occupied.
    pub hits: u64,
    /// Presence checks that found the slot empty.
    pub misses: u64,
    /// Artifacts written.
    pub puts: u64,
}

/// Content-addressed artifact storage.
pub trait ArtifactStore {
    /// Whether an artifact occupies `(op_name, digest)`. Updates stats.
    fn exists(&mut self, op_name: &str, digest: &Digest) -> Result<bool>;

    /// Retrieve the artifact at `(op_name, digest)`; fails with
    /// [`Error::ArtifactMissing`](crate::Error::ArtifactMissing) if absent.
    fn get(&mut self, op_name: &str, digest: &Digest) -> Result<Value>;

    /// Store an artifact at `(op_name, digest)`. Overwriting the same slot
    /// is idempotent.
    fn put(&mut self, op_name: &str, digest: &Digest, artifact: &Value) -> Result<()>;

    /// Current counters.
    fn stats(&self) -> CacheStats;

    /// Zero the counters.
    fn reset_stats(&mut self);
}

/// The composite slot key.
pub fn slot_key(op_name: &str, digest: &Digest) -> String {
    format!("{op_name}:{digest}")
}
