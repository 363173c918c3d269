//! # Invariant
//!
//! Memoized, reproducible computation over DAGs of pure operations.
//!
//! The engine lives in [`invariant_core`]; this crate adds the host-facing
//! surface: the on-disk content-addressed store ([`disk`]), the
//! [`Polynomial`](poly::Polynomial) domain type with its `poly:` operation
//! package, the `stdlib:` package, and the graph JSON wire format
//! ([`serialize`]).
//!
//! ## Quick start
//!
//! ```
//! use invariant::prelude::*;
//! use invariant::ops;
//! use std::collections::BTreeMap;
//!
//! # fn main() -> invariant::Result<()> {
//! let mut registry = OpRegistry::new();
//! registry.register_package("stdlib", ops::package())?;
//!
//! let mut params = BTreeMap::new();
//! params.insert("a".to_string(), ParamValue::from(2i64));
//! params.insert("b".to_string(), ParamValue::from(3i64));
//! let graph = Graph::new()
//!     .with_vertex("sum", OpVertex::new("stdlib:add", params, Vec::<String>::new())?);
//!
//! let mut store = MemoryStore::new();
//! let results = Executor::new(&registry, &mut store).execute(&graph)?;
//! assert_eq!(results["sum"], Value::Int(5));
//! # Ok(())
//! # }
//! ```

// Re-export the engine.
pub use invariant_core as core;

pub use invariant_core::{
    codec, executor, expr, graph, hash, params, registry, store, value, vertex,
};
pub use invariant_core::{
    decode, encode, fingerprint, resolve_params, stable_hash, ArtifactStore, CacheStats,
    ChainStore, Digest, DomainRegistry, DomainType, DomainValue, Error, Executor, Graph,
    GraphResolver, MemoryStore, NullStore, OpArgs, OpPackage, OpRegistry, OpVertex, Operation,
    ParamValue, Result, SubGraphVertex, Value, Vertex,
};

pub mod disk;
pub mod ops;
pub mod poly;
pub mod serialize;

pub use disk::DiskStore;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::disk::DiskStore;
    pub use crate::poly::Polynomial;
    pub use invariant_core::prelude::*;
}
