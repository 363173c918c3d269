//! # Invariant Core
//!
//! A deterministic execution engine for DAGs of pure, content-addressed
//! operations.
//!
//! A graph maps vertex ids to vertices; each vertex names an operation,
//! carries static parameters (possibly referring to upstream artifacts
//! through [`ParamValue::Ref`]/[`ParamValue::Expr`] markers), and declares
//! its upstream dependencies. The [`Executor`] resolves parameters against
//! upstream artifacts, fingerprints the resolved manifest, and either reuses
//! a stored artifact or invokes the operation and persists the result.
//! Identical manifests collapse to a single execution, whatever path
//! produced them.
//!
//! Determinism rests on two pillars:
//! - a closed cacheable value universe ([`Value`]) that cannot represent an
//!   IEEE-754 float, and
//! - a canonical binary encoding ([`codec`]) over which all fingerprints
//!   ([`hash`]) are computed.
//!
//! This crate performs no file I/O. The on-disk content-addressed store
//! lives in the host-facing `invariant` crate.
//!
//! [`ParamValue::Ref`]: params::ParamValue::Ref
//! [`ParamValue::Expr`]: params::ParamValue::Expr
//! [`Value`]: value::Value
//! [`Executor`]: executor::Executor

pub mod codec;
pub mod executor;
pub mod expr;
pub mod graph;
pub mod hash;
pub mod params;
pub mod registry;
pub mod store;
pub mod value;
pub mod vertex;

pub use codec::{decode, encode, DomainRegistry};
pub use executor::Executor;
pub use graph::{Graph, GraphResolver};
pub use hash::{fingerprint, stable_hash, Digest};
pub use params::{resolve_params, ParamValue};
pub use registry::{OpArgs, OpPackage, OpRegistry, Operation};
pub use store::{ArtifactStore, CacheStats, ChainStore, MemoryStore, NullStore};
pub use value::{DomainType, DomainValue, Value};
pub use vertex::{OpVertex, SubGraphVertex, Vertex};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::executor::Executor;
    pub use crate::graph::{Graph, GraphResolver};
    pub use crate::params::ParamValue;
    pub use crate::registry::{OpArgs, OpRegistry};
    pub use crate::store::{ArtifactStore, ChainStore, MemoryStore, NullStore};
    pub use crate::value::Value;
    pub use crate::vertex::{OpVertex, SubGraphVertex, Vertex};
    pub use crate::{Error, Result};
}

/// Result type for engine operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for engine operations.
///
/// One structured error per fault: the kind, the vertex id where it surfaced
/// (via [`Error::AtVertex`]), the faulty field or expression, and a terse
/// message. No error aggregates multiple faults.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A float or float-bearing value reached a cacheable position or an
    /// expression result.
    #[error("float values are forbidden in cacheable data: {context}")]
    FloatForbidden {
        /// The field or expression where the float surfaced.
        context: String,
    },

    /// A value outside the cacheable universe was supplied at a boundary.
    #[error("value is outside the cacheable universe: {context}")]
    NotCacheable {
        /// The field where the value surfaced.
        context: String,
    },

    /// A `Ref` or expression variable names something absent from the
    /// resolution scope.
    #[error("unknown dependency `{name}`: not among the artifacts in scope")]
    UnknownDependency {
        /// The referenced name.
        name: String,
    },

    /// A `Ref` in a vertex's params names something outside that vertex's
    /// declared deps. Raised at vertex construction.
    #[error("params reference `{name}`, which is not declared in deps {declared:?}")]
    UndeclaredReference {
        /// The referenced name.
        name: String,
        /// The deps the vertex declared.
        declared: Vec<String>,
    },

    /// A declared dep names nothing in the graph or the external context.
    #[error("vertex `{vertex}` depends on `{dep}`, which is in neither the graph nor the context")]
    MissingDependency {
        /// The vertex declaring the dep.
        vertex: String,
        /// The missing dep.
        dep: String,
    },

    /// A vertex names an operation the registry does not know.
    #[error("vertex `{vertex}` names unregistered operation `{op_name}`")]
    UnknownOperation {
        /// The vertex naming the operation.
        vertex: String,
        /// The unregistered operation name.
        op_name: String,
    },

    /// The dependency relation is cyclic.
    #[error("dependency cycle detected through vertex `{vertex}`")]
    CycleDetected {
        /// A vertex on the cycle.
        vertex: String,
    },

    /// A subgraph's declared output names no vertex of its inner graph.
    /// Raised at vertex construction.
    #[error("subgraph output `{output}` is not a vertex of the inner graph")]
    SubGraphOutputMissing {
        /// The declared output id.
        output: String,
    },

    /// An expression failed to parse.
    #[error("failed to parse expression `{expr}`: {message}")]
    ParseError {
        /// The offending expression text.
        expr: String,
        /// What went wrong.
        message: String,
    },

    /// An expression or operation argument had the wrong type.
    #[error("type mismatch in {context}: {message}")]
    TypeMismatch {
        /// The expression or `op.param` position.
        context: String,
        /// What was expected and what arrived.
        message: String,
    },

    /// An operation requires a parameter the manifest lacks.
    #[error("operation `{op_name}` requires parameter `{param}`, absent from the manifest")]
    MissingParameter {
        /// The invoked operation.
        op_name: String,
        /// The missing parameter name.
        param: String,
    },

    /// `get` was called for a slot the store does not hold.
    #[error("no artifact stored for operation `{op_name}` at digest {digest}")]
    ArtifactMissing {
        /// The operation component of the slot key.
        op_name: String,
        /// The digest component of the slot key, as 64-hex.
        digest: String,
    },

    /// A digest string failed shape validation at a store boundary.
    #[error("malformed digest `{text}`: expected 64 lowercase hex characters")]
    MalformedDigest {
        /// The rejected text.
        text: String,
    },

    /// An I/O fault in a storage backend.
    #[error("storage I/O failure at {path}: {source}")]
    StorageIo {
        /// The path involved.
        path: String,
        /// The underlying fault.
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes failed to decode: truncated input, unknown tag, bad
    /// length, non-canonical ordering.
    #[error("corrupt artifact data: {context}")]
    CorruptData {
        /// The field that failed to decode.
        context: String,
    },

    /// A registry name is already bound.
    #[error("operation name `{name}` is already registered")]
    NameInUse {
        /// The conflicting name.
        name: String,
    },

    /// A registry name is not bound.
    #[error("operation `{name}` is not registered")]
    NameMissing {
        /// The looked-up name.
        name: String,
    },

    /// A fault attributed to a specific vertex of the executing graph.
    #[error("vertex `{vertex}`: {source}")]
    AtVertex {
        /// The vertex whose processing failed.
        vertex: String,
        /// The underlying fault.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attribute this error to a vertex. Attributions nest across graph
    /// levels (a subgraph failure reads `sub` → `inner_vertex` → fault),
    /// while re-attribution to the same vertex collapses.
    pub fn at_vertex(self, vertex: &str) -> Error {
        match &self {
            Error::AtVertex {
                vertex: existing, ..
            } if existing == vertex => self,
            _ => Error::AtVertex {
                vertex: vertex.to_string(),
                source: Box::new(self),
            },
        }
    }

    /// The underlying fault, with any vertex attribution stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::AtVertex { source, .. } => source.root(),
            other => other,
        }
    }
}
