//! The runtime engine driving a graph execution.
//!
//! Single-threaded cooperative traversal in topological order. Each vertex
//! goes through the two-phase cycle: resolve params into a manifest,
//! fingerprint it, then serve from the store on a hit or invoke the
//! operation and persist on a miss. The manifest contains resolved params
//! only — dependencies appear only insofar as resolution names them — so
//! two vertices whose resolved params coincide share one cache slot
//! regardless of which dependencies each declared.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::graph::{Graph, GraphResolver};
use crate::hash::fingerprint;
use crate::params::resolve_params;
use crate::registry::{OpArgs, OpRegistry};
use crate::store::ArtifactStore;
use crate::value::Value;
use crate::vertex::{OpVertex, SubGraphVertex, Vertex};
use crate::{Error, Result};

/// Executes graphs against a registry and a store.
pub struct Executor<'e> {
    registry: &'e OpRegistry,
    store: &'e mut dyn ArtifactStore,
}

impl<'e> Executor<'e> {
    /// An executor over the given registry and store.
    pub fn new(registry: &'e OpRegistry, store: &'e mut dyn ArtifactStore) -> Self {
        Self { registry, store }
    }

    /// Execute `graph` with no external context.
    pub fn execute(&mut self, graph: &Graph) -> Result<BTreeMap<String, Value>> {
        self.execute_with_context(graph, &BTreeMap::new())
    }

    /// Execute `graph`, seeding the artifact table with `context`.
    ///
    /// Context keys satisfy dependency validation but never participate in
    /// cycle detection. The returned table is restricted to the graph's own
    /// vertex ids; context bindings stay with the caller.
    pub fn execute_with_context(
        &mut self,
        graph: &Graph,
        context: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>> {
        let context_keys: BTreeSet<String> = context.keys().cloned().collect();
        let order = GraphResolver::new(self.registry).resolve(graph, &context_keys)?;

        let mut table: BTreeMap<String, Value> = context.clone();
        for id in &order {
            let vertex = graph.get(id).expect("ordered id came from this graph");
            let artifact = match vertex {
                Vertex::Op(op) => self.run_op(id, op, &table)?,
                Vertex::Sub(sub) => self.run_subgraph(id, sub, &table)?,
            };
            table.insert(id.clone(), artifact);
        }

        Ok(order
            .into_iter()
            .map(|id| {
                let artifact = table.remove(&id).expect("every ordered vertex ran");
                (id, artifact)
            })
            .collect())
    }

    fn run_op(
        &mut self,
        id: &str,
        vertex: &OpVertex,
        table: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        let scope = dependency_scope(id, vertex.deps(), table)?;
        let manifest = resolve_params(vertex.params(), &scope).map_err(|e| e.at_vertex(id))?;
        let digest = fingerprint(&manifest);
        let op_name = vertex.op_name();

        if vertex.cache() && self.store.exists(op_name, &digest).map_err(|e| e.at_vertex(id))? {
            debug!(vertex = id, op = op_name, %digest, "cache hit");
            return self.store.get(op_name, &digest).map_err(|e| e.at_vertex(id));
        }

        debug!(vertex = id, op = op_name, %digest, "cache miss, invoking");
        let op = self.registry.get(op_name).map_err(|e| e.at_vertex(id))?;
        let artifact = op
            .invoke(&OpArgs::new(op_name, &manifest))
            .map_err(|e| e.at_vertex(id))?;

        if vertex.cache() {
            self.store
                .put(op_name, &digest, &artifact)
                .map_err(|e| e.at_vertex(id))?;
        }
        Ok(artifact)
    }

    fn run_subgraph(
        &mut self,
        id: &str,
        vertex: &SubGraphVertex,
        table: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        let scope = dependency_scope(id, vertex.deps(), table)?;
        let inner_context =
            resolve_params(vertex.params(), &scope).map_err(|e| e.at_vertex(id))?;

        debug!(vertex = id, output = vertex.output(), "entering subgraph");
        let inner = self
            .execute_with_context(vertex.graph(), &inner_context)
            .map_err(|e| e.at_vertex(id))?;

        inner
            .get(vertex.output())
            .cloned()
            .ok_or_else(|| Error::SubGraphOutputMissing {
                output: vertex.output().to_string(),
            })
    }
}

/// The artifacts a vertex may see during resolution: exactly its declared
/// deps.
fn dependency_scope(
    id: &str,
    deps: &[String],
    table: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>> {
    let mut scope = BTreeMap::new();
    for dep in deps {
        let artifact = table.get(dep).ok_or_else(|| Error::MissingDependency {
            vertex: id.to_string(),
            dep: dep.clone(),
        })?;
        scope.insert(dep.clone(), artifact.clone());
    }
    Ok(scope)
}
