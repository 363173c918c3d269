//! Graph container and resolver.
//!
//! A [`Graph`] maps vertex ids to vertices. The [`GraphResolver`] checks
//! that every declared dependency exists in the graph or the external
//! context, that every named operation is registered, and that the in-graph
//! dependency relation is acyclic (three-color DFS); it then produces a
//! topological order with Kahn's algorithm. Context edges participate in
//! dependency validation but never in cycle detection.
//!
//! Tie-breaking in the returned order follows `BTreeMap` key order. That is
//! deterministic for reproducible diagnostics but not part of the contract;
//! callers may rely only on dependencies preceding dependents.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::registry::OpRegistry;
use crate::vertex::Vertex;
use crate::{Error, Result};

/// An immutable mapping from vertex id to vertex.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    vertices: BTreeMap<String, Vertex>,
}

impl Graph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex, builder-style. Replaces any vertex under the same id.
    pub fn with_vertex(mut self, id: impl Into<String>, vertex: impl Into<Vertex>) -> Self {
        self.vertices.insert(id.into(), vertex.into());
        self
    }

    /// Add a vertex in place.
    pub fn insert(&mut self, id: impl Into<String>, vertex: impl Into<Vertex>) {
        self.vertices.insert(id.into(), vertex.into());
    }

    /// Look up a vertex by id.
    pub fn get(&self, id: &str) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    /// Whether the graph holds a vertex under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.vertices.contains_key(id)
    }

    /// Vertex ids in key order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.vertices.keys().map(String::as_str)
    }

    /// `(id, vertex)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vertex)> {
        self.vertices.iter()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

impl FromIterator<(String, Vertex)> for Graph {
    fn from_iter<I: IntoIterator<Item = (String, Vertex)>>(iter: I) -> Self {
        Self {
            vertices: iter.into_iter().collect(),
        }
    }
}

/// Validates graphs and produces topological orders.
#[derive(Clone, Copy, Debug)]
pub struct GraphResolver<'r> {
    registry: Option<&'r OpRegistry>,
}

impl<'r> GraphResolver<'r> {
    /// A resolver that also checks operation names against `registry`.
    pub fn new(registry: &'r OpRegistry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    /// A resolver that skips operation-name checks.
    pub fn unchecked() -> GraphResolver<'static> {
        GraphResolver { registry: None }
    }

    /// Validate `graph` against the registry and the external context keys.
    ///
    /// Subgraph inner graphs are validated recursively, with the subgraph's
    /// parameter names as the inner context keys.
    pub fn validate(&self, graph: &Graph, context: &BTreeSet<String>) -> Result<()> {
        for (id, vertex) in graph.iter() {
            for dep in vertex.deps() {
                if !graph.contains(dep) && !context.contains(dep) {
                    return Err(Error::MissingDependency {
                        vertex: id.clone(),
                        dep: dep.clone(),
                    });
                }
            }
            match vertex {
                Vertex::Op(op) => {
                    if let Some(registry) = self.registry {
                        if !registry.has(op.op_name()) {
                            return Err(Error::UnknownOperation {
                                vertex: id.clone(),
                                op_name: op.op_name().to_string(),
                            });
                        }
                    }
                }
                Vertex::Sub(sub) => {
                    let inner_context: BTreeSet<String> =
                        sub.params().keys().cloned().collect();
                    self.validate(sub.graph(), &inner_context)
                        .map_err(|e| e.at_vertex(id))?;
                }
            }
        }
        detect_cycle(graph)
    }

    /// Topological order over in-graph edges (Kahn's algorithm).
    pub fn topological_order(&self, graph: &Graph) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = graph.ids().map(|id| (id, 0)).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> =
            graph.ids().map(|id| (id, Vec::new())).collect();

        for (id, vertex) in graph.iter() {
            for dep in vertex.deps() {
                if graph.contains(dep) {
                    *in_degree.get_mut(id.as_str()).expect("known id") += 1;
                    dependents
                        .get_mut(dep.as_str())
                        .expect("validated dep")
                        .push(id);
                }
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(graph.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            for &dependent in &dependents[id] {
                let degree = in_degree.get_mut(dependent).expect("known id");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != graph.len() {
            let stuck = in_degree
                .iter()
                .find(|&(_, &degree)| degree > 0)
                .map(|(&id, _)| id.to_string())
                .unwrap_or_default();
            return Err(Error::CycleDetected { vertex: stuck });
        }

        Ok(order)
    }

    /// Validate, then sort.
    pub fn resolve(&self, graph: &Graph, context: &BTreeSet<String>) -> Result<Vec<String>> {
        self.validate(graph, context)?;
        self.topological_order(graph)
    }
}

/// Three-color DFS over in-graph edges, iterative so deep graphs cannot
/// overflow the call stack.
fn detect_cycle(graph: &Graph) -> Result<()> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: BTreeMap<&str, Color> = graph.ids().map(|id| (id, Color::White)).collect();

    for start in graph.ids() {
        if color[start] != Color::White {
            continue;
        }
        color.insert(start, Color::Gray);
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

        while let Some(&(id, idx)) = stack.last() {
            let deps = graph.get(id).expect("stacked id exists").deps();
            if idx >= deps.len() {
                color.insert(id, Color::Black);
                stack.pop();
                continue;
            }
            stack.last_mut().expect("non-empty").1 += 1;

            let dep = deps[idx].as_str();
            if !graph.contains(dep) {
                // Context edge: never part of a cycle.
                continue;
            }
            match color[dep] {
                Color::Gray => {
                    return Err(Error::CycleDetected {
                        vertex: dep.to_string(),
                    })
                }
                Color::White => {
                    color.insert(dep, Color::Gray);
                    stack.push((dep, 0));
                }
                Color::Black => {}
            }
        }
    }

    Ok(())
}
