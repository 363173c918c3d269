//! Vertex definitions.
//!
//! A vertex either names a registered operation ([`OpVertex`]) or expands
//! into an inner graph ([`SubGraphVertex`]). Both are immutable once
//! constructed; construction is where `Ref` markers are checked against the
//! declared deps, so an undeclared reference never reaches execution.

use std::collections::BTreeMap;

use crate::graph::Graph;
use crate::params::ParamValue;
use crate::{Error, Result};

/// A primitive vertex: one operation invocation.
#[derive(Clone, Debug)]
pub struct OpVertex {
    op_name: String,
    params: BTreeMap<String, ParamValue>,
    deps: Vec<String>,
    cache: bool,
}

impl OpVertex {
    /// Build a vertex, validating that every `Ref` in `params` names a
    /// declared dep.
    pub fn new<S: Into<String>>(
        op_name: impl Into<String>,
        params: BTreeMap<String, ParamValue>,
        deps: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let deps: Vec<String> = deps.into_iter().map(Into::into).collect();
        validate_refs(&params, &deps)?;
        Ok(Self {
            op_name: op_name.into(),
            params,
            deps,
            cache: true,
        })
    }

    /// Force execution and suppress persistence for this vertex.
    pub fn uncached(mut self) -> Self {
        self.cache = false;
        self
    }

    /// The operation this vertex invokes.
    pub fn op_name(&self) -> &str {
        &self.op_name
    }

    /// The authored parameter map.
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// The declared upstream dependencies.
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    /// Whether results may be served from and persisted to the store.
    pub fn cache(&self) -> bool {
        self.cache
    }
}

/// A vertex whose work is an inner graph, executed with the vertex's
/// resolved params as external context.
#[derive(Clone, Debug)]
pub struct SubGraphVertex {
    params: BTreeMap<String, ParamValue>,
    deps: Vec<String>,
    graph: Graph,
    output: String,
}

impl SubGraphVertex {
    /// Build a subgraph vertex, validating `Ref`s against `deps` and the
    /// declared output against the inner graph.
    pub fn new<S: Into<String>>(
        params: BTreeMap<String, ParamValue>,
        deps: impl IntoIterator<Item = S>,
        graph: Graph,
        output: impl Into<String>,
    ) -> Result<Self> {
        let deps: Vec<String> = deps.into_iter().map(Into::into).collect();
        validate_refs(&params, &deps)?;
        let output = output.into();
        if !graph.contains(&output) {
            return Err(Error::SubGraphOutputMissing { output });
        }
        Ok(Self {
            params,
            deps,
            graph,
            output,
        })
    }

    /// The authored parameter map, resolved into the inner context.
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// The declared upstream dependencies.
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    /// The inner graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The inner vertex whose artifact becomes this vertex's result.
    pub fn output(&self) -> &str {
        &self.output
    }
}

/// Either kind of vertex.
#[derive(Clone, Debug)]
pub enum Vertex {
    /// A primitive operation vertex.
    Op(OpVertex),
    /// A subgraph vertex.
    Sub(SubGraphVertex),
}

impl Vertex {
    /// The declared upstream dependencies.
    pub fn deps(&self) -> &[String] {
        match self {
            Vertex::Op(v) => v.deps(),
            Vertex::Sub(v) => v.deps(),
        }
    }

    /// The authored parameter map.
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        match self {
            Vertex::Op(v) => v.params(),
            Vertex::Sub(v) => v.params(),
        }
    }
}

impl From<OpVertex> for Vertex {
    fn from(v: OpVertex) -> Self {
        Vertex::Op(v)
    }
}

impl From<SubGraphVertex> for Vertex {
    fn from(v: SubGraphVertex) -> Self {
        Vertex::Sub(v)
    }
}

fn validate_refs(params: &BTreeMap<String, ParamValue>, deps: &[String]) -> Result<()> {
    let mut refs = Vec::new();
    for param in params.values() {
        param.collect_refs(&mut refs);
    }
    for name in refs {
        if !deps.iter().any(|d| d == name) {
            return Err(Error::UndeclaredReference {
                name: name.to_string(),
                declared: deps.to_vec(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn params(entries: Vec<(&str, ParamValue)>) -> BTreeMap<String, ParamValue> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn declared_refs_are_accepted() {
        let vertex = OpVertex::new(
            "stdlib:add",
            params(vec![
                ("a", ParamValue::reference("p")),
                ("b", ParamValue::from(1i64)),
            ]),
            ["p"],
        )
        .unwrap();
        assert_eq!(vertex.op_name(), "stdlib:add");
        assert!(vertex.cache());
    }

    #[test]
    fn undeclared_ref_fails_at_construction() {
        let err = OpVertex::new(
            "stdlib:identity",
            params(vec![("x", ParamValue::reference("y"))]),
            ["z"],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::UndeclaredReference { name, declared }
                if name == "y" && declared == vec!["z".to_string()]
        ));
    }

    #[test]
    fn nested_undeclared_ref_is_found() {
        let nested = ParamValue::Seq(vec![ParamValue::Map(params(vec![(
            "deep",
            ParamValue::reference("ghost"),
        )]))]);
        let err = OpVertex::new("op", params(vec![("v", nested)]), Vec::<String>::new())
            .unwrap_err();
        assert!(matches!(err, Error::UndeclaredReference { .. }));
    }

    #[test]
    fn uncached_suppresses_persistence() {
        let vertex = OpVertex::new("op", BTreeMap::new(), Vec::<String>::new())
            .unwrap()
            .uncached();
        assert!(!vertex.cache());
    }

    #[test]
    fn subgraph_output_must_name_an_inner_vertex() {
        let inner = Graph::new().with_vertex(
            "a",
            OpVertex::new("op", BTreeMap::new(), Vec::<String>::new()).unwrap(),
        );
        let err = SubGraphVertex::new(BTreeMap::new(), Vec::<String>::new(), inner, "missing")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SubGraphOutputMissing { output } if output == "missing"
        ));
    }

    #[test]
    fn subgraph_refs_check_outer_deps() {
        let inner = Graph::new().with_vertex(
            "a",
            OpVertex::new("op", BTreeMap::new(), Vec::<String>::new()).unwrap(),
        );
        let err = SubGraphVertex::new(
            params(vec![("value", ParamValue::reference("y"))]),
            ["x"],
            inner,
            "a",
        )
        .unwrap_err();
        assert!(matches!(err, Error::UndeclaredReference { .. }));
    }

    #[test]
    fn literal_params_need_no_deps() {
        let vertex = OpVertex::new(
            "op",
            params(vec![("v", ParamValue::from(Value::Null))]),
            Vec::<String>::new(),
        );
        assert!(vertex.is_ok());
    }
}
