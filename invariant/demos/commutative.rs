//! Commutative canonicalization walk-through.
//!
//! Two vertices compute `x + y` with their operands written in opposite
//! orders. Because both canonicalize through `min`/`max`, they resolve to
//! the same manifest `{a: 3, b: 7}`, share one cache slot, and the `add`
//! operation runs exactly once.
//!
//! Run with `RUST_LOG=debug` to watch the per-vertex hit/miss decisions.

use std::collections::BTreeMap;

use invariant::ops;
use invariant::prelude::*;

fn params(entries: Vec<(&str, ParamValue)>) -> BTreeMap<String, ParamValue> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn main() -> invariant::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut registry = OpRegistry::new();
    registry.register_package("stdlib", ops::package())?;

    let graph = Graph::new()
        .with_vertex(
            "x",
            OpVertex::new(
                "stdlib:identity",
                params(vec![("value", ParamValue::from(7i64))]),
                Vec::<String>::new(),
            )?,
        )
        .with_vertex(
            "y",
            OpVertex::new(
                "stdlib:identity",
                params(vec![("value", ParamValue::from(3i64))]),
                Vec::<String>::new(),
            )?,
        )
        .with_vertex(
            "sum_xy",
            OpVertex::new(
                "stdlib:add",
                params(vec![
                    ("a", ParamValue::expression("min(x, y)")),
                    ("b", ParamValue::expression("max(x, y)")),
                ]),
                ["x", "y"],
            )?,
        )
        .with_vertex(
            "sum_yx",
            OpVertex::new(
                "stdlib:add",
                params(vec![
                    ("a", ParamValue::expression("min(y, x)")),
                    ("b", ParamValue::expression("max(y, x)")),
                ]),
                ["x", "y"],
            )?,
        );

    let mut store = MemoryStore::new();
    let results = Executor::new(&registry, &mut store).execute(&graph)?;

    println!("sum_xy = {:?}", results["sum_xy"]);
    println!("sum_yx = {:?}", results["sum_yx"]);
    println!("store stats: {:?}", store.stats());

    assert_eq!(results["sum_xy"], Value::Int(10));
    assert_eq!(results["sum_yx"], Value::Int(10));
    // Four lookups: x, y, and the first `add` miss; the second `add` hits.
    assert_eq!(store.stats().hits, 1);
    assert_eq!(store.stats().puts, 3);

    println!("the second add vertex was served from cache — one execution, two consumers");
    Ok(())
}
