//! End-to-end polynomial pipeline: distributive law, evaluation, and
//! derivatives over the `poly:` package.

use std::collections::BTreeMap;

use invariant::poly::{self, Polynomial};
use invariant::prelude::*;

fn params(entries: Vec<(&str, ParamValue)>) -> BTreeMap<String, ParamValue> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn coefficients(values: &[i64]) -> ParamValue {
    ParamValue::from(Value::Seq(
        values.iter().map(|&c| Value::Int(c)).collect(),
    ))
}

fn from_coefficients(values: &[i64]) -> OpVertex {
    OpVertex::new(
        "poly:from_coefficients",
        params(vec![("coefficients", coefficients(values))]),
        Vec::<String>::new(),
    )
    .unwrap()
}

fn binary(op: &str, a: &str, b: &str) -> OpVertex {
    OpVertex::new(
        op,
        params(vec![
            ("a", ParamValue::reference(a)),
            ("b", ParamValue::reference(b)),
        ]),
        [a, b],
    )
    .unwrap()
}

fn unary(op: &str, input: &str) -> OpVertex {
    OpVertex::new(
        op,
        params(vec![("poly", ParamValue::reference(input))]),
        [input],
    )
    .unwrap()
}

fn evaluate_at(input: &str, x: i64) -> OpVertex {
    OpVertex::new(
        "poly:evaluate",
        params(vec![
            ("poly", ParamValue::reference(input)),
            ("x", ParamValue::from(x)),
        ]),
        [input],
    )
    .unwrap()
}

fn as_poly(value: &Value) -> Polynomial {
    match value {
        Value::Domain(d) => d
            .downcast_ref::<Polynomial>()
            .expect("artifact is a polynomial")
            .clone(),
        other => panic!("expected a polynomial artifact, got {other:?}"),
    }
}

#[test]
fn distributive_law_holds_across_the_graph() {
    let mut registry = OpRegistry::new();
    registry.register_package("poly", poly::package()).unwrap();

    let graph = Graph::new()
        .with_vertex("p", from_coefficients(&[1, 2, 1]))
        .with_vertex("q", from_coefficients(&[3, 0, -1]))
        .with_vertex("r", from_coefficients(&[1, 1]))
        .with_vertex("p_plus_q", binary("poly:add", "p", "q"))
        .with_vertex("lhs", binary("poly:multiply", "p_plus_q", "r"))
        .with_vertex("p_times_r", binary("poly:multiply", "p", "r"))
        .with_vertex("q_times_r", binary("poly:multiply", "q", "r"))
        .with_vertex("rhs", binary("poly:add", "p_times_r", "q_times_r"))
        .with_vertex("lhs_at_5", evaluate_at("lhs", 5))
        .with_vertex("rhs_at_5", evaluate_at("rhs", 5))
        .with_vertex("d1", unary("poly:derivative", "lhs"))
        .with_vertex("d2", unary("poly:derivative", "d1"))
        .with_vertex("d2_at_5", evaluate_at("d2", 5));

    let mut store = MemoryStore::new();
    let results = Executor::new(&registry, &mut store).execute(&graph).unwrap();

    // (p + q) * r == p*r + q*r == 4 + 6x + 2x^2
    assert_eq!(results["lhs"], results["rhs"]);
    assert_eq!(as_poly(&results["lhs"]).coefficients(), &[4, 6, 2]);

    assert_eq!(results["lhs_at_5"], Value::Int(84));
    assert_eq!(results["rhs_at_5"], Value::Int(84));

    // d²/dx² (4 + 6x + 2x²) = 4, everywhere.
    assert_eq!(as_poly(&results["d2"]).coefficients(), &[4]);
    assert_eq!(results["d2_at_5"], Value::Int(4));
}

#[test]
fn equal_polynomials_from_different_branches_share_cache_slots() {
    let mut registry = OpRegistry::new();
    registry.register_package("poly", poly::package()).unwrap();

    // Both evaluation vertices read polynomials that are structurally equal,
    // so the second `evaluate` manifest hits the slot the first one filled.
    let graph = Graph::new()
        .with_vertex("p", from_coefficients(&[1, 2, 1]))
        .with_vertex("q", from_coefficients(&[3, 0, -1]))
        .with_vertex("r", from_coefficients(&[1, 1]))
        .with_vertex("p_plus_q", binary("poly:add", "p", "q"))
        .with_vertex("lhs", binary("poly:multiply", "p_plus_q", "r"))
        .with_vertex("p_times_r", binary("poly:multiply", "p", "r"))
        .with_vertex("q_times_r", binary("poly:multiply", "q", "r"))
        .with_vertex("rhs", binary("poly:add", "p_times_r", "q_times_r"))
        .with_vertex("lhs_at_5", evaluate_at("lhs", 5))
        .with_vertex("rhs_at_5", evaluate_at("rhs", 5));

    let mut store = MemoryStore::unbounded();
    let results = Executor::new(&registry, &mut store).execute(&graph).unwrap();

    assert_eq!(results["lhs_at_5"], results["rhs_at_5"]);
    // `rhs_at_5` resolves to the same manifest as `lhs_at_5`.
    assert!(store.stats().hits >= 1);
}

#[test]
fn scaled_sum_equals_distributed_scale() {
    let mut registry = OpRegistry::new();
    registry.register_package("poly", poly::package()).unwrap();

    let scale = |input: &str, k: i64| {
        OpVertex::new(
            "poly:scale",
            params(vec![
                ("poly", ParamValue::reference(input)),
                ("scalar", ParamValue::from(k)),
            ]),
            [input],
        )
        .unwrap()
    };

    let graph = Graph::new()
        .with_vertex("p", from_coefficients(&[1, 2]))
        .with_vertex("q", from_coefficients(&[0, 0, 3]))
        .with_vertex("sum", binary("poly:add", "p", "q"))
        .with_vertex("scaled_sum", scale("sum", 4))
        .with_vertex("p_scaled", scale("p", 4))
        .with_vertex("q_scaled", scale("q", 4))
        .with_vertex("sum_of_scaled", binary("poly:add", "p_scaled", "q_scaled"));

    let mut store = NullStore::new();
    let results = Executor::new(&registry, &mut store).execute(&graph).unwrap();

    assert_eq!(results["scaled_sum"], results["sum_of_scaled"]);
    assert_eq!(as_poly(&results["scaled_sum"]).coefficients(), &[4, 8, 12]);
}
