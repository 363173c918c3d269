//! Polynomial distributive-law pipeline.
//!
//! Computes `(p + q) * r` and `p*r + q*r` as two branches of one graph and
//! checks they produce the same polynomial, then evaluates both at `x = 5`
//! and takes a second derivative. Every intermediate is content-addressed,
//! so re-running the program against a warm store replays without invoking
//! any operation.

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

fn binary(op: &str, a: &str, b: &str) -> invariant::Result<OpVertex> {
    OpVertex::new(
        op,
        params(vec![
            ("a", ParamValue::reference(a)),
            ("b", ParamValue::reference(b)),
        ]),
        [a, b],
    )
}

fn main() -> invariant::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut registry = OpRegistry::new();
    registry.register_package("poly", poly::package())?;

    // p = 1 + 2x + x^2, q = 3 - x^2, r = 1 + x
    let graph = Graph::new()
        .with_vertex(
            "p",
            OpVertex::new(
                "poly:from_coefficients",
                params(vec![("coefficients", coefficients(&[1, 2, 1]))]),
                Vec::<String>::new(),
            )?,
        )
        .with_vertex(
            "q",
            OpVertex::new(
                "poly:from_coefficients",
                params(vec![("coefficients", coefficients(&[3, 0, -1]))]),
                Vec::<String>::new(),
            )?,
        )
        .with_vertex(
            "r",
            OpVertex::new(
                "poly:from_coefficients",
                params(vec![("coefficients", coefficients(&[1, 1]))]),
                Vec::<String>::new(),
            )?,
        )
        .with_vertex("p_plus_q", binary("poly:add", "p", "q")?)
        .with_vertex("lhs", binary("poly:multiply", "p_plus_q", "r")?)
        .with_vertex("p_times_r", binary("poly:multiply", "p", "r")?)
        .with_vertex("q_times_r", binary("poly:multiply", "q", "r")?)
        .with_vertex("rhs", binary("poly:add", "p_times_r", "q_times_r")?)
        .with_vertex(
            "lhs_at_5",
            OpVertex::new(
                "poly:evaluate",
                params(vec![
                    ("poly", ParamValue::reference("lhs")),
                    ("x", ParamValue::from(5i64)),
                ]),
                ["lhs"],
            )?,
        )
        .with_vertex(
            "first_derivative",
            OpVertex::new(
                "poly:derivative",
                params(vec![("poly", ParamValue::reference("lhs"))]),
                ["lhs"],
            )?,
        )
        .with_vertex(
            "second_derivative",
            OpVertex::new(
                "poly:derivative",
                params(vec![("poly", ParamValue::reference("first_derivative"))]),
                ["first_derivative"],
            )?,
        )
        .with_vertex(
            "second_derivative_at_5",
            OpVertex::new(
                "poly:evaluate",
                params(vec![
                    ("poly", ParamValue::reference("second_derivative")),
                    ("x", ParamValue::from(5i64)),
                ]),
                ["second_derivative"],
            )?,
        );

    let mut store = MemoryStore::new();
    let results = Executor::new(&registry, &mut store).execute(&graph)?;

    let lhs = match &results["lhs"] {
        Value::Domain(d) => d.downcast_ref::<Polynomial>().expect("poly artifact").clone(),
        other => panic!("unexpected artifact {other:?}"),
    };

    println!("(p + q) * r       = {:?}", lhs.coefficients());
    println!("p*r + q*r         = {:?}", results["rhs"]);
    println!("value at x=5      = {:?}", results["lhs_at_5"]);
    println!("d²/dx² at x=5     = {:?}", results["second_derivative_at_5"]);

    assert_eq!(results["lhs"], results["rhs"]);
    assert_eq!(lhs.coefficients(), &[4, 6, 2]);
    assert_eq!(results["lhs_at_5"], Value::Int(84));
    assert_eq!(results["second_derivative_at_5"], Value::Int(4));

    println!("distributive law holds, and both branches share cached factors");
    Ok(())
}
