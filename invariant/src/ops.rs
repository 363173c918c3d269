//! The `stdlib:` operation package.
//!
//! Small data-plumbing operations: identity, integer arithmetic, map
//! access, and container construction. `make_dict` is variadic-by-name —
//! it collects the whole manifest — which is the usual way to assemble a
//! composite artifact out of `Ref`/`Expr` parameters.

use std::sync::Arc;

use invariant_core::registry::{OpArgs, OpPackage, Operation};
use invariant_core::value::Value;
use invariant_core::{Error, Result};

fn identity(args: &OpArgs<'_>) -> Result<Value> {
    Ok(args.required("value")?.clone())
}

fn add(args: &OpArgs<'_>) -> Result<Value> {
    let a = args.int("a")?;
    let b = args.int("b")?;
    a.checked_add(b)
        .map(Value::Int)
        .ok_or_else(|| overflow(args.op_name()))
}

fn multiply(args: &OpArgs<'_>) -> Result<Value> {
    let a = args.int("a")?;
    let b = args.int("b")?;
    a.checked_mul(b)
        .map(Value::Int)
        .ok_or_else(|| overflow(args.op_name()))
}

fn dict_get(args: &OpArgs<'_>) -> Result<Value> {
    let map = args.map("map")?;
    let key = args.text("key")?;
    map.get(key).cloned().ok_or_else(|| Error::TypeMismatch {
        context: format!("{}.key", args.op_name()),
        message: format!("map has no key `{key}`"),
    })
}

fn make_dict(args: &OpArgs<'_>) -> Result<Value> {
    Ok(Value::Map(
        args.entries()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    ))
}

fn make_list(args: &OpArgs<'_>) -> Result<Value> {
    Ok(Value::Seq(args.items("items")?.to_vec()))
}

fn overflow(op: &str) -> Error {
    Error::TypeMismatch {
        context: op.to_string(),
        message: "integer overflow".to_string(),
    }
}

/// The `stdlib:` operation package.
pub fn package() -> OpPackage {
    vec![
        ("identity", Arc::new(identity) as Arc<dyn Operation>),
        ("add", Arc::new(add) as Arc<dyn Operation>),
        ("multiply", Arc::new(multiply) as Arc<dyn Operation>),
        ("dict_get", Arc::new(dict_get) as Arc<dyn Operation>),
        ("make_dict", Arc::new(make_dict) as Arc<dyn Operation>),
        ("make_list", Arc::new(make_list) as Arc<dyn Operation>),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn manifest(entries: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn identity_returns_its_input() {
        let m = manifest(vec![("value", Value::Str("same".to_string()))]);
        let out = identity(&OpArgs::new("stdlib:identity", &m)).unwrap();
        assert_eq!(out, Value::Str("same".to_string()));
    }

    #[test]
    fn add_and_multiply() {
        let m = manifest(vec![("a", Value::Int(3)), ("b", Value::Int(7))]);
        assert_eq!(add(&OpArgs::new("stdlib:add", &m)).unwrap(), Value::Int(10));
        assert_eq!(
            multiply(&OpArgs::new("stdlib:multiply", &m)).unwrap(),
            Value::Int(21)
        );
    }

    #[test]
    fn add_reports_overflow() {
        let m = manifest(vec![("a", Value::Int(i64::MAX)), ("b", Value::Int(1))]);
        assert!(matches!(
            add(&OpArgs::new("stdlib:add", &m)).unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn dict_get_extracts_and_reports_missing_keys() {
        let mut inner = BTreeMap::new();
        inner.insert("width".to_string(), Value::Int(144));
        let m = manifest(vec![
            ("map", Value::Map(inner)),
            ("key", Value::Str("width".to_string())),
        ]);
        assert_eq!(
            dict_get(&OpArgs::new("stdlib:dict_get", &m)).unwrap(),
            Value::Int(144)
        );

        let m = manifest(vec![
            ("map", Value::Map(BTreeMap::new())),
            ("key", Value::Str("width".to_string())),
        ]);
        assert!(matches!(
            dict_get(&OpArgs::new("stdlib:dict_get", &m)).unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn make_dict_collects_the_whole_manifest() {
        let m = manifest(vec![
            ("width", Value::Int(144)),
            ("color", Value::Str("#ff0000".to_string())),
        ]);
        let out = make_dict(&OpArgs::new("stdlib:make_dict", &m)).unwrap();
        assert_eq!(out, Value::Map(m));
    }

    #[test]
    fn make_list_passes_items_through() {
        let m = manifest(vec![(
            "items",
            Value::Seq(vec![Value::Int(1), Value::Null]),
        )]);
        let out = make_list(&OpArgs::new("stdlib:make_list", &m)).unwrap();
        assert_eq!(out, Value::Seq(vec![Value::Int(1), Value::Null]));
    }

    #[test]
    fn package_registers_under_prefix() {
        let mut registry = invariant_core::registry::OpRegistry::new();
        registry.register_package("stdlib", package()).unwrap();
        assert!(registry.has("stdlib:identity"));
        assert!(registry.has("stdlib:make_dict"));
        assert!(!registry.has("identity"));
    }
}
