//! Parameter markers and resolution.
//!
//! Vertex parameters are authored as [`ParamValue`] trees. Markers are
//! erased by resolution and never reach a manifest: `Ref` substitutes the
//! artifact bound to a dependency, `Expr` evaluates in the restricted
//! expression language, literal strings containing `${…}` interpolate, and
//! containers recurse.

use std::collections::BTreeMap;

use crate::expr::{self, composite_value_field};
use crate::value::Value;
use crate::{Error, Result};

/// An authored parameter value: a literal, a marker, or a container of
/// further parameter values.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    /// A cacheable value, passed through (strings may interpolate).
    Literal(Value),
    /// Substituted by the upstream artifact bound to the named dependency.
    Ref(String),
    /// Evaluated as a restricted expression against the artifacts in scope.
    Expr(String),
    /// An ordered list of parameter values.
    Seq(Vec<ParamValue>),
    /// A string-keyed map of parameter values.
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// A `Ref` marker.
    pub fn reference(dep: impl Into<String>) -> Self {
        ParamValue::Ref(dep.into())
    }

    /// An `Expr` marker.
    pub fn expression(text: impl Into<String>) -> Self {
        ParamValue::Expr(text.into())
    }

    /// Collect every `Ref` target in this tree.
    pub(crate) fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ParamValue::Ref(name) => out.push(name),
            ParamValue::Seq(items) => {
                for item in items {
                    item.collect_refs(out);
                }
            }
            ParamValue::Map(entries) => {
                for item in entries.values() {
                    item.collect_refs(out);
                }
            }
            ParamValue::Literal(_) | ParamValue::Expr(_) => {}
        }
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        ParamValue::Literal(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Literal(Value::Int(v))
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Literal(Value::Str(v.to_string()))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Literal(Value::Bool(v))
    }
}

/// Resolve a parameter map against the artifacts in scope, producing the
/// manifest for a vertex.
///
/// Scope keys are the vertex's declared dependencies (and, for inner
/// graphs, the externally supplied context keys); values are the upstream
/// artifacts.
pub fn resolve_params(
    params: &BTreeMap<String, ParamValue>,
    scope: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>> {
    let mut resolved = BTreeMap::new();
    for (key, param) in params {
        resolved.insert(key.clone(), resolve_value(param, scope)?);
    }
    Ok(resolved)
}

fn resolve_value(param: &ParamValue, scope: &BTreeMap<String, Value>) -> Result<Value> {
    match param {
        ParamValue::Literal(value) => resolve_literal(value, scope),
        ParamValue::Ref(name) => scope.get(name).cloned().ok_or_else(|| {
            Error::UnknownDependency { name: name.clone() }
        }),
        ParamValue::Expr(text) => expr::evaluate(text, scope),
        ParamValue::Seq(items) => items
            .iter()
            .map(|item| resolve_value(item, scope))
            .collect::<Result<Vec<_>>>()
            .map(Value::Seq),
        ParamValue::Map(entries) => {
            let mut out = BTreeMap::new();
            for (key, item) in entries {
                out.insert(key.clone(), resolve_value(item, scope)?);
            }
            Ok(Value::Map(out))
        }
    }
}

// Literal containers are descended too: a `${…}` string stays live however
// deeply it is nested.
fn resolve_literal(value: &Value, scope: &BTreeMap<String, Value>) -> Result<Value> {
    match value {
        Value::Str(s) if s.contains("${") => interpolate(s, scope),
        Value::Seq(items) => items
            .iter()
            .map(|item| resolve_literal(item, scope))
            .collect::<Result<Vec<_>>>()
            .map(Value::Seq),
        Value::Tup(items) => items
            .iter()
            .map(|item| resolve_literal(item, scope))
            .collect::<Result<Vec<_>>>()
            .map(Value::Tup),
        Value::Map(entries) => {
            let mut out = BTreeMap::new();
            for (key, item) in entries {
                out.insert(key.clone(), resolve_literal(item, scope)?);
            }
            Ok(Value::Map(out))
        }
        other => Ok(other.clone()),
    }
}

/// Interpolate `${…}` segments in a string.
///
/// If the whole (trimmed) string is a single `${expr}`, the expression's
/// native type is preserved. Otherwise each segment is evaluated,
/// stringified, and substituted, yielding a string.
fn interpolate(text: &str, scope: &BTreeMap<String, Value>) -> Result<Value> {
    let trimmed = text.trim();
    if let Some(single) = single_segment(trimmed) {
        return expr::evaluate(single, scope);
    }

    let mut out = String::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| Error::ParseError {
            expr: text.to_string(),
            message: "unterminated `${`".to_string(),
        })?;
        let value = expr::evaluate(after[..end].trim(), scope)?;
        out.push_str(&stringify(&value, text)?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(Value::Str(out))
}

/// `Some(expr)` when the whole string is exactly one `${expr}`.
fn single_segment(trimmed: &str) -> Option<&str> {
    let inner = trimmed.strip_prefix("${")?.strip_suffix('}')?;
    // A second `${` or a stray `}` means more than one segment.
    if inner.contains('}') || inner.contains("${") {
        return None;
    }
    Some(inner.trim())
}

fn stringify(value: &Value, text: &str) -> Result<String> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Dec(d) => Ok(d.to_string()),
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::Null => Ok("null".to_string()),
        composite => match composite_value_field(composite) {
            Some(inner) => stringify(&inner, text),
            None => Err(Error::TypeMismatch {
                context: format!("interpolation in `{text}`"),
                message: format!("cannot stringify {}", composite.kind()),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn scope(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn params(entries: Vec<(&str, ParamValue)>) -> BTreeMap<String, ParamValue> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn refs_substitute_scope_artifacts() {
        let s = scope(&[("p", Value::Int(9))]);
        let resolved =
            resolve_params(&params(vec![("a", ParamValue::reference("p"))]), &s).unwrap();
        assert_eq!(resolved["a"], Value::Int(9));
    }

    #[test]
    fn unknown_ref_fails() {
        let err = resolve_params(
            &params(vec![("a", ParamValue::reference("ghost"))]),
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownDependency { name } if name == "ghost"));
    }

    #[test]
    fn expressions_evaluate_in_scope() {
        let s = scope(&[("x", Value::Int(2)), ("y", Value::Int(5))]);
        let resolved = resolve_params(
            &params(vec![("sum", ParamValue::expression("x + y"))]),
            &s,
        )
        .unwrap();
        assert_eq!(resolved["sum"], Value::Int(7));
    }

    #[test]
    fn whole_string_interpolation_preserves_type() {
        let s = scope(&[("x", Value::Int(2))]);
        let resolved = resolve_params(
            &params(vec![("n", ParamValue::from("${x * 3}"))]),
            &s,
        )
        .unwrap();
        assert_eq!(resolved["n"], Value::Int(6));
    }

    #[test]
    fn mixed_interpolation_yields_a_string() {
        let s = scope(&[
            ("w", Value::Int(144)),
            ("unit", Value::Str("px".to_string())),
        ]);
        let resolved = resolve_params(
            &params(vec![("label", ParamValue::from("${w}${unit} wide"))]),
            &s,
        )
        .unwrap();
        assert_eq!(resolved["label"], Value::Str("144px wide".to_string()));
    }

    #[test]
    fn interpolation_stringifies_decimals_canonically() {
        let s = scope(&[("d", Value::Dec(BigDecimal::from_str("0.750").unwrap()))]);
        let resolved = resolve_params(
            &params(vec![("label", ParamValue::from("d=${d}!"))]),
            &s,
        )
        .unwrap();
        assert_eq!(resolved["label"], Value::Str("d=0.750!".to_string()));
    }

    #[test]
    fn unterminated_segment_is_a_parse_error() {
        let err = resolve_params(
            &params(vec![("a", ParamValue::from("broken ${x"))]),
            &scope(&[("x", Value::Int(1))]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }

    #[test]
    fn strings_without_segments_pass_through() {
        let resolved = resolve_params(
            &params(vec![("a", ParamValue::from("plain text"))]),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(resolved["a"], Value::Str("plain text".to_string()));
    }

    #[test]
    fn nested_containers_resolve_recursively() {
        let s = scope(&[("x", Value::Int(1))]);
        let nested = ParamValue::Seq(vec![
            ParamValue::reference("x"),
            ParamValue::Map(params(vec![("inner", ParamValue::expression("x + 1"))])),
            ParamValue::from(42i64),
        ]);
        let resolved = resolve_params(&params(vec![("items", nested)]), &s).unwrap();
        let mut inner = BTreeMap::new();
        inner.insert("inner".to_string(), Value::Int(2));
        assert_eq!(
            resolved["items"],
            Value::Seq(vec![Value::Int(1), Value::Map(inner), Value::Int(42)])
        );
    }

    #[test]
    fn literal_containers_keep_interpolation_live() {
        let s = scope(&[("x", Value::Int(3))]);
        let literal = ParamValue::from(Value::Seq(vec![Value::Str("${x}".to_string())]));
        let resolved = resolve_params(&params(vec![("items", literal)]), &s).unwrap();
        assert_eq!(resolved["items"], Value::Seq(vec![Value::Int(3)]));
    }

    #[test]
    fn collect_refs_walks_the_tree() {
        let tree = ParamValue::Map(params(vec![
            ("a", ParamValue::reference("p")),
            (
                "b",
                ParamValue::Seq(vec![ParamValue::reference("q"), ParamValue::from(1i64)]),
            ),
        ]));
        let mut refs = Vec::new();
        tree.collect_refs(&mut refs);
        refs.sort_unstable();
        assert_eq!(refs, vec!["p", "q"]);
    }
}
