//! Graph JSON wire format.
//!
//! A versioned envelope carrying vertices keyed by id. Parameter markers
//! and non-JSON-native values encode as single-key objects:
//!
//! | form | meaning |
//! |------|---------|
//! | `{"$ref": "p"}` | dependency reference |
//! | `{"$cel": "min(x, y)"}` | expression |
//! | `{"$decimal": "3.14"}` | decimal literal |
//! | `{"$tuple": [...]}` | tuple literal |
//! | `{"$domain": {"type": ..., "payload_b64": ...}}` | domain value |
//! | `{"$literal": {...}}` | escape for plain maps that collide |
//!
//! Bare JSON numbers must be integers: a fractional number is
//! `FloatForbidden`, never silently truncated. Decoding domain payloads
//! goes through the caller's [`DomainRegistry`].

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bigdecimal::BigDecimal;
use serde_json::{json, Map as JsonMap, Value as Json};

use invariant_core::codec::{DomainRegistry, Reader};
use invariant_core::params::ParamValue;
use invariant_core::value::Value;
use invariant_core::vertex::{OpVertex, SubGraphVertex, Vertex};
use invariant_core::{Error, Graph, Result};

/// Envelope format identifier.
pub const FORMAT_ID: &str = "invariant-graph";
/// Supported envelope version.
pub const FORMAT_VERSION: u64 = 1;

const RESERVED_KEYS: [&str; 6] = ["$ref", "$cel", "$decimal", "$tuple", "$literal", "$domain"];

/// Encode a graph to its JSON envelope.
pub fn to_json(graph: &Graph) -> Json {
    json!({
        "format": FORMAT_ID,
        "version": FORMAT_VERSION,
        "vertices": encode_vertices(graph),
    })
}

/// Encode a graph to pretty-printed JSON text.
pub fn to_string_pretty(graph: &Graph) -> String {
    serde_json::to_string_pretty(&to_json(graph)).expect("JSON tree always serializes")
}

/// Decode a graph from its JSON envelope.
pub fn from_json(envelope: &Json, domains: &DomainRegistry) -> Result<Graph> {
    let object = envelope
        .as_object()
        .ok_or_else(|| corrupt("envelope is not an object"))?;

    match object.get("format").and_then(Json::as_str) {
        Some(FORMAT_ID) => {}
        _ => return Err(corrupt("envelope format is not `invariant-graph`")),
    }
    match object.get("version").and_then(Json::as_u64) {
        Some(FORMAT_VERSION) => {}
        Some(other) => return Err(corrupt(format!("unsupported envelope version {other}"))),
        None => return Err(corrupt("envelope version missing")),
    }

    let vertices = object
        .get("vertices")
        .and_then(Json::as_object)
        .ok_or_else(|| corrupt("envelope `vertices` is not an object"))?;
    decode_vertices(vertices, domains)
}

/// Decode a graph from JSON text.
pub fn from_str(text: &str, domains: &DomainRegistry) -> Result<Graph> {
    let envelope: Json =
        serde_json::from_str(text).map_err(|e| corrupt(format!("invalid JSON: {e}")))?;
    from_json(&envelope, domains)
}

fn encode_vertices(graph: &Graph) -> Json {
    let mut out = JsonMap::new();
    for (id, vertex) in graph.iter() {
        out.insert(id.clone(), encode_vertex(vertex));
    }
    Json::Object(out)
}

fn encode_vertex(vertex: &Vertex) -> Json {
    match vertex {
        Vertex::Op(op) => {
            let mut object = JsonMap::new();
            object.insert("kind".to_string(), json!("op"));
            object.insert("op_name".to_string(), json!(op.op_name()));
            object.insert("params".to_string(), encode_params(op.params()));
            object.insert("deps".to_string(), json!(op.deps()));
            if !op.cache() {
                object.insert("cache".to_string(), json!(false));
            }
            Json::Object(object)
        }
        Vertex::Sub(sub) => json!({
            "kind": "subgraph",
            "params": encode_params(sub.params()),
            "deps": sub.deps(),
            "graph": encode_vertices(sub.graph()),
            "output": sub.output(),
        }),
    }
}

fn encode_params(params: &BTreeMap<String, ParamValue>) -> Json {
    let mut out = JsonMap::new();
    for (key, value) in params {
        out.insert(key.clone(), encode_param(value));
    }
    Json::Object(out)
}

fn encode_param(param: &ParamValue) -> Json {
    match param {
        ParamValue::Ref(dep) => json!({ "$ref": dep }),
        ParamValue::Expr(text) => json!({ "$cel": text }),
        ParamValue::Literal(value) => encode_literal(value),
        ParamValue::Seq(items) => Json::Array(items.iter().map(encode_param).collect()),
        ParamValue::Map(entries) => {
            let mut out = JsonMap::new();
            for (key, value) in entries {
                out.insert(key.clone(), encode_param(value));
            }
            escape_collisions(out)
        }
    }
}

fn encode_literal(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Str(s) => json!(s),
        Value::Dec(d) => json!({ "$decimal": d.to_string() }),
        Value::Seq(items) => Json::Array(items.iter().map(encode_literal).collect()),
        Value::Tup(items) => json!({
            "$tuple": items.iter().map(encode_literal).collect::<Vec<_>>()
        }),
        Value::Map(entries) => {
            let mut out = JsonMap::new();
            for (key, item) in entries {
                out.insert(key.clone(), encode_literal(item));
            }
            escape_collisions(out)
        }
        Value::Domain(d) => {
            let mut payload = Vec::new();
            d.encode(&mut payload);
            json!({
                "$domain": {
                    "type": d.type_name(),
                    "payload_b64": BASE64.encode(payload),
                }
            })
        }
    }
}

/// A plain single-entry map whose key is reserved would decode as a marker;
/// wrap it in `$literal`.
fn escape_collisions(object: JsonMap<String, Json>) -> Json {
    if object.len() == 1 {
        let key = object.keys().next().expect("one entry");
        if RESERVED_KEYS.contains(&key.as_str()) {
            return json!({ "$literal": Json::Object(object) });
        }
    }
    Json::Object(object)
}

fn decode_vertices(vertices: &JsonMap<String, Json>, domains: &DomainRegistry) -> Result<Graph> {
    let mut graph = Graph::new();
    for (id, vertex) in vertices {
        graph.insert(id.clone(), decode_vertex(id, vertex, domains)?);
    }
    Ok(graph)
}

fn decode_vertex(id: &str, vertex: &Json, domains: &DomainRegistry) -> Result<Vertex> {
    let object = vertex
        .as_object()
        .ok_or_else(|| corrupt(format!("vertex `{id}` is not an object")))?;

    let params = match object.get("params") {
        Some(Json::Object(entries)) => decode_params(entries, domains)?,
        Some(_) => return Err(corrupt(format!("vertex `{id}` params is not an object"))),
        None => BTreeMap::new(),
    };
    let deps = decode_deps(id, object.get("deps"))?;

    match object.get("kind").and_then(Json::as_str) {
        Some("op") => {
            let op_name = object
                .get("op_name")
                .and_then(Json::as_str)
                .ok_or_else(|| corrupt(format!("vertex `{id}` has no op_name")))?;
            let mut op = OpVertex::new(op_name, params, deps)?;
            if object.get("cache").and_then(Json::as_bool) == Some(false) {
                op = op.uncached();
            }
            Ok(Vertex::Op(op))
        }
        Some("subgraph") => {
            let inner = object
                .get("graph")
                .and_then(Json::as_object)
                .ok_or_else(|| corrupt(format!("subgraph `{id}` has no inner graph")))?;
            let output = object
                .get("output")
                .and_then(Json::as_str)
                .ok_or_else(|| corrupt(format!("subgraph `{id}` has no output")))?;
            let graph = decode_vertices(inner, domains)?;
            Ok(Vertex::Sub(SubGraphVertex::new(params, deps, graph, output)?))
        }
        Some(other) => Err(corrupt(format!("vertex `{id}` has unknown kind `{other}`"))),
        None => Err(corrupt(format!("vertex `{id}` has no kind"))),
    }
}

fn decode_deps(id: &str, deps: Option<&Json>) -> Result<Vec<String>> {
    match deps {
        None => Ok(Vec::new()),
        Some(Json::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| corrupt(format!("vertex `{id}` has a non-string dep")))
            })
            .collect(),
        Some(_) => Err(corrupt(format!("vertex `{id}` deps is not an array"))),
    }
}

fn decode_params(
    entries: &JsonMap<String, Json>,
    domains: &DomainRegistry,
) -> Result<BTreeMap<String, ParamValue>> {
    let mut out = BTreeMap::new();
    for (key, value) in entries {
        out.insert(key.clone(), decode_param(value, domains)?);
    }
    Ok(out)
}

fn decode_param(json: &Json, domains: &DomainRegistry) -> Result<ParamValue> {
    match json {
        Json::Null => Ok(ParamValue::Literal(Value::Null)),
        Json::Bool(b) => Ok(ParamValue::Literal(Value::Bool(*b))),
        Json::Number(n) => Ok(ParamValue::Literal(decode_number(n)?)),
        Json::String(s) => Ok(ParamValue::Literal(Value::Str(s.clone()))),
        Json::Array(items) => items
            .iter()
            .map(|item| decode_param(item, domains))
            .collect::<Result<Vec<_>>>()
            .map(ParamValue::Seq),
        Json::Object(object) => {
            if let Some((key, value)) = single_reserved_entry(object) {
                return match key {
                    "$ref" => value
                        .as_str()
                        .map(ParamValue::reference)
                        .ok_or_else(|| corrupt("$ref target is not a string")),
                    "$cel" => value
                        .as_str()
                        .map(ParamValue::expression)
                        .ok_or_else(|| corrupt("$cel expression is not a string")),
                    _ => Ok(ParamValue::Literal(decode_marker(key, value, domains)?)),
                };
            }
            let mut out = BTreeMap::new();
            for (key, value) in object {
                out.insert(key.clone(), decode_param(value, domains)?);
            }
            Ok(ParamValue::Map(out))
        }
    }
}

/// Decode a value position: like [`decode_param`] but `$ref`/`$cel` markers
/// are not values and are rejected.
fn decode_value(json: &Json, domains: &DomainRegistry) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => decode_number(n),
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Array(items) => items
            .iter()
            .map(|item| decode_value(item, domains))
            .collect::<Result<Vec<_>>>()
            .map(Value::Seq),
        Json::Object(object) => {
            if let Some((key, value)) = single_reserved_entry(object) {
                if key == "$ref" || key == "$cel" {
                    return Err(corrupt(format!("`{key}` marker in a literal position")));
                }
                return decode_marker(key, value, domains);
            }
            let mut out = BTreeMap::new();
            for (key, value) in object {
                out.insert(key.clone(), decode_value(value, domains)?);
            }
            Ok(Value::Map(out))
        }
    }
}

/// Decode the non-`Ref`/`Expr` markers into values.
fn decode_marker(key: &str, value: &Json, domains: &DomainRegistry) -> Result<Value> {
    match key {
        "$decimal" => {
            let text = value
                .as_str()
                .ok_or_else(|| corrupt("$decimal payload is not a string"))?;
            BigDecimal::from_str(text)
                .map(Value::Dec)
                .map_err(|_| corrupt(format!("$decimal payload `{text}` is unparseable")))
        }
        "$tuple" => {
            let items = value
                .as_array()
                .ok_or_else(|| corrupt("$tuple payload is not an array"))?;
            items
                .iter()
                .map(|item| decode_value(item, domains))
                .collect::<Result<Vec<_>>>()
                .map(Value::Tup)
        }
        "$literal" => decode_plain(value),
        "$domain" => {
            let object = value
                .as_object()
                .ok_or_else(|| corrupt("$domain payload is not an object"))?;
            let type_name = object
                .get("type")
                .and_then(Json::as_str)
                .ok_or_else(|| corrupt("$domain has no type"))?;
            if !domains.has(type_name) {
                return Err(Error::NotCacheable {
                    context: format!("unregistered domain type `{type_name}`"),
                });
            }
            let payload_b64 = object
                .get("payload_b64")
                .and_then(Json::as_str)
                .ok_or_else(|| corrupt("$domain has no payload_b64"))?;
            let payload = BASE64
                .decode(payload_b64)
                .map_err(|_| corrupt("$domain payload is not valid base64"))?;
            let mut reader = Reader::new(&payload);
            let decoded = domains.decode(type_name, &mut reader)?;
            if reader.remaining() != 0 {
                return Err(corrupt(format!(
                    "$domain payload for `{type_name}` has trailing bytes"
                )));
            }
            Ok(Value::Domain(decoded))
        }
        other => Err(corrupt(format!("unknown marker `{other}`"))),
    }
}

/// Inside `$literal`, nothing is a marker: objects are plain maps.
fn decode_plain(json: &Json) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => decode_number(n),
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Array(items) => items
            .iter()
            .map(decode_plain)
            .collect::<Result<Vec<_>>>()
            .map(Value::Seq),
        Json::Object(object) => {
            let mut out = BTreeMap::new();
            for (key, value) in object {
                out.insert(key.clone(), decode_plain(value)?);
            }
            Ok(Value::Map(out))
        }
    }
}

fn decode_number(number: &serde_json::Number) -> Result<Value> {
    if let Some(i) = number.as_i64() {
        return Ok(Value::Int(i));
    }
    if number.as_u64().is_some() {
        return Err(Error::NotCacheable {
            context: format!("integer `{number}` exceeds the signed 64-bit range"),
        });
    }
    Err(Error::FloatForbidden {
        context: format!("fractional number `{number}` in graph JSON; use {{\"$decimal\": …}}"),
    })
}

fn single_reserved_entry(object: &JsonMap<String, Json>) -> Option<(&str, &Json)> {
    if object.len() != 1 {
        return None;
    }
    let (key, value) = object.iter().next()?;
    RESERVED_KEYS
        .contains(&key.as_str())
        .then_some((key.as_str(), value))
}

fn corrupt(context: impl Into<String>) -> Error {
    Error::CorruptData {
        context: context.into(),
    }
}
