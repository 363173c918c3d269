//! Operation registry and invocation surface.
//!
//! Operations are host-supplied pure functions over named, cacheable-typed
//! parameters. The registry is an explicit instance handed to each executor
//! (never a process-wide singleton), populated at setup and read-only
//! afterwards.
//!
//! Rust has no runtime signature introspection, so by-name parameter
//! binding is pull-based: an operation fetches its parameters from
//! [`OpArgs`]. `required` surfaces `MissingParameter`, the typed accessors
//! surface `TypeMismatch`, and `entries` is the variadic-by-name channel
//! for operations that consume the whole manifest.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::value::{DomainType, Value};
use crate::{Error, Result};

/// A deterministic pure function of its manifest.
///
/// The registry does not (and cannot) validate purity; the system contract
/// requires it.
pub trait Operation: Send + Sync {
    /// Invoke with the resolved manifest.
    fn invoke(&self, args: &OpArgs<'_>) -> Result<Value>;
}

impl<F> Operation for F
where
    F: Fn(&OpArgs<'_>) -> Result<Value> + Send + Sync,
{
    fn invoke(&self, args: &OpArgs<'_>) -> Result<Value> {
        self(args)
    }
}

impl std::fmt::Debug for dyn Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<operation>")
    }
}

/// A view of one invocation's manifest.
#[derive(Clone, Copy, Debug)]
pub struct OpArgs<'a> {
    op_name: &'a str,
    manifest: &'a BTreeMap<String, Value>,
}

impl<'a> OpArgs<'a> {
    /// Wrap a manifest for dispatch to `op_name`.
    pub fn new(op_name: &'a str, manifest: &'a BTreeMap<String, Value>) -> Self {
        Self { op_name, manifest }
    }

    /// The operation being invoked.
    pub fn op_name(&self) -> &str {
        self.op_name
    }

    /// A required parameter; absent means `MissingParameter`.
    pub fn required(&self, name: &str) -> Result<&'a Value> {
        self.manifest.get(name).ok_or_else(|| Error::MissingParameter {
            op_name: self.op_name.to_string(),
            param: name.to_string(),
        })
    }

    /// An optional parameter.
    pub fn optional(&self, name: &str) -> Option<&'a Value> {
        self.manifest.get(name)
    }

    /// A required `Int` parameter.
    pub fn int(&self, name: &str) -> Result<i64> {
        match self.required(name)? {
            Value::Int(i) => Ok(*i),
            other => Err(self.mismatch(name, "Int", other)),
        }
    }

    /// A required `Str` parameter.
    pub fn text(&self, name: &str) -> Result<&'a str> {
        match self.required(name)? {
            Value::Str(s) => Ok(s),
            other => Err(self.mismatch(name, "Str", other)),
        }
    }

    /// A required `Map` parameter.
    pub fn map(&self, name: &str) -> Result<&'a BTreeMap<String, Value>> {
        match self.required(name)? {
            Value::Map(entries) => Ok(entries),
            other => Err(self.mismatch(name, "Map", other)),
        }
    }

    /// A required `Seq` or `Tup` parameter, as a slice.
    pub fn items(&self, name: &str) -> Result<&'a [Value]> {
        match self.required(name)? {
            Value::Seq(items) | Value::Tup(items) => Ok(items),
            other => Err(self.mismatch(name, "Seq or Tup", other)),
        }
    }

    /// A required domain parameter of concrete type `T`.
    pub fn domain<T: DomainType + 'static>(&self, name: &str) -> Result<&'a T> {
        match self.required(name)? {
            Value::Domain(d) => d.downcast_ref::<T>().ok_or_else(|| Error::TypeMismatch {
                context: format!("{}.{name}", self.op_name),
                message: format!("expected a different domain type, got {}", d.type_name()),
            }),
            other => Err(self.mismatch(name, "Domain", other)),
        }
    }

    /// All manifest entries, for variadic-by-name operations.
    pub fn entries(&self) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.manifest.iter()
    }

    /// Number of manifest entries.
    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    /// Whether the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    fn mismatch(&self, name: &str, expected: &str, got: &Value) -> Error {
        Error::TypeMismatch {
            context: format!("{}.{name}", self.op_name),
            message: format!("expected {expected}, got {}", got.kind()),
        }
    }
}

/// A table of operations to register under one prefix.
pub type OpPackage = Vec<(&'static str, Arc<dyn Operation>)>;

/// Maps operation names to host callables.
#[derive(Clone, Default)]
pub struct OpRegistry {
    ops: BTreeMap<String, Arc<dyn Operation>>,
}

impl OpRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to an operation. Fails if the name is taken.
    pub fn register<O: Operation + 'static>(&mut self, name: &str, op: O) -> Result<()> {
        self.register_arc(name, Arc::new(op))
    }

    /// Bind `name` to a shared operation. Fails if the name is taken.
    pub fn register_arc(&mut self, name: &str, op: Arc<dyn Operation>) -> Result<()> {
        if self.ops.contains_key(name) {
            return Err(Error::NameInUse {
                name: name.to_string(),
            });
        }
        self.ops.insert(name.to_string(), op);
        Ok(())
    }

    /// Bind each package entry under `prefix:`. Atomic: on any name
    /// conflict, nothing is registered.
    pub fn register_package(&mut self, prefix: &str, package: OpPackage) -> Result<()> {
        for (short, _) in &package {
            let full = format!("{prefix}:{short}");
            if self.ops.contains_key(&full) {
                return Err(Error::NameInUse { name: full });
            }
        }
        for (short, op) in package {
            self.ops.insert(format!("{prefix}:{short}"), op);
        }
        Ok(())
    }

    /// Look up an operation. Fails if the name is not bound.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Operation>> {
        self.ops.get(name).cloned().ok_or_else(|| Error::NameMissing {
            name: name.to_string(),
        })
    }

    /// Whether `name` is bound.
    pub fn has(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for OpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpRegistry")
            .field("ops", &self.ops.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(args: &OpArgs<'_>) -> Result<Value> {
        Ok(args.required("value")?.clone())
    }

    #[test]
    fn register_and_get() {
        let mut registry = OpRegistry::new();
        registry.register("stdlib:identity", identity).unwrap();
        assert!(registry.has("stdlib:identity"));
        let op = registry.get("stdlib:identity").unwrap();
        let mut manifest = BTreeMap::new();
        manifest.insert("value".to_string(), Value::Int(5));
        let out = op.invoke(&OpArgs::new("stdlib:identity", &manifest)).unwrap();
        assert_eq!(out, Value::Int(5));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = OpRegistry::new();
        registry.register("op", identity).unwrap();
        let err = registry.register("op", identity).unwrap_err();
        assert!(matches!(err, Error::NameInUse { name } if name == "op"));
    }

    #[test]
    fn missing_name_is_reported() {
        let registry = OpRegistry::new();
        let err = registry.get("ghost").unwrap_err();
        assert!(matches!(err, Error::NameMissing { name } if name == "ghost"));
    }

    #[test]
    fn package_registration_is_atomic() {
        let mut registry = OpRegistry::new();
        registry.register("pkg:b", identity).unwrap();

        let package: OpPackage = vec![
            ("a", Arc::new(identity) as Arc<dyn Operation>),
            ("b", Arc::new(identity) as Arc<dyn Operation>),
        ];
        let err = registry.register_package("pkg", package).unwrap_err();
        assert!(matches!(err, Error::NameInUse { name } if name == "pkg:b"));
        // The non-conflicting entry must not have been registered either.
        assert!(!registry.has("pkg:a"));
    }

    #[test]
    fn missing_required_parameter() {
        let manifest = BTreeMap::new();
        let args = OpArgs::new("stdlib:add", &manifest);
        let err = args.required("a").unwrap_err();
        assert!(matches!(
            err,
            Error::MissingParameter { op_name, param }
                if op_name == "stdlib:add" && param == "a"
        ));
    }

    #[test]
    fn typed_accessors_report_mismatches() {
        let mut manifest = BTreeMap::new();
        manifest.insert("a".to_string(), Value::Str("nope".to_string()));
        let args = OpArgs::new("op", &manifest);
        let err = args.int("a").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(args.text("a").unwrap(), "nope");
    }

    #[test]
    fn optional_parameters_may_be_absent() {
        let manifest = BTreeMap::new();
        let args = OpArgs::new("op", &manifest);
        assert!(args.optional("missing").is_none());
    }

    #[test]
    fn entries_expose_the_whole_manifest() {
        let mut manifest = BTreeMap::new();
        manifest.insert("x".to_string(), Value::Int(1));
        manifest.insert("y".to_string(), Value::Int(2));
        let args = OpArgs::new("op", &manifest);
        assert_eq!(args.entries().count(), 2);
        assert_eq!(args.len(), 2);
    }
}
