//! Polynomial domain type and the `poly:` operation package.
//!
//! A polynomial is a vector of `i64` coefficients; index `i` carries the
//! coefficient of `x^i`. The canonical form strips trailing zeros, and the
//! zero polynomial keeps a single zero coefficient, so equal polynomials
//! always share one representation (and therefore one stable hash).

use std::any::Any;
use std::sync::Arc;

use sha2::{Digest as _, Sha256};

use invariant_core::codec::{DomainRegistry, Reader};
use invariant_core::hash::hex_lower;
use invariant_core::registry::{OpArgs, OpPackage, Operation};
use invariant_core::value::{DomainType, DomainValue, Value};
use invariant_core::{Error, Result};

/// Fully qualified type name under which polynomials are stored.
pub const POLYNOMIAL_TYPE: &str = "invariant.poly.Polynomial";

/// A polynomial in canonical coefficient form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Polynomial {
    coefficients: Vec<i64>,
}

impl Polynomial {
    /// Build from coefficients, stripping trailing zeros. An empty or
    /// all-zero input becomes the zero polynomial `[0]`.
    pub fn new(coefficients: impl Into<Vec<i64>>) -> Self {
        let mut coefficients = coefficients.into();
        while coefficients.last() == Some(&0) {
            coefficients.pop();
        }
        if coefficients.is_empty() {
            coefficients.push(0);
        }
        Self { coefficients }
    }

    /// The canonical coefficient slice.
    pub fn coefficients(&self) -> &[i64] {
        &self.coefficients
    }

    /// Sum of two polynomials.
    pub fn add(&self, other: &Polynomial) -> Result<Polynomial> {
        let len = self.coefficients.len().max(other.coefficients.len());
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let a = self.coefficients.get(i).copied().unwrap_or(0);
            let b = other.coefficients.get(i).copied().unwrap_or(0);
            out.push(a.checked_add(b).ok_or_else(|| overflow("poly:add"))?);
        }
        Ok(Polynomial::new(out))
    }

    /// Product of two polynomials (coefficient convolution).
    pub fn multiply(&self, other: &Polynomial) -> Result<Polynomial> {
        let mut out = vec![0i64; self.coefficients.len() + other.coefficients.len() - 1];
        for (i, &a) in self.coefficients.iter().enumerate() {
            for (j, &b) in other.coefficients.iter().enumerate() {
                let term = a.checked_mul(b).ok_or_else(|| overflow("poly:multiply"))?;
                out[i + j] = out[i + j]
                    .checked_add(term)
                    .ok_or_else(|| overflow("poly:multiply"))?;
            }
        }
        Ok(Polynomial::new(out))
    }

    /// Scale every coefficient by `scalar`.
    pub fn scale(&self, scalar: i64) -> Result<Polynomial> {
        let mut out = Vec::with_capacity(self.coefficients.len());
        for &c in &self.coefficients {
            out.push(c.checked_mul(scalar).ok_or_else(|| overflow("poly:scale"))?);
        }
        Ok(Polynomial::new(out))
    }

    /// Formal derivative: `c[i] * x^i` becomes `i * c[i] * x^(i-1)`.
    pub fn derivative(&self) -> Result<Polynomial> {
        if self.coefficients.len() <= 1 {
            return Ok(Polynomial::new(vec![0]));
        }
        let mut out = Vec::with_capacity(self.coefficients.len() - 1);
        for (i, &c) in self.coefficients.iter().enumerate().skip(1) {
            out.push(
                c.checked_mul(i as i64)
                    .ok_or_else(|| overflow("poly:derivative"))?,
            );
        }
        Ok(Polynomial::new(out))
    }

    /// Evaluate at `x` with Horner's method.
    pub fn evaluate(&self, x: i64) -> Result<i64> {
        let mut acc = 0i64;
        for &c in self.coefficients.iter().rev() {
            acc = acc
                .checked_mul(x)
                .and_then(|v| v.checked_add(c))
                .ok_or_else(|| overflow("poly:evaluate"))?;
        }
        Ok(acc)
    }

    /// Wrap into a cacheable value.
    pub fn into_value(self) -> Value {
        Value::domain(self)
    }

    /// Decode the stream form: u64 BE coefficient count, then i64 BE
    /// coefficients. Trailing zeros are stripped on the way in.
    pub fn decode_stream(reader: &mut Reader<'_>) -> Result<DomainValue> {
        let count = reader.read_u64("polynomial coefficient count")? as usize;
        let mut coefficients = Vec::new();
        for _ in 0..count {
            coefficients.push(reader.read_i64("polynomial coefficient")?);
        }
        Ok(DomainValue::new(Polynomial::new(coefficients)))
    }
}

impl DomainType for Polynomial {
    fn type_name(&self) -> &str {
        POLYNOMIAL_TYPE
    }

    fn stable_hash(&self) -> String {
        // Hash of the comma-joined canonical coefficient string.
        let joined = self
            .coefficients
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        hex_lower(&Sha256::digest(joined.as_bytes()))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.coefficients.len() as u64).to_be_bytes());
        for c in &self.coefficients {
            out.extend_from_slice(&c.to_be_bytes());
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "coefficients" => Some(Value::Tup(
                self.coefficients.iter().map(|&c| Value::Int(c)).collect(),
            )),
            "degree" => Some(Value::Int(self.coefficients.len() as i64 - 1)),
            _ => None,
        }
    }

    fn eq_value(&self, other: &dyn DomainType) -> bool {
        other
            .as_any()
            .downcast_ref::<Polynomial>()
            .is_some_and(|p| p == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A domain registry with the polynomial type bound.
pub fn domains() -> DomainRegistry {
    let mut registry = DomainRegistry::new();
    registry
        .register(POLYNOMIAL_TYPE, Polynomial::decode_stream)
        .expect("fresh registry has no bindings");
    registry
}

fn overflow(op: &str) -> Error {
    Error::TypeMismatch {
        context: op.to_string(),
        message: "integer overflow in coefficient arithmetic".to_string(),
    }
}

fn poly_arg(args: &OpArgs<'_>, name: &str) -> Result<Polynomial> {
    Ok(args.domain::<Polynomial>(name)?.clone())
}

fn op_from_coefficients(args: &OpArgs<'_>) -> Result<Value> {
    let items = args.items("coefficients")?;
    let mut coefficients = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item {
            Value::Int(c) => coefficients.push(*c),
            other => {
                return Err(Error::TypeMismatch {
                    context: format!("{}.coefficients[{i}]", args.op_name()),
                    message: format!("expected Int, got {}", other.kind()),
                })
            }
        }
    }
    Ok(Polynomial::new(coefficients).into_value())
}

fn op_add(args: &OpArgs<'_>) -> Result<Value> {
    let a = poly_arg(args, "a")?;
    let b = poly_arg(args, "b")?;
    Ok(a.add(&b)?.into_value())
}

fn op_multiply(args: &OpArgs<'_>) -> Result<Value> {
    let a = poly_arg(args, "a")?;
    let b = poly_arg(args, "b")?;
    Ok(a.multiply(&b)?.into_value())
}

fn op_scale(args: &OpArgs<'_>) -> Result<Value> {
    let poly = poly_arg(args, "poly")?;
    let scalar = args.int("scalar")?;
    Ok(poly.scale(scalar)?.into_value())
}

fn op_derivative(args: &OpArgs<'_>) -> Result<Value> {
    let poly = poly_arg(args, "poly")?;
    Ok(poly.derivative()?.into_value())
}

fn op_evaluate(args: &OpArgs<'_>) -> Result<Value> {
    let poly = poly_arg(args, "poly")?;
    let x = args.int("x")?;
    Ok(Value::Int(poly.evaluate(x)?))
}

/// The `poly:` operation package.
pub fn package() -> OpPackage {
    vec![
        ("from_coefficients", Arc::new(op_from_coefficients) as Arc<dyn Operation>),
        ("add", Arc::new(op_add) as Arc<dyn Operation>),
        ("multiply", Arc::new(op_multiply) as Arc<dyn Operation>),
        ("scale", Arc::new(op_scale) as Arc<dyn Operation>),
        ("derivative", Arc::new(op_derivative) as Arc<dyn Operation>),
        ("evaluate", Arc::new(op_evaluate) as Arc<dyn Operation>),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use invariant_core::codec;

    #[test]
    fn trailing_zeros_are_stripped() {
        assert_eq!(
            Polynomial::new(vec![1, 2, 0, 0]),
            Polynomial::new(vec![1, 2])
        );
        assert_eq!(Polynomial::new(vec![0, 0]).coefficients(), &[0]);
        assert_eq!(Polynomial::new(Vec::new()).coefficients(), &[0]);
    }

    #[test]
    fn canonical_form_shares_one_hash() {
        let a = Polynomial::new(vec![1, 2, 0]);
        let b = Polynomial::new(vec![1, 2]);
        assert_eq!(a.stable_hash(), b.stable_hash());
    }

    #[test]
    fn addition_and_multiplication() {
        let p = Polynomial::new(vec![1, 2, 1]);
        let q = Polynomial::new(vec![3, 0, -1]);
        assert_eq!(p.add(&q).unwrap(), Polynomial::new(vec![4, 2]));

        let r = Polynomial::new(vec![1, 1]);
        assert_eq!(
            p.multiply(&r).unwrap(),
            Polynomial::new(vec![1, 3, 3, 1])
        );
    }

    #[test]
    fn cancellation_renormalizes() {
        // (x) + (-x) collapses to the zero polynomial.
        let p = Polynomial::new(vec![0, 1]);
        let q = Polynomial::new(vec![0, -1]);
        assert_eq!(p.add(&q).unwrap().coefficients(), &[0]);
    }

    #[test]
    fn derivative_and_evaluation() {
        // 1 + 2x + 3x^2
        let p = Polynomial::new(vec![1, 2, 3]);
        assert_eq!(p.derivative().unwrap(), Polynomial::new(vec![2, 6]));
        assert_eq!(p.evaluate(2).unwrap(), 17);
        assert_eq!(Polynomial::new(vec![5]).derivative().unwrap().coefficients(), &[0]);
    }

    #[test]
    fn scale_multiplies_every_coefficient() {
        let p = Polynomial::new(vec![1, -2, 3]);
        assert_eq!(p.scale(2).unwrap(), Polynomial::new(vec![2, -4, 6]));
        assert_eq!(p.scale(0).unwrap().coefficients(), &[0]);
    }

    #[test]
    fn codec_roundtrip_through_domain_registry() {
        let value = Polynomial::new(vec![4, 6, 2]).into_value();
        let bytes = codec::encode(&value);
        let back = codec::decode(&bytes, &domains()).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn expression_fields() {
        let p = Polynomial::new(vec![7, 0, 1]);
        assert_eq!(
            p.field("coefficients"),
            Some(Value::Tup(vec![Value::Int(7), Value::Int(0), Value::Int(1)]))
        );
        assert_eq!(p.field("degree"), Some(Value::Int(2)));
        assert_eq!(p.field("ghost"), None);
    }

    #[test]
    fn overflow_is_an_error_not_a_wrap() {
        let p = Polynomial::new(vec![i64::MAX]);
        let q = Polynomial::new(vec![1]);
        assert!(matches!(
            p.add(&q).unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }
}
