//! Stable hashing and manifest fingerprints.
//!
//! The stable hash of a value is the SHA-256 of its canonical hash encoding:
//! byte-identical to the codec stream except in the `icac` arm, where the
//! domain type's own `stable_hash()` stands in for the stream form. That is
//! how domain types contribute their own identity while everything else
//! hashes through the codec bytes.
//!
//! A manifest fingerprint is the stable hash of the manifest treated as a
//! canonical map; the result is the [`Digest`] used as the cache key.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::codec::{self, push_str};
use crate::value::Value;
use crate::{Error, Result};

/// A 64-hex-character SHA-256 digest, validated at store boundaries.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character lowercase hex digest.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() != 64 {
            return Err(Error::MalformedDigest {
                text: text.to_string(),
            });
        }
        let mut out = [0u8; 32];
        for (i, chunk) in text.as_bytes().chunks(2).enumerate() {
            let high = hex_digit(chunk[0]);
            let low = hex_digit(chunk[1]);
            match (high, low) {
                (Some(h), Some(l)) => out[i] = (h << 4) | l,
                _ => {
                    return Err(Error::MalformedDigest {
                        text: text.to_string(),
                    })
                }
            }
        }
        Ok(Self(out))
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The 64-character lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex_lower(&self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// Render bytes as lowercase hex.
pub fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// The stable hash of a value, as 64 lowercase hex characters.
///
/// Structural, not identity: equal values hash identically wherever they
/// were built.
pub fn stable_hash(value: &Value) -> String {
    stable_digest(value).to_hex()
}

/// The stable hash of a value, as a [`Digest`].
pub fn stable_digest(value: &Value) -> Digest {
    let mut buf = Vec::new();
    hash_encode(value, &mut buf);
    sha256(&buf)
}

/// Fingerprint a manifest: the stable hash of the resolved parameter map.
pub fn fingerprint(manifest: &BTreeMap<String, Value>) -> Digest {
    let mut buf = Vec::new();
    hash_encode_map(manifest, &mut buf);
    sha256(&buf)
}

fn sha256(bytes: &[u8]) -> Digest {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Digest(out)
}

fn hash_encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Domain(d) => {
            out.extend_from_slice(codec::TAG_DOMAIN);
            let name = d.type_name().as_bytes();
            out.extend_from_slice(&(name.len() as u32).to_be_bytes());
            out.extend_from_slice(name);
            push_str(&d.stable_hash(), out);
        }
        Value::Map(entries) => hash_encode_map(entries, out),
        Value::Seq(items) => {
            out.extend_from_slice(codec::TAG_SEQ);
            out.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                hash_encode(item, out);
            }
        }
        Value::Tup(items) => {
            out.extend_from_slice(codec::TAG_TUP);
            out.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                hash_encode(item, out);
            }
        }
        scalar => codec::encode_into(scalar, out),
    }
}

fn hash_encode_map(entries: &BTreeMap<String, Value>, out: &mut Vec<u8>) {
    out.extend_from_slice(codec::TAG_MAP);
    out.extend_from_slice(&(entries.len() as u64).to_be_bytes());
    for (key, val) in entries {
        push_str(key, out);
        hash_encode(val, out);
    }
}
