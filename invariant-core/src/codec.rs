//! Canonical binary codec for the cacheable value universe.
//!
//! The encoding is injective and self-describing: every value starts with a
//! fixed 4-byte tag, lengths are u64 big-endian, integers are i64 big-endian,
//! strings and canonical decimal forms are length-prefixed UTF-8, and map
//! entries are emitted in lexicographic key order. Domain values carry a
//! u32-length-prefixed fully qualified type name followed by the type's own
//! stream form.
//!
//! The decoder accepts only bytes the encoder can produce. Truncation,
//! unknown tags, invalid UTF-8, non-canonical decimal strings, out-of-order
//! or duplicate map keys, and trailing bytes all fail with
//! [`Error::CorruptData`] naming the offending field.

use std::collections::BTreeMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::value::{DomainValue, Value};
use crate::{Error, Result};

pub(crate) const TAG_NONE: &[u8; 4] = b"none";
pub(crate) const TAG_BOOL: &[u8; 4] = b"bool";
pub(crate) const TAG_INT: &[u8; 4] = b"int_";
pub(crate) const TAG_STR: &[u8; 4] = b"str_";
pub(crate) const TAG_DEC: &[u8; 4] = b"decm";
pub(crate) const TAG_MAP: &[u8; 4] = b"dict";
pub(crate) const TAG_SEQ: &[u8; 4] = b"list";
pub(crate) const TAG_TUP: &[u8; 4] = b"tupl";
pub(crate) const TAG_DOMAIN: &[u8; 4] = b"icac";

/// Decode function for one registered domain type.
///
/// Receives the reader positioned at the type's stream form (the tag and
/// type name have already been consumed).
pub type DomainDecodeFn = fn(&mut Reader<'_>) -> Result<DomainValue>;

/// Registry of domain type decoders, keyed by fully qualified type name.
///
/// Decoding an `icac` payload requires the named type to be registered here;
/// an unknown type name is a decode failure, not a fallback.
#[derive(Debug, Default, Clone)]
pub struct DomainRegistry {
    decoders: BTreeMap<String, DomainDecodeFn>,
}

impl DomainRegistry {
    /// An empty registry. Decoding any domain value will fail until types
    /// are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a decoder to a type name.
    pub fn register(&mut self, type_name: &str, decode: DomainDecodeFn) -> Result<()> {
        if self.decoders.contains_key(type_name) {
            return Err(Error::NameInUse {
                name: type_name.to_string(),
            });
        }
        self.decoders.insert(type_name.to_string(), decode);
        Ok(())
    }

    /// Whether a type name is registered.
    pub fn has(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Decode a domain value of the named type from `reader`.
    pub fn decode(&self, type_name: &str, reader: &mut Reader<'_>) -> Result<DomainValue> {
        let decode = self.decoders.get(type_name).ok_or_else(|| Error::CorruptData {
            context: format!("unregistered domain type `{type_name}`"),
        })?;
        decode(reader)
    }
}

/// Byte cursor over an encoded stream.
///
/// Every read names the field being read so truncation errors point at the
/// exact position in the stream that fell short.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Wrap a byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::CorruptData {
                context: format!("truncated {field}"),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize, field: &str) -> Result<&'a [u8]> {
        self.take(n, field)
    }

    /// Read a big-endian u64.
    pub fn read_u64(&mut self, field: &str) -> Result<u64> {
        let bytes = self.take(8, field)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    /// Read a big-endian i64.
    pub fn read_i64(&mut self, field: &str) -> Result<i64> {
        let bytes = self.take(8, field)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(raw))
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self, field: &str) -> Result<u32> {
        let bytes = self.take(4, field)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(u32::from_be_bytes(raw))
    }

    /// Read a u64-length-prefixed UTF-8 string.
    pub fn read_string(&mut self, field: &str) -> Result<String> {
        let len = self.read_len(field)?;
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::CorruptData {
            context: format!("invalid UTF-8 in {field}"),
        })
    }

    fn read_len(&mut self, field: &str) -> Result<usize> {
        let raw = self.read_u64(field)?;
        usize::try_from(raw).map_err(|_| Error::CorruptData {
            context: format!("oversized length in {field}"),
        })
    }
}

/// Encode a value to its canonical byte stream.
///
/// Encoding is total over [`Value`]: the universe is closed, so nothing a
/// caller can hand in fails to encode.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Append a value's canonical byte stream to `out`.
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(TAG_NONE),
        Value::Bool(b) => {
            out.extend_from_slice(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Int(i) => {
            out.extend_from_slice(TAG_INT);
            out.extend_from_slice(&i.to_be_bytes());
        }
        Value::Str(s) => {
            out.extend_from_slice(TAG_STR);
            push_str(s, out);
        }
        Value::Dec(d) => {
            out.extend_from_slice(TAG_DEC);
            push_str(&d.to_string(), out);
        }
        Value::Map(entries) => {
            out.extend_from_slice(TAG_MAP);
            out.extend_from_slice(&(entries.len() as u64).to_be_bytes());
            // BTreeMap iteration is already lexicographic.
            for (key, val) in entries {
                push_str(key, out);
                encode_into(val, out);
            }
        }
        Value::Seq(items) => {
            out.extend_from_slice(TAG_SEQ);
            out.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                encode_into(item, out);
            }
        }
        Value::Tup(items) => {
            out.extend_from_slice(TAG_TUP);
            out.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                encode_into(item, out);
            }
        }
        Value::Domain(d) => {
            out.extend_from_slice(TAG_DOMAIN);
            let name = d.type_name().as_bytes();
            out.extend_from_slice(&(name.len() as u32).to_be_bytes());
            out.extend_from_slice(name);
            d.encode(out);
        }
    }
}

pub(crate) fn push_str(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u64).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Decode one value from `bytes`, rejecting trailing input.
pub fn decode(bytes: &[u8], domains: &DomainRegistry) -> Result<Value> {
    let mut reader = Reader::new(bytes);
    let value = decode_value(&mut reader, domains)?;
    if reader.remaining() != 0 {
        return Err(Error::CorruptData {
            context: format!("{} trailing bytes after value", reader.remaining()),
        });
    }
    Ok(value)
}

/// Decode one value from the reader's current position.
pub fn decode_value(reader: &mut Reader<'_>, domains: &DomainRegistry) -> Result<Value> {
    let tag: [u8; 4] = reader.read_bytes(4, "type tag")?.try_into().expect("4 bytes");
    match &tag {
        TAG_NONE => Ok(Value::Null),
        TAG_BOOL => match reader.read_bytes(1, "bool payload")?[0] {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(Error::CorruptData {
                context: format!("invalid bool byte 0x{other:02x}"),
            }),
        },
        TAG_INT => Ok(Value::Int(reader.read_i64("int payload")?)),
        TAG_STR => Ok(Value::Str(reader.read_string("str payload")?)),
        TAG_DEC => {
            let text = reader.read_string("decimal payload")?;
            let dec = BigDecimal::from_str(&text).map_err(|_| Error::CorruptData {
                context: format!("unparseable decimal `{text}`"),
            })?;
            // The encoder writes the canonical string form; anything that
            // does not round-trip is a non-canonical (hence foreign) stream.
            if dec.to_string() != text {
                return Err(Error::CorruptData {
                    context: format!("non-canonical decimal `{text}`"),
                });
            }
            Ok(Value::Dec(dec))
        }
        TAG_MAP => {
            let count = reader.read_u64("map length")?;
            let mut entries = BTreeMap::new();
            let mut prev_key: Option<String> = None;
            for _ in 0..count {
                let key = reader.read_string("map key")?;
                if let Some(prev) = &prev_key {
                    if *prev >= key {
                        return Err(Error::CorruptData {
                            context: format!("map keys out of canonical order at `{key}`"),
                        });
                    }
                }
                let val = decode_value(reader, domains)?;
                prev_key = Some(key.clone());
                entries.insert(key, val);
            }
            Ok(Value::Map(entries))
        }
        TAG_SEQ => Ok(Value::Seq(decode_items(reader, domains, "list")?)),
        TAG_TUP => Ok(Value::Tup(decode_items(reader, domains, "tuple")?)),
        TAG_DOMAIN => {
            let name_len = reader.read_u32("domain type name length")? as usize;
            let name_bytes = reader.read_bytes(name_len, "domain type name")?;
            let type_name =
                std::str::from_utf8(name_bytes).map_err(|_| Error::CorruptData {
                    context: "invalid UTF-8 in domain type name".to_string(),
                })?;
            Ok(Value::Domain(domains.decode(type_name, reader)?))
        }
        other => Err(Error::CorruptData {
            context: format!("unknown type tag {:?}", String::from_utf8_lossy(other)),
        }),
    }
}

fn decode_items(
    reader: &mut Reader<'_>,
    domains: &DomainRegistry,
    what: &str,
) -> Result<Vec<Value>> {
    let count = reader.read_u64(&format!("{what} length"))?;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(decode_value(reader, domains)?);
    }
    Ok(items)
}
