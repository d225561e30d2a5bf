// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical leaf-byte form of a JSON document.
//!
//! Both fingerprint functions consume the same byte sequence: a recursive
//! in-order concatenation of all leaf values of the parsed document, in
//! document order. Keys are never hashed. Leaf rendering:
//!
//! - strings → their UTF-8 bytes
//! - non-negative integers → minimum-length big-endian magnitude (zero is
//!   the empty string)
//! - booleans → as integers (`true` ⇒ `0x01`, `false` ⇒ empty)
//! - arrays → the UTF-8 of their printed JSON form, not recursed into
//! - nested objects → recursed
//!
//! Nulls, floats and negative integers have no canonical byte rendering and
//! make the document unfingerprintable.

use serde_json::{Map, Number, Value};

/// A document that cannot be reduced to canonical leaf bytes.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    /// The bytes are not JSON at all.
    #[error("document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The top level must be an object; the walk iterates object values.
    #[error("document root must be a JSON object")]
    RootNotObject,
    /// A leaf value with no byte rendering.
    #[error("cannot canonicalise {0} leaf values")]
    Unsupported(&'static str),
}

/// Parse `document` and produce its canonical leaf bytes.
pub fn leaf_bytes(document: &[u8]) -> Result<Vec<u8>, CanonicalError> {
    let value: Value = serde_json::from_slice(document)?;
    let Value::Object(map) = value else {
        return Err(CanonicalError::RootNotObject);
    };
    let mut out = Vec::new();
    absorb_object(&map, &mut out)?;
    Ok(out)
}

fn absorb_object(map: &Map<String, Value>, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    for value in map.values() {
        absorb_value(value, out)?;
    }
    Ok(())
}

fn absorb_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    match value {
        Value::Object(inner) => absorb_object(inner, out),
        Value::String(text) => {
            out.extend_from_slice(text.as_bytes());
            Ok(())
        }
        Value::Number(number) => absorb_number(number, out),
        Value::Bool(true) => {
            out.push(1);
            Ok(())
        }
        Value::Bool(false) => Ok(()),
        Value::Array(_) => {
            let printed = serde_json::to_string(value)?;
            out.extend_from_slice(printed.as_bytes());
            Ok(())
        }
        Value::Null => Err(CanonicalError::Unsupported("null")),
    }
}

fn absorb_number(number: &Number, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    let Some(magnitude) = number.as_u64() else {
        if number.as_i64().is_some() {
            return Err(CanonicalError::Unsupported("negative integer"));
        }
        return Err(CanonicalError::Unsupported("non-integer number"));
    };
    let be = magnitude.to_be_bytes();
    if let Some(first) = be.iter().position(|&b| b != 0) {
        out.extend_from_slice(&be[first..]);
    }
    Ok(())
}
