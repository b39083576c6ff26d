//! Canonical JSON encoding, content hashing and structural diff.
//!
//! The canonical encoding sorts every object's keys and emits no
//! whitespace, so two databases with the same content always hash the same
//! regardless of map iteration order. Arrays keep their order.
//!
//! Hash input layout: the canonical UTF-8 bytes of the value, fed into
//! SHA-256. Output is a lowercase 64-character hex string.

use serde_json::Value;
use sha2::{Digest, Sha256};

use tandem_contracts::reward::FieldDiff;

/// Encode `value` canonically: sorted keys, no insignificant whitespace.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                // Display on a JSON string value yields the quoted, escaped form.
                out.extend_from_slice(Value::String(key.clone()).to_string().as_bytes());
                out.push(b':');
                write_canonical(&map[key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}

/// SHA-256 of the canonical encoding of `value`, as lowercase hex.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(value));
    hex::encode(hasher.finalize())
}

/// Every leaf where `actual` diverges from `expected`, as JSON pointers.
///
/// Objects are compared key by key (union of both key sets, sorted), arrays
/// index by index. A missing side is reported as `None`.
pub fn diff(expected: &Value, actual: &Value) -> Vec<FieldDiff> {
    let mut out = Vec::new();
    diff_at(String::new(), Some(expected), Some(actual), &mut out);
    out
}

fn diff_at(path: String, expected: Option<&Value>, actual: Option<&Value>, out: &mut Vec<FieldDiff>) {
    match (expected, actual) {
        (Some(Value::Object(e)), Some(Value::Object(a))) => {
            let mut keys: Vec<&String> = e.keys().chain(a.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                diff_at(pointer(&path, key), e.get(key), a.get(key), out);
            }
        }
        (Some(Value::Array(e)), Some(Value::Array(a))) => {
            for i in 0..e.len().max(a.len()) {
                diff_at(pointer(&path, &i.to_string()), e.get(i), a.get(i), out);
            }
        }
        (e, a) if e == a => {}
        (e, a) => out.push(FieldDiff {
            path: if path.is_empty() { "/".to_string() } else { path },
            expected: e.cloned(),
            actual: a.cloned(),
        }),
    }
}

fn pointer(base: &str, token: &str) -> String {
    format!("{}/{}", base, token.replace('~', "~0").replace('/', "~1"))
}
