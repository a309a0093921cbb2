//! Cache key derivation.
//!
//! A key is the SHA-256 digest (lowercase hex) of the canonical JSON form
//! `[positional, named]`, where every object has its keys sorted.  The
//! canonical form keeps positional and named arguments in separate slots,
//! so `("a")` and `(a="a")` never collide.

use std::collections::BTreeMap;

use ring::digest;
use serde_json::{Map, Value};

/// Length in characters of every derived key.
pub const KEY_LEN: usize = 64;

/// Derive the cache key for a call with the given arguments.
///
/// Identical logical arguments always produce the same key, whatever the
/// insertion order of `named` (or of any nested object).
pub fn derive_key(positional: &[Value], named: &Map<String, Value>) -> String {
    let canonical = Value::Array(vec![
        Value::Array(positional.iter().map(canonicalize).collect()),
        canonical_object(named),
    ]);
    let hash = digest::digest(&digest::SHA256, canonical.to_string().as_bytes());
    hex::encode(hash.as_ref())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => canonical_object(map),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn canonical_object(map: &Map<String, Value>) -> Value {
    // BTreeMap sorts; rebuilding the Map inserts in sorted order even when
    // serde_json preserves insertion order.
    let sorted: BTreeMap<&String, Value> =
        map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
    Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
}
