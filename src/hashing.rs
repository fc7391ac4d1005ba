//! Hashing - SHA-256 fingerprints for compiled views
//!
//! Every cache decision and every generated filename goes through here, so the
//! same inputs always produce the same names.

use std::fmt::Write;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{:02x}", byte);
            out
        })
}

/// Compact JSON with object keys sorted at every depth. Array order is kept.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&canonicalize(serde_json::to_value(value)?))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(entries.into_iter().map(|(k, v)| (k, canonicalize(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Identity hash of a view: sha256(namespace + ":" + name)
pub fn compute_view_hash(namespace: &str, view: &str) -> String {
    sha256_hex(format!("{}:{}", namespace, view).as_bytes())
}

/// Hash of an ordered processor configuration.
/// Order is part of the hash, keys inside each descriptor are not.
pub fn compute_chain_hash<T: Serialize>(descriptors: &[T]) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(&descriptors)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let obj = json!({"z": 1, "a": {"y": true, "b": null}, "m": [3, 1]});
        assert_eq!(canonical_json(&obj).unwrap(), r#"{"a":{"b":null,"y":true},"m":[3,1],"z":1}"#);
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_view_hash_depends_on_namespace() {
        assert_eq!(compute_view_hash("default", "home"), compute_view_hash("default", "home"));
        assert_ne!(compute_view_hash("default", "home"), compute_view_hash("admin", "home"));
    }

    #[test]
    fn test_chain_hash_respects_order() {
        let a = json!({"processor": "evaluate", "flags": ["#compile"]});
        let b = json!({"processor": "whitespace"});
        let ab = compute_chain_hash(&[a.clone(), b.clone()]).unwrap();
        let ba = compute_chain_hash(&[b, a]).unwrap();
        assert_ne!(ab, ba);
    }
}
