//! Deterministic JSON serialization for hashing.
//!
//! Objects serialize with recursively sorted keys; arrays keep their order;
//! scalars render exactly as `serde_json` renders them. Used for content
//! hashes and idempotency request hashes, so that key-order-equivalent
//! payloads hash identically.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// `content_hash` value carried by tombstone versions.
pub const TOMBSTONE_CONTENT_HASH: &str = "tombstone";

// ─── Canonical form ──────────────────────────────────────────────────────────

/// Serialize `value` with object keys sorted lexicographically at every
/// nesting level.
pub fn canonical_json(value: &Value) -> String {
  let mut out = String::new();
  write_canonical(value, &mut out);
  out
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort_unstable();
      out.push('{');
      for (i, key) in keys.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String((*key).clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}

// ─── Hashes ──────────────────────────────────────────────────────────────────

fn sha256_hex(parts: &[&[u8]]) -> String {
  let mut hasher = Sha256::new();
  for part in parts {
    hasher.update(part);
  }
  hasher
    .finalize()
    .iter()
    .map(|b| format!("{b:02x}"))
    .collect()
}

/// Content hash of an entry version: SHA-256 over `"<path>:<canonical(value)>"`.
pub fn content_hash(path: &str, value: &Value) -> String {
  sha256_hex(&[path.as_bytes(), b":", canonical_json(value).as_bytes()])
}

/// Idempotency hash of a request body, over the canonical form.
pub fn request_hash(body: &Value) -> String {
  sha256_hex(&[canonical_json(body).as_bytes()])
}

/// Transitional comparator: hash over the plain `serde_json` rendering, kept
/// so records written before canonical hashing still match.
pub fn legacy_request_hash(body: &Value) -> String {
  sha256_hex(&[body.to_string().as_bytes()])
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn object_keys_sort_recursively() {
    let v = json!({"b": 2, "a": {"z": 1, "y": [3, {"q": 1, "p": 2}]}});
    assert_eq!(
      canonical_json(&v),
      r#"{"a":{"y":[3,{"p":2,"q":1}],"z":1},"b":2}"#
    );
  }

  #[test]
  fn arrays_keep_order() {
    let v = json!([3, 1, 2]);
    assert_eq!(canonical_json(&v), "[3,1,2]");
  }

  #[test]
  fn scalars_render_as_json() {
    assert_eq!(canonical_json(&json!(null)), "null");
    assert_eq!(canonical_json(&json!(true)), "true");
    assert_eq!(canonical_json(&json!(1.5)), "1.5");
    assert_eq!(canonical_json(&json!("a\"b")), r#""a\"b""#);
  }

  #[test]
  fn key_order_equivalent_bodies_hash_identically() {
    let a = json!({"a": 1, "b": 2});
    let b = json!({"b": 2, "a": 1});
    assert_eq!(request_hash(&a), request_hash(&b));
  }

  #[test]
  fn content_hash_depends_on_path_and_value() {
    let v = json!({"n": 1});
    let h1 = content_hash("/x/y", &v);
    let h2 = content_hash("/x/z", &v);
    let h3 = content_hash("/x/y", &json!({"n": 2}));
    assert_ne!(h1, h2);
    assert_ne!(h1, h3);
    assert_eq!(h1.len(), 64);
  }
}
