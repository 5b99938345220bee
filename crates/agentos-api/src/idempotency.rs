//! Idempotency-key protocol for writes.
//!
//! The client supplies `Idempotency-Key`; the first completed request stores
//! its response for 24 hours, and retries with the same key and an
//! equivalent body replay it. A retry with the same key but a different
//! body is a client bug and is rejected.

use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use agentos_core::{
  canonical::{legacy_request_hash, request_hash},
  store::MemoryStore,
};

use crate::error::ApiError;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

const KEY_MAX: usize = 128;

fn ttl() -> Duration {
  Duration::hours(24)
}

/// Extract and validate the idempotency key, if the header is present.
pub fn key_from_headers(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
  let Some(raw) = headers.get(IDEMPOTENCY_HEADER) else {
    return Ok(None);
  };
  let key = raw.to_str().map_err(|_| ApiError::InvalidIdempotencyKey)?;
  let valid = !key.is_empty()
    && key.len() <= KEY_MAX
    && key
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
  if !valid {
    return Err(ApiError::InvalidIdempotencyKey);
  }
  Ok(Some(key.to_owned()))
}

/// Look up a cached response for `(tenant, key)`.
///
/// Matches against the canonical body hash, falling back to the legacy plain
/// hash for records written before canonicalization. A live record with a
/// different hash is a mismatch.
pub async fn lookup<S: MemoryStore>(
  store: &S,
  tenant: Uuid,
  key: &str,
  body: &Value,
) -> Result<Option<Value>, ApiError> {
  let Some(record) = store
    .idempotency_lookup(tenant, key)
    .await
    .map_err(ApiError::store)?
  else {
    return Ok(None);
  };

  let canonical = request_hash(body);
  let legacy = legacy_request_hash(body);
  if record.request_hash == canonical || record.request_hash == legacy {
    Ok(Some(record.response))
  } else {
    Err(ApiError::IdempotencyMismatch)
  }
}

/// Store `response` for replay under `(tenant, key)` with a 24 h expiry.
pub async fn store_response<S: MemoryStore>(
  store: &S,
  tenant: Uuid,
  key: &str,
  body: &Value,
  response: &Value,
) -> Result<(), ApiError> {
  store
    .idempotency_store(
      tenant,
      key,
      &request_hash(body),
      response,
      Utc::now() + ttl(),
    )
    .await
    .map_err(ApiError::store)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
