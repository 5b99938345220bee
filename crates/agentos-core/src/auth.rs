//! API key and scope types.
//!
//! Keys present as `<id>.<secret>`; only the argon2 hash of the secret is
//! stored. Verification, caching, and lockout live in the API crate — this
//! module holds the data shapes and the pure token parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of the public key id part of a token.
pub const KEY_ID_MAX: usize = 64;

/// Maximum length of the secret part of a token.
pub const KEY_SECRET_MAX: usize = 128;

// ─── Scopes ──────────────────────────────────────────────────────────────────

/// A capability granted to an API key. `Admin` implies all others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
  #[serde(rename = "memory:read")]
  MemoryRead,
  #[serde(rename = "memory:write")]
  MemoryWrite,
  #[serde(rename = "search:read")]
  SearchRead,
  #[serde(rename = "admin")]
  Admin,
}

impl Scope {
  pub fn as_str(self) -> &'static str {
    match self {
      Scope::MemoryRead => "memory:read",
      Scope::MemoryWrite => "memory:write",
      Scope::SearchRead => "search:read",
      Scope::Admin => "admin",
    }
  }

  pub fn parse(s: &str) -> Option<Scope> {
    match s {
      "memory:read" => Some(Scope::MemoryRead),
      "memory:write" => Some(Scope::MemoryWrite),
      "search:read" => Some(Scope::SearchRead),
      "admin" => Some(Scope::Admin),
      _ => None,
    }
  }

  /// Every scope except `admin` — the default grant for new keys.
  pub fn all_non_admin() -> Vec<Scope> {
    vec![Scope::MemoryRead, Scope::MemoryWrite, Scope::SearchRead]
  }
}

// ─── Authenticated context ───────────────────────────────────────────────────

/// The identity attached to a request after successful authentication.
#[derive(Debug, Clone)]
pub struct AuthContext {
  pub tenant: Uuid,
  pub key_id: String,
  pub scopes: Vec<Scope>,
}

impl AuthContext {
  /// True when the key holds any of `required`, or `admin`.
  pub fn allows(&self, required: &[Scope]) -> bool {
    if self.scopes.contains(&Scope::Admin) {
      return true;
    }
    required.iter().any(|s| self.scopes.contains(s))
  }
}

// ─── Stored key ──────────────────────────────────────────────────────────────

/// An API key row as persisted. `secret_hash` is an argon2 PHC string.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
  pub key_id:      String,
  pub tenant:      Uuid,
  pub secret_hash: String,
  pub scopes:      Vec<Scope>,
  pub label:       Option<String>,
  pub created_at:  DateTime<Utc>,
  pub revoked_at:  Option<DateTime<Utc>>,
}

// ─── Token parsing ───────────────────────────────────────────────────────────

fn valid_part(s: &str, max: usize) -> bool {
  !s.is_empty()
    && s.len() <= max
    && s
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Split a bearer token into `(id, secret)`.
///
/// Both parts must be non-empty `[A-Za-z0-9_-]` runs within their length
/// bounds; anything else is rejected before any database work.
pub fn split_token(token: &str) -> Option<(&str, &str)> {
  let (id, secret) = token.split_once('.')?;
  if valid_part(id, KEY_ID_MAX) && valid_part(secret, KEY_SECRET_MAX) {
    Some((id, secret))
  } else {
    None
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
