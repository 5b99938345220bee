//! Bearer-token authentication: parsing, argon2 verification, the success
//! cache, and per-key-id failure lockout.
//!
//! Tokens present as `<id>.<secret>`. A successful verification is cached
//! for 60 seconds so hot keys skip both the database and argon2; repeated
//! failures for one id trip a lockout that rejects further attempts without
//! touching the database at all.

use std::{
  collections::HashMap,
  sync::Mutex,
  time::{Duration, Instant},
};

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::http::{HeaderMap, header};

use agentos_core::{
  auth::{AuthContext, Scope, split_token},
  store::MemoryStore,
};

use crate::error::ApiError;

pub const AUTH_CACHE_TTL: Duration = Duration::from_secs(60);
pub const AUTH_CACHE_CAP: usize = 1000;

pub const LOCKOUT_THRESHOLD: u32 = 10;
pub const LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);

struct CachedAuth {
  context:  AuthContext,
  cached_at: Instant,
}

struct FailureWindow {
  count:        u32,
  window_start: Instant,
}

/// All process-local authentication state.
#[derive(Default)]
pub struct AuthGate {
  cache:    Mutex<HashMap<String, CachedAuth>>,
  failures: Mutex<HashMap<String, FailureWindow>>,
}

impl AuthGate {
  pub fn new() -> Self {
    Self::default()
  }

  /// Authenticate the request or fail with 401/429. Never reveals whether
  /// the id or the secret was wrong.
  pub async fn authenticate<S: MemoryStore>(
    &self,
    store: &S,
    headers: &HeaderMap,
  ) -> Result<AuthContext, ApiError> {
    let token = bearer_token(headers)?;
    let (key_id, secret) =
      split_token(token).ok_or(ApiError::Unauthorized)?;

    self.check_lockout(key_id)?;

    if let Some(context) = self.cache_get(token) {
      return Ok(context);
    }

    let Some(record) = store
      .find_api_key(key_id)
      .await
      .map_err(ApiError::store)?
    else {
      self.record_failure(key_id);
      return Err(ApiError::Unauthorized);
    };

    if record.revoked_at.is_some() {
      return Err(ApiError::Unauthorized);
    }

    let parsed_hash = PasswordHash::new(&record.secret_hash)
      .map_err(|_| ApiError::Unauthorized)?;
    if Argon2::default()
      .verify_password(secret.as_bytes(), &parsed_hash)
      .is_err()
    {
      self.record_failure(key_id);
      return Err(ApiError::Unauthorized);
    }

    let context = AuthContext {
      tenant: record.tenant,
      key_id: record.key_id,
      scopes: record.scopes,
    };
    self.cache_put(token, context.clone());
    Ok(context)
  }

  fn check_lockout(&self, key_id: &str) -> Result<(), ApiError> {
    let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
    let Some(window) = failures.get(key_id) else {
      return Ok(());
    };
    if window.window_start.elapsed() >= LOCKOUT_WINDOW {
      failures.remove(key_id);
      return Ok(());
    }
    if window.count >= LOCKOUT_THRESHOLD {
      let remaining = LOCKOUT_WINDOW - window.window_start.elapsed();
      return Err(ApiError::AuthLockout {
        retry_after_secs: remaining.as_secs().max(1),
      });
    }
    Ok(())
  }

  fn record_failure(&self, key_id: &str) {
    let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
    let window = failures
      .entry(key_id.to_owned())
      .or_insert(FailureWindow {
        count:        0,
        window_start: Instant::now(),
      });
    if window.window_start.elapsed() >= LOCKOUT_WINDOW {
      window.count = 0;
      window.window_start = Instant::now();
    }
    window.count += 1;
  }

  fn cache_get(&self, token: &str) -> Option<AuthContext> {
    let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
    let cached = cache.get(token)?;
    if cached.cached_at.elapsed() > AUTH_CACHE_TTL {
      return None;
    }
    Some(cached.context.clone())
  }

  fn cache_put(&self, token: &str, context: AuthContext) {
    let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
    if cache.len() >= AUTH_CACHE_CAP {
      // Drop expired entries first; if the cache is still full, drop the
      // oldest half.
      cache.retain(|_, c| c.cached_at.elapsed() <= AUTH_CACHE_TTL);
      if cache.len() >= AUTH_CACHE_CAP {
        let mut by_age: Vec<(String, Instant)> = cache
          .iter()
          .map(|(k, v)| (k.clone(), v.cached_at))
          .collect();
        by_age.sort_by_key(|(_, at)| *at);
        for (key, _) in by_age.into_iter().take(AUTH_CACHE_CAP / 2) {
          cache.remove(&key);
        }
      }
    }
    cache.insert(token.to_owned(), CachedAuth {
      context,
      cached_at: Instant::now(),
    });
  }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
  let value = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let rest = value.strip_prefix("Bearer").ok_or(ApiError::Unauthorized)?;
  if !rest.starts_with(char::is_whitespace) {
    return Err(ApiError::Unauthorized);
  }
  let token = rest.trim();
  if token.is_empty() {
    return Err(ApiError::Unauthorized);
  }
  Ok(token)
}

/// Fail with 403 unless the key holds one of `required` (or `admin`).
pub fn require_scopes(
  context: &AuthContext,
  required: &[Scope],
) -> Result<(), ApiError> {
  if context.allows(required) {
    Ok(())
  } else {
    Err(ApiError::Forbidden)
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
