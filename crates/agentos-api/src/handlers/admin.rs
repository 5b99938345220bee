//! Privileged handlers: key bootstrap and job requeue.
//!
//! Both authenticate with the out-of-band `ADMIN_BOOTSTRAP_TOKEN` carried in
//! the request body, compared in constant time, and share a tight rate
//! limit.

use axum::{Json, extract::State, response::Response};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand_core::{OsRng, RngCore as _};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use argon2::{Argon2, PasswordHasher as _, password_hash::SaltString};

use agentos_core::{
  auth::{ApiKeyRecord, Scope},
  job::JobStatus,
  store::MemoryStore,
};

use crate::{
  AppState, constant_time_eq,
  error::ApiError,
  handlers::with_rate_headers,
  ratelimit::RateLimitInfo,
};

/// Upper bound on one admin requeue.
const REQUEUE_LIMIT_MAX: usize = 1000;

fn admin_gate<S: MemoryStore>(
  state: &AppState<S>,
  presented: &str,
) -> Result<RateLimitInfo, ApiError> {
  // Admin calls carry no tenant; the shared nil key keeps the bootstrap
  // window global to the process.
  let rate = state.limits.windows.check(
    Uuid::nil(),
    "admin",
    state.config.admin_rate_limit_per_minute,
  )?;

  let Some(expected) = &state.config.admin_bootstrap_token else {
    return Err(ApiError::Unauthorized);
  };
  if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
    return Err(ApiError::Unauthorized);
  }
  Ok(rate)
}

fn random_token(bytes: usize) -> String {
  let mut buf = vec![0u8; bytes];
  OsRng.fill_bytes(&mut buf);
  URL_SAFE_NO_PAD.encode(buf)
}

// ─── Create key ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateKeyBody {
  pub token:     String,
  pub label:     Option<String>,
  pub tenant_id: Option<Uuid>,
  pub scopes:    Option<Vec<String>>,
}

/// `POST /v1/admin/create-key` — mint an API key, creating the tenant when
/// none is given. The secret is returned exactly once.
pub async fn create_key<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<CreateKeyBody>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let rate = admin_gate(&state, &body.token)?;

  let scopes = match body.scopes {
    None => Scope::all_non_admin(),
    Some(names) => names
      .iter()
      .map(|n| {
        Scope::parse(n)
          .ok_or_else(|| ApiError::Validation(format!("unknown scope: {n:?}")))
      })
      .collect::<Result<Vec<_>, _>>()?,
  };

  let tenant = body.tenant_id.unwrap_or_else(Uuid::new_v4);
  state
    .store
    .ensure_tenant(tenant)
    .await
    .map_err(ApiError::store)?;

  let key_id = format!("k{}", random_token(12));
  let secret = random_token(32);
  let salt = SaltString::generate(&mut OsRng);
  let secret_hash = Argon2::default()
    .hash_password(secret.as_bytes(), &salt)
    .map_err(|e| ApiError::Internal(format!("argon2 error: {e}")))?
    .to_string();

  let record = ApiKeyRecord {
    key_id: key_id.clone(),
    tenant,
    secret_hash,
    scopes,
    label: body.label,
    created_at: Utc::now(),
    revoked_at: None,
  };
  state
    .store
    .insert_api_key(&record)
    .await
    .map_err(ApiError::store)?;

  Ok(with_rate_headers(
    &rate,
    json!({
      "ok": true,
      "api_key": format!("{key_id}.{secret}"),
      "key_id": key_id,
      "tenant_id": tenant,
    }),
  ))
}

// ─── Requeue jobs ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RequeueBody {
  pub token:  String,
  pub status: String,
  pub limit:  Option<usize>,
}

/// `POST /v1/admin/requeue-jobs` — reset jobs matching a status filter back
/// to `queued`, bounded per call.
pub async fn requeue_jobs<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<RequeueBody>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let rate = admin_gate(&state, &body.token)?;

  let status = JobStatus::parse(&body.status).ok_or_else(|| {
    ApiError::Validation(format!("unknown job status: {:?}", body.status))
  })?;
  let limit = body
    .limit
    .unwrap_or(REQUEUE_LIMIT_MAX)
    .clamp(1, REQUEUE_LIMIT_MAX);

  let requeued = state
    .store
    .requeue_jobs(status, limit)
    .await
    .map_err(ApiError::store)?;

  Ok(with_rate_headers(
    &rate,
    json!({ "ok": true, "requeued": requeued }),
  ))
}
