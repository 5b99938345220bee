//! `/v1/*` handlers and the shared per-request gates.

pub mod admin;
pub mod listing;
pub mod memory;
pub mod search;

use axum::{
  Json,
  http::{HeaderMap, HeaderValue},
  response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use agentos_core::{
  auth::{AuthContext, Scope},
  store::{MemoryStore, utc_day},
};

use crate::{
  AppState,
  auth::require_scopes,
  error::ApiError,
  ratelimit::RateLimitInfo,
};

/// Successful outcome of the authenticated pipeline prefix.
pub(crate) struct Gate {
  pub context: AuthContext,
  pub rate:    RateLimitInfo,
}

/// Ordered gates shared by every authenticated handler:
/// authenticate → scope check → endpoint rate limit.
pub(crate) async fn gate<S: MemoryStore>(
  state: &AppState<S>,
  headers: &HeaderMap,
  endpoint: &'static str,
  scopes: &[Scope],
) -> Result<Gate, ApiError> {
  let context = state.auth.authenticate(state.store.as_ref(), headers).await?;
  require_scopes(&context, scopes)?;

  let limit = match endpoint {
    "search" => state.config.search_rate_limit_per_minute,
    _ => state.config.rate_limit_per_minute,
  };
  let rate = state.limits.windows.check(context.tenant, endpoint, limit)?;
  Ok(Gate { context, rate })
}

/// Deserialize an already-parsed JSON body into its typed form, mapping
/// shape errors to `VALIDATION_ERROR`.
pub(crate) fn parse_body<T: DeserializeOwned>(raw: Value) -> Result<T, ApiError> {
  serde_json::from_value(raw).map_err(|e| ApiError::Validation(e.to_string()))
}

/// Wrap a JSON body with the `X-RateLimit-*` headers for this request.
pub(crate) fn with_rate_headers(rate: &RateLimitInfo, body: Value) -> Response {
  let mut response = Json(body).into_response();
  let headers = response.headers_mut();
  if let Ok(v) = HeaderValue::from_str(&rate.limit.to_string()) {
    headers.insert("X-RateLimit-Limit", v);
  }
  if let Ok(v) = HeaderValue::from_str(&rate.remaining.to_string()) {
    headers.insert("X-RateLimit-Remaining", v);
  }
  if let Ok(v) = HeaderValue::from_str(&rate.reset_epoch.to_string()) {
    headers.insert("X-RateLimit-Reset", v);
  }
  response
}

// ─── Quota gates ─────────────────────────────────────────────────────────────

pub(crate) async fn charge_write_quota<S: MemoryStore>(
  state: &AppState<S>,
  tenant: Uuid,
  bytes: i64,
) -> Result<(), ApiError> {
  let day = utc_day(Utc::now());
  let after = state
    .store
    .incr_write_quota(tenant, &day, bytes)
    .await
    .map_err(ApiError::store)?;
  if after.writes > state.config.write_quota_per_day {
    state.metrics.quota_denial("writes");
    return Err(ApiError::QuotaWrites);
  }
  Ok(())
}

pub(crate) async fn charge_search_quota<S: MemoryStore>(
  state: &AppState<S>,
  tenant: Uuid,
) -> Result<(), ApiError> {
  let day = utc_day(Utc::now());
  let searches = state
    .store
    .incr_search_quota(tenant, &day)
    .await
    .map_err(ApiError::store)?;
  if searches > state.config.search_quota_per_day {
    state.metrics.quota_denial("searches");
    return Err(ApiError::QuotaSearches);
  }
  Ok(())
}

pub(crate) async fn charge_embed_tokens<S: MemoryStore>(
  state: &AppState<S>,
  tenant: Uuid,
  tokens: i64,
) -> Result<(), ApiError> {
  let day = utc_day(Utc::now());
  let total = state
    .store
    .incr_embed_token_quota(tenant, &day, tokens)
    .await
    .map_err(ApiError::store)?;
  if total > state.config.embed_tokens_quota_per_day {
    state.metrics.quota_denial("embed_tokens");
    return Err(ApiError::QuotaEmbedTokens);
  }
  Ok(())
}
