//! JSON/HTTP API for AgentOS.
//!
//! Exposes an axum [`Router`] backed by any
//! [`agentos_core::store::MemoryStore`]. Every `/v1/*` request passes the
//! ordered pipeline: pre-auth IP limiter → bearer auth → scope check →
//! endpoint rate limit → quota → idempotency → validation → handler.
//! TLS and transport concerns are the caller's responsibility.

pub mod auth;
pub mod dump_cache;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod metrics;
pub mod ratelimit;

use std::{sync::Arc, time::Instant};

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Request, State},
  http::{HeaderMap, StatusCode, header},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use agentos_core::store::MemoryStore;
use agentos_embed::Embedder;

use auth::AuthGate;
use dump_cache::DumpCache;
pub use error::{ApiError, set_production_mode};
use metrics::Metrics;
use ratelimit::RateLimits;

/// Request body cap: 1 MiB.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime API configuration; the server binary populates this from the
/// environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  /// Production mode replaces 5xx detail with an opaque `INTERNAL` error.
  pub production:                  bool,
  /// Honor `X-Forwarded-For` for the pre-auth limiter.
  pub trust_proxy:                 bool,
  pub enable_metrics:              bool,
  pub metrics_token:               Option<String>,
  pub admin_bootstrap_token:       Option<String>,
  pub write_quota_per_day:         i64,
  pub embed_tokens_quota_per_day:  i64,
  pub search_quota_per_day:        i64,
  pub rate_limit_per_minute:       u32,
  pub search_rate_limit_per_minute: u32,
  pub admin_rate_limit_per_minute: u32,
  pub preauth_rate_limit_per_minute: u32,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      production:                  false,
      trust_proxy:                 false,
      enable_metrics:              false,
      metrics_token:               None,
      admin_bootstrap_token:       None,
      write_quota_per_day:         20_000,
      embed_tokens_quota_per_day:  1_000_000,
      search_quota_per_day:        5_000,
      rate_limit_per_minute:       120,
      search_rate_limit_per_minute: 60,
      admin_rate_limit_per_minute: 10,
      preauth_rate_limit_per_minute: 300,
    }
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:      Arc<S>,
  pub embedder:   Option<Arc<dyn Embedder>>,
  pub config:     Arc<ApiConfig>,
  pub auth:       Arc<AuthGate>,
  pub limits:     Arc<RateLimits>,
  pub dump_cache: Arc<DumpCache>,
  pub metrics:    Arc<Metrics>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      self.store.clone(),
      embedder:   self.embedder.clone(),
      config:     self.config.clone(),
      auth:       self.auth.clone(),
      limits:     self.limits.clone(),
      dump_cache: self.dump_cache.clone(),
      metrics:    self.metrics.clone(),
    }
  }
}

impl<S> AppState<S> {
  pub fn new(
    store: Arc<S>,
    embedder: Option<Arc<dyn Embedder>>,
    config: ApiConfig,
  ) -> Self {
    set_production_mode(config.production);
    Self {
      store,
      embedder,
      config: Arc::new(config),
      auth: Arc::new(AuthGate::new()),
      limits: Arc::new(RateLimits::new()),
      dump_cache: Arc::new(DumpCache::new()),
      metrics: Arc::new(Metrics::new()),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full application router: `/v1/*`, `/healthz`, `/metrics`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: MemoryStore + 'static,
{
  let v1 = Router::new()
    .route("/v1/put", post(handlers::memory::put::<S>))
    .route("/v1/get", post(handlers::memory::get_one::<S>))
    .route("/v1/delete", post(handlers::memory::delete::<S>))
    .route("/v1/history", post(handlers::memory::history::<S>))
    .route("/v1/list", post(handlers::listing::list::<S>))
    .route("/v1/glob", post(handlers::listing::glob::<S>))
    .route("/v1/dump", post(handlers::listing::dump::<S>))
    .route("/v1/agents", post(handlers::listing::agents::<S>))
    .route("/v1/search", post(handlers::search::handler::<S>))
    .route("/v1/admin/create-key", post(handlers::admin::create_key::<S>))
    .route(
      "/v1/admin/requeue-jobs",
      post(handlers::admin::requeue_jobs::<S>),
    )
    .layer(middleware::from_fn_with_state(
      state.clone(),
      ratelimit::preauth_middleware::<S>,
    ));

  Router::new()
    .merge(v1)
    .route("/healthz", get(healthz))
    .route("/metrics", get(metrics_handler::<S>))
    .layer(middleware::from_fn_with_state(
      state.clone(),
      track_requests::<S>,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
    .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
  Json(json!({ "ok": true }))
}

/// Prometheus exposition, enabled by configuration and gated by a bearer
/// token compared in constant time.
async fn metrics_handler<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
) -> Response
where
  S: MemoryStore + 'static,
{
  if !state.config.enable_metrics {
    return StatusCode::NOT_FOUND.into_response();
  }
  let Some(expected) = &state.config.metrics_token else {
    return StatusCode::NOT_FOUND.into_response();
  };

  let presented = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .unwrap_or("");
  if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
    return ApiError::Unauthorized.into_response();
  }

  (
    StatusCode::OK,
    [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
    state.metrics.render(),
  )
    .into_response()
}

/// Request counter/duration middleware over every route.
async fn track_requests<S>(
  State(state): State<AppState<S>>,
  request: Request,
  next: Next,
) -> Response
where
  S: MemoryStore + 'static,
{
  let started = Instant::now();
  let endpoint = endpoint_label(request.uri().path());
  let response = next.run(request).await;
  state
    .metrics
    .observe_request(endpoint, response.status().as_u16(), started);
  response
}

/// Fixed label set — unknown paths share one label so 404 scans cannot
/// inflate metric cardinality.
fn endpoint_label(path: &str) -> &'static str {
  match path {
    "/v1/put" => "put",
    "/v1/get" => "get",
    "/v1/delete" => "delete",
    "/v1/history" => "history",
    "/v1/list" => "list",
    "/v1/glob" => "glob",
    "/v1/dump" => "dump",
    "/v1/agents" => "agents",
    "/v1/search" => "search",
    "/v1/admin/create-key" => "admin_create_key",
    "/v1/admin/requeue-jobs" => "admin_requeue_jobs",
    "/healthz" => "healthz",
    "/metrics" => "metrics",
    _ => "other",
  }
}

/// Length-safe constant-time byte comparison for token checks.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  let mut diff = 0u8;
  for (x, y) in a.iter().zip(b) {
    diff |= x ^ y;
  }
  diff == 0
}
