//! Handlers for LIST, GLOB, DUMP, and AGENTS.

use axum::{
  Json,
  extract::State,
  http::{HeaderMap, HeaderValue},
  response::Response,
};
use serde::Deserialize;
use serde_json::{Value, json};

use agentos_core::{
  auth::Scope,
  entry::{DUMP_DEFAULT, DUMP_MAX, validate_agent},
  path::{direct_children, normalize_path, validate_glob},
  store::MemoryStore,
};

use crate::{
  AppState,
  error::ApiError,
  handlers::{gate, with_rate_headers},
};

// ─── LIST ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListBody {
  pub agent_id: String,
  pub prefix:   String,
}

/// `POST /v1/list` — direct children of a prefix, classified file/dir.
pub async fn list<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(body): Json<ListBody>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let gate = gate(&state, &headers, "list", &[Scope::MemoryRead]).await?;
  validate_agent(&body.agent_id)?;
  let prefix = normalize_path(&body.prefix)?;

  let paths = state
    .store
    .list_paths(gate.context.tenant, &body.agent_id, &prefix)
    .await
    .map_err(ApiError::store)?;
  let items = direct_children(&prefix, &paths);

  Ok(with_rate_headers(&gate.rate, json!({ "items": items })))
}

// ─── GLOB ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GlobBody {
  pub agent_id: String,
  pub pattern:  String,
}

/// `POST /v1/glob` — paths matching a glob, ascending, capped.
pub async fn glob<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(body): Json<GlobBody>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let gate = gate(&state, &headers, "glob", &[Scope::MemoryRead]).await?;
  validate_agent(&body.agent_id)?;
  validate_glob(&body.pattern)?;

  let paths = state
    .store
    .glob_paths(gate.context.tenant, &body.agent_id, &body.pattern)
    .await
    .map_err(ApiError::store)?;

  Ok(with_rate_headers(&gate.rate, json!({ "paths": paths })))
}

// ─── DUMP ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DumpBody {
  pub agent_id: String,
  pub limit:    Option<usize>,
}

/// `POST /v1/dump` — all visible entries for an agent, served from a 60 s
/// cache when possible; `X-Cache` reports which.
pub async fn dump<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(body): Json<DumpBody>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let gate = gate(&state, &headers, "dump", &[Scope::MemoryRead]).await?;
  let tenant = gate.context.tenant;
  validate_agent(&body.agent_id)?;
  let limit = body.limit.unwrap_or(DUMP_DEFAULT).clamp(1, DUMP_MAX);

  if let Some(cached) = state.dump_cache.get(tenant, &body.agent_id, limit) {
    state.metrics.dump_cache_result(true);
    return Ok(tag_cache(with_rate_headers(&gate.rate, cached), true));
  }
  state.metrics.dump_cache_result(false);

  let entries = state
    .store
    .dump(tenant, &body.agent_id, limit)
    .await
    .map_err(ApiError::store)?;
  let count = entries.len();
  let response = json!({ "entries": entries, "count": count });
  state
    .dump_cache
    .insert(tenant, &body.agent_id, limit, response.clone());

  Ok(tag_cache(with_rate_headers(&gate.rate, response), false))
}

fn tag_cache(mut response: Response, hit: bool) -> Response {
  let value = if hit { "HIT" } else { "MISS" };
  response
    .headers_mut()
    .insert("X-Cache", HeaderValue::from_static(value));
  response
}

// ─── AGENTS ──────────────────────────────────────────────────────────────────

/// `POST /v1/agents` — distinct agents with visible-entry counts.
pub async fn agents<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(_body): Json<Value>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let gate = gate(&state, &headers, "agents", &[Scope::MemoryRead]).await?;

  let agents = state
    .store
    .agents(gate.context.tenant)
    .await
    .map_err(ApiError::store)?;

  Ok(with_rate_headers(&gate.rate, json!({ "agents": agents })))
}
