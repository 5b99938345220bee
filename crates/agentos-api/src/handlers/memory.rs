//! Handlers for the write/read core: PUT, GET, DELETE, HISTORY.

use axum::{
  Json,
  extract::State,
  http::HeaderMap,
  response::Response,
};
use serde::Deserialize;
use serde_json::{Value, json};

use agentos_core::{
  auth::Scope,
  entry::{
    HISTORY_DEFAULT, HISTORY_MAX, NewEntry, TAG_LEN_MAX, TAGS_MAX,
    validate_agent,
  },
  job::bound_error,
  path::{is_reserved, normalize_path},
  store::MemoryStore,
};
use agentos_embed::text::{approx_tokens, build_embed_text};

use crate::{
  AppState,
  error::ApiError,
  handlers::{
    charge_embed_tokens, charge_write_quota, gate, parse_body,
    with_rate_headers,
  },
  idempotency,
};

// ─── PUT ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PutBody {
  pub agent_id:    String,
  pub path:        String,
  pub value:       Value,
  pub ttl_seconds: Option<u64>,
  #[serde(default)]
  pub tags:        Vec<String>,
  pub importance:  Option<f64>,
  #[serde(default)]
  pub searchable:  bool,
}

fn validate_tags(tags: &[String]) -> Result<(), ApiError> {
  if tags.len() > TAGS_MAX {
    return Err(ApiError::Validation(format!(
      "at most {TAGS_MAX} tags per entry"
    )));
  }
  if tags.iter().any(|t| t.is_empty() || t.len() > TAG_LEN_MAX) {
    return Err(ApiError::Validation(format!(
      "tags must be 1-{TAG_LEN_MAX} bytes"
    )));
  }
  Ok(())
}

/// `POST /v1/put`
pub async fn put<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(raw): Json<Value>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let gate = gate(&state, &headers, "put", &[Scope::MemoryWrite]).await?;
  let tenant = gate.context.tenant;

  // Quota is charged ahead of the idempotency lookup and input validation;
  // replayed and rejected requests still count as writes. Byte accounting
  // reads the raw body since the typed parse happens later.
  let bytes = raw
    .get("value")
    .map(|v| v.to_string().len() as i64)
    .unwrap_or(0);
  charge_write_quota(&state, tenant, bytes).await?;

  let idem_key = idempotency::key_from_headers(&headers)?;
  if let Some(key) = &idem_key
    && let Some(cached) =
      idempotency::lookup(state.store.as_ref(), tenant, key, &raw).await?
  {
    return Ok(with_rate_headers(&gate.rate, cached));
  }

  let body: PutBody = parse_body(raw.clone())?;
  validate_agent(&body.agent_id)?;
  let path = normalize_path(&body.path)?;
  if is_reserved(&path) {
    return Err(ApiError::ReservedPath);
  }
  let importance = body.importance.unwrap_or(0.5);
  if !(0.0..=1.0).contains(&importance) {
    return Err(ApiError::Validation(
      "importance must be within [0, 1]".into(),
    ));
  }
  validate_tags(&body.tags)?;

  // Inline embedding consumes provider tokens, so its quota is charged
  // before any row is written.
  let inline_embed = body.searchable && state.embedder.is_some();
  if inline_embed {
    let text = build_embed_text(&path, &body.value, &body.tags);
    charge_embed_tokens(&state, tenant, approx_tokens(&text)).await?;
  }

  let version = state
    .store
    .put_entry(tenant, NewEntry {
      agent: body.agent_id,
      path,
      value: body.value,
      ttl_seconds: body.ttl_seconds,
      tags: body.tags,
      importance,
      searchable: body.searchable,
    })
    .await
    .map_err(ApiError::store)?;

  if body.searchable {
    match &state.embedder {
      Some(embedder) => {
        let text =
          build_embed_text(&version.path, &version.value, &version.tags);
        let attempt = embedder.embed(&text).await;
        match attempt {
          Ok(vector) if !vector.is_empty() => {
            state
              .store
              .record_embedding(
                tenant,
                version.version_id,
                &version.agent,
                &version.path,
                embedder.model(),
                &vector,
              )
              .await
              .map_err(ApiError::store)?;
            state
              .store
              .complete_embedding_job(version.version_id)
              .await
              .map_err(ApiError::store)?;
          }
          Ok(_) => {
            state
              .store
              .enqueue_embedding_job(
                version.version_id,
                Some("empty embedding vector".into()),
              )
              .await
              .map_err(ApiError::store)?;
          }
          Err(e) => {
            // The write itself succeeded; the worker will retry the vector.
            state
              .store
              .enqueue_embedding_job(
                version.version_id,
                Some(bound_error(&e.to_string())),
              )
              .await
              .map_err(ApiError::store)?;
          }
        }
      }
      None => {
        state
          .store
          .enqueue_embedding_job(version.version_id, None)
          .await
          .map_err(ApiError::store)?;
      }
    }
  }

  state.dump_cache.invalidate(tenant, &version.agent);

  let response = json!({
    "ok": true,
    "version_id": version.version_id,
    "created_at": version.created_at,
  });
  if let Some(key) = &idem_key {
    idempotency::store_response(state.store.as_ref(), tenant, key, &raw, &response)
      .await?;
  }
  Ok(with_rate_headers(&gate.rate, response))
}

// ─── GET ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GetBody {
  pub agent_id: String,
  pub path:     String,
}

/// `POST /v1/get`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(body): Json<GetBody>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let gate = gate(&state, &headers, "get", &[Scope::MemoryRead]).await?;
  validate_agent(&body.agent_id)?;
  let path = normalize_path(&body.path)?;

  let found = state
    .store
    .get_entry(gate.context.tenant, &body.agent_id, &path)
    .await
    .map_err(ApiError::store)?;

  let response = match found {
    None => json!({ "found": false }),
    Some(entry) => json!({
      "found": true,
      "path": entry.path,
      "value": entry.value,
      "version_id": entry.version_id,
      "created_at": entry.created_at,
      "expires_at": entry.expires_at,
      "tags": entry.tags,
    }),
  };
  Ok(with_rate_headers(&gate.rate, response))
}

// ─── DELETE ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
  pub agent_id: String,
  pub path:     String,
}

/// `POST /v1/delete` — appends a tombstone; repeatable.
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(raw): Json<Value>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let gate = gate(&state, &headers, "delete", &[Scope::MemoryWrite]).await?;
  let tenant = gate.context.tenant;

  // Deletes carry no payload; they count one write at zero bytes, charged
  // ahead of the idempotency lookup and input validation.
  charge_write_quota(&state, tenant, 0).await?;

  let idem_key = idempotency::key_from_headers(&headers)?;
  if let Some(key) = &idem_key
    && let Some(cached) =
      idempotency::lookup(state.store.as_ref(), tenant, key, &raw).await?
  {
    return Ok(with_rate_headers(&gate.rate, cached));
  }

  let body: DeleteBody = parse_body(raw.clone())?;
  validate_agent(&body.agent_id)?;
  let path = normalize_path(&body.path)?;
  if is_reserved(&path) {
    return Err(ApiError::ReservedPath);
  }

  let tombstone = state
    .store
    .delete_entry(tenant, &body.agent_id, &path)
    .await
    .map_err(ApiError::store)?;

  state.dump_cache.invalidate(tenant, &body.agent_id);

  let response = json!({
    "ok": true,
    "deleted": true,
    "version_id": tombstone.version_id,
    "created_at": tombstone.created_at,
  });
  if let Some(key) = &idem_key {
    idempotency::store_response(state.store.as_ref(), tenant, key, &raw, &response)
      .await?;
  }
  Ok(with_rate_headers(&gate.rate, response))
}

// ─── HISTORY ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryBody {
  pub agent_id: String,
  pub path:     String,
  pub limit:    Option<usize>,
}

/// `POST /v1/history` — the audit trail, tombstones and expired included.
pub async fn history<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(body): Json<HistoryBody>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let gate = gate(&state, &headers, "history", &[Scope::MemoryRead]).await?;
  validate_agent(&body.agent_id)?;
  let path = normalize_path(&body.path)?;
  let limit = body.limit.unwrap_or(HISTORY_DEFAULT).clamp(1, HISTORY_MAX);

  let versions = state
    .store
    .history(gate.context.tenant, &body.agent_id, &path, limit)
    .await
    .map_err(ApiError::store)?;

  Ok(with_rate_headers(&gate.rate, json!({ "versions": versions })))
}
