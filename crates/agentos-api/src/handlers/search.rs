//! Handler for `POST /v1/search` — vector-similarity search over an agent's
//! visible, embedded entries.

use axum::{Json, extract::State, http::HeaderMap, response::Response};
use serde::Deserialize;
use serde_json::json;

use agentos_core::{
  auth::Scope,
  entry::{
    SEARCH_DEFAULT, SEARCH_MAX, SEARCH_QUERY_MAX_CHARS, SEARCH_TAGS_ANY_MAX,
    SearchFilter, validate_agent,
  },
  path::MAX_PATH_BYTES,
  store::MemoryStore,
};

use crate::{
  AppState,
  error::ApiError,
  handlers::{charge_search_quota, gate, with_rate_headers},
};

#[derive(Debug, Deserialize)]
pub struct SearchBody {
  pub agent_id:    String,
  pub query:       String,
  pub limit:       Option<usize>,
  pub path_prefix: Option<String>,
  #[serde(default)]
  pub tags_any:    Vec<String>,
}

/// `POST /v1/search`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(body): Json<SearchBody>,
) -> Result<Response, ApiError>
where
  S: MemoryStore + 'static,
{
  let gate = gate(&state, &headers, "search", &[Scope::SearchRead]).await?;
  let tenant = gate.context.tenant;

  validate_agent(&body.agent_id)?;
  if body.query.chars().count() > SEARCH_QUERY_MAX_CHARS {
    return Err(ApiError::Validation(format!(
      "query exceeds {SEARCH_QUERY_MAX_CHARS} characters"
    )));
  }
  if let Some(prefix) = &body.path_prefix
    && prefix.len() > MAX_PATH_BYTES
  {
    return Err(ApiError::Validation(format!(
      "path_prefix exceeds {MAX_PATH_BYTES} bytes"
    )));
  }
  if body.tags_any.len() > SEARCH_TAGS_ANY_MAX {
    return Err(ApiError::Validation(format!(
      "at most {SEARCH_TAGS_ANY_MAX} tags_any values"
    )));
  }
  let limit = body.limit.unwrap_or(SEARCH_DEFAULT).clamp(1, SEARCH_MAX);

  charge_search_quota(&state, tenant).await?;

  let Some(embedder) = &state.embedder else {
    return Ok(with_rate_headers(
      &gate.rate,
      json!({ "results": [], "note": "semantic search is not configured" }),
    ));
  };

  let vector = embedder.embed(&body.query).await?;

  let mut hits = state
    .store
    .search_similar(tenant, &SearchFilter {
      agent: body.agent_id,
      vector,
      limit,
      path_prefix: body.path_prefix,
    })
    .await
    .map_err(ApiError::store)?;

  if !body.tags_any.is_empty() {
    hits.retain(|hit| hit.tags.iter().any(|t| body.tags_any.contains(t)));
  }

  Ok(with_rate_headers(&gate.rate, json!({ "results": hits })))
}
