//! API error type and the wire envelope.
//!
//! Every handler failure becomes an [`ApiError`]; the
//! [`axum::response::IntoResponse`] impl emits the
//! `{"error":{"code","message"}}` envelope plus flow-control headers. In
//! production mode 5xx detail is replaced wholesale by `INTERNAL` so nothing
//! internal leaks.

use std::sync::OnceLock;

use axum::{
  Json,
  http::{HeaderValue, StatusCode},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use agentos_embed::EmbedError;

static PRODUCTION: OnceLock<bool> = OnceLock::new();

/// Set once at startup; defaults to development (full 5xx detail).
pub fn set_production_mode(on: bool) {
  let _ = PRODUCTION.set(on);
}

fn production_mode() -> bool {
  *PRODUCTION.get().unwrap_or(&false)
}

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("missing or invalid credentials")]
  Unauthorized,

  #[error("key lacks the required scope")]
  Forbidden,

  #[error("too many failed authentication attempts")]
  AuthLockout { retry_after_secs: u64 },

  #[error("{0}")]
  Validation(String),

  #[error("{0}")]
  InvalidPath(String),

  #[error("path is reserved")]
  ReservedPath,

  #[error("{0}")]
  InvalidGlob(String),

  #[error("rate limit exceeded")]
  RateLimited { limit: u32, reset_epoch: i64 },

  #[error("rate limit exceeded")]
  PreAuthRateLimited {
    limit:            u32,
    retry_after_secs: u64,
    reset_epoch:      i64,
  },

  #[error("daily write quota exceeded")]
  QuotaWrites,

  #[error("daily search quota exceeded")]
  QuotaSearches,

  #[error("daily embedding token quota exceeded")]
  QuotaEmbedTokens,

  #[error("idempotency key must be 1-128 characters of [A-Za-z0-9_-]")]
  InvalidIdempotencyKey,

  #[error("idempotency key was already used with a different request body")]
  IdempotencyMismatch,

  #[error("embeddings are not configured")]
  EmbeddingsNotConfigured,

  #[error("Embeddings service temporarily unavailable")]
  EmbeddingsUpstream,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("{0}")]
  Internal(String),
}

impl ApiError {
  /// Wrap a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    ApiError::Store(Box::new(e))
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::Forbidden | ApiError::ReservedPath => StatusCode::FORBIDDEN,
      ApiError::AuthLockout { .. }
      | ApiError::RateLimited { .. }
      | ApiError::PreAuthRateLimited { .. }
      | ApiError::QuotaWrites
      | ApiError::QuotaSearches
      | ApiError::QuotaEmbedTokens => StatusCode::TOO_MANY_REQUESTS,
      ApiError::Validation(_)
      | ApiError::InvalidPath(_)
      | ApiError::InvalidGlob(_)
      | ApiError::InvalidIdempotencyKey => StatusCode::BAD_REQUEST,
      ApiError::IdempotencyMismatch => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::EmbeddingsNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::EmbeddingsUpstream => StatusCode::BAD_GATEWAY,
      ApiError::Store(_) | ApiError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      ApiError::Unauthorized => "UNAUTHORIZED",
      ApiError::Forbidden => "FORBIDDEN",
      ApiError::AuthLockout { .. } => "AUTH_LOCKOUT",
      ApiError::Validation(_) => "VALIDATION_ERROR",
      ApiError::InvalidPath(_) => "INVALID_PATH",
      ApiError::ReservedPath => "RESERVED_PATH",
      ApiError::InvalidGlob(_) => "INVALID_GLOB",
      ApiError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
      ApiError::PreAuthRateLimited { .. } => "PREAUTH_RATE_LIMIT_EXCEEDED",
      ApiError::QuotaWrites => "QUOTA_WRITES_PER_DAY",
      ApiError::QuotaSearches => "QUOTA_SEARCHES",
      ApiError::QuotaEmbedTokens => "QUOTA_EMBED_TOKENS_PER_DAY",
      ApiError::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
      ApiError::IdempotencyMismatch => "IDEMPOTENCY_KEY_MISMATCH",
      ApiError::EmbeddingsNotConfigured => "EMBEDDINGS_NOT_CONFIGURED",
      ApiError::EmbeddingsUpstream => "EMBEDDINGS_API_ERROR",
      ApiError::Store(_) | ApiError::Internal(_) => "INTERNAL",
    }
  }
}

impl From<agentos_core::Error> for ApiError {
  fn from(e: agentos_core::Error) -> Self {
    match e {
      agentos_core::Error::InvalidPath(m) => ApiError::InvalidPath(m),
      agentos_core::Error::ReservedPath(_) => ApiError::ReservedPath,
      agentos_core::Error::InvalidGlob(m) => ApiError::InvalidGlob(m),
      agentos_core::Error::InvalidAgent(a) => {
        ApiError::Validation(format!("invalid agent id: {a:?}"))
      }
      agentos_core::Error::Serialization(e) => ApiError::Internal(e.to_string()),
    }
  }
}

impl From<EmbedError> for ApiError {
  fn from(e: EmbedError) -> Self {
    match e {
      EmbedError::NotConfigured => ApiError::EmbeddingsNotConfigured,
      // Status is logged at the embedder; clients get the generic message.
      _ => ApiError::EmbeddingsUpstream,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();

    let (code, message) = if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
      if production_mode() {
        ("INTERNAL", "Internal error".to_owned())
      } else {
        (self.code(), self.to_string())
      }
    } else {
      (self.code(), self.to_string())
    };

    let mut response =
      (status, Json(json!({ "error": { "code": code, "message": message } })))
        .into_response();

    let headers = response.headers_mut();
    match &self {
      ApiError::AuthLockout { retry_after_secs } => {
        if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
          headers.insert("Retry-After", v);
        }
      }
      ApiError::RateLimited { limit, reset_epoch } => {
        if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
          headers.insert("X-RateLimit-Limit", v);
        }
        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
        if let Ok(v) = HeaderValue::from_str(&reset_epoch.to_string()) {
          headers.insert("X-RateLimit-Reset", v);
        }
      }
      ApiError::PreAuthRateLimited {
        limit,
        retry_after_secs,
        reset_epoch,
      } => {
        if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
          headers.insert("X-PreAuth-RateLimit-Limit", v);
        }
        headers
          .insert("X-PreAuth-RateLimit-Remaining", HeaderValue::from_static("0"));
        if let Ok(v) = HeaderValue::from_str(&reset_epoch.to_string()) {
          headers.insert("X-PreAuth-RateLimit-Reset", v);
        }
        if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
          headers.insert("Retry-After", v);
        }
      }
      _ => {}
    }

    response
  }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
