//! Error type for `agentos-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] agentos_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored embedding vector blob had an unexpected shape.
  #[error("vector decode error: {0}")]
  VectorDecode(String),

  /// A stored scope or job status string was not recognized.
  #[error("unknown enum value: {0:?}")]
  UnknownValue(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
