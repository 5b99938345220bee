//! Error types for `agentos-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid path: {0}")]
  InvalidPath(String),

  #[error("reserved path: {0}")]
  ReservedPath(String),

  #[error("invalid glob pattern: {0}")]
  InvalidGlob(String),

  #[error("invalid agent id: {0:?}")]
  InvalidAgent(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
