//! The [`Embedder`] trait and the OpenAI-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard timeout on every outbound embedding call.
pub const EMBED_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors surfaced by an embedder.
///
/// Deliberately body-free: a provider's response body is never carried here,
/// so it can neither reach clients nor be persisted in job errors.
#[derive(Debug, Error)]
pub enum EmbedError {
  #[error("embedder is not configured")]
  NotConfigured,

  #[error("embedding request timed out")]
  Timeout,

  #[error("embedding provider returned status {status}")]
  Api { status: u16 },

  #[error("embedding response was malformed: {0}")]
  InvalidResponse(String),

  #[error("embedding transport error")]
  Transport(#[source] reqwest::Error),
}

/// An external service producing a fixed-dimension vector for a text input.
#[async_trait]
pub trait Embedder: Send + Sync {
  /// Model identifier recorded alongside stored vectors.
  fn model(&self) -> &str;

  /// Embed `text`, bounded by [`EMBED_TIMEOUT`].
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

// ─── OpenAI ──────────────────────────────────────────────────────────────────

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// OpenAI `/v1/embeddings` client.
pub struct OpenAiEmbedder {
  client:  reqwest::Client,
  api_key: String,
  model:   String,
  url:     String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
  embedding: Vec<f32>,
}

impl OpenAiEmbedder {
  pub fn new(api_key: String, model: String) -> Result<Self, EmbedError> {
    let client = reqwest::Client::builder()
      .timeout(EMBED_TIMEOUT)
      .build()
      .map_err(EmbedError::Transport)?;
    Ok(Self {
      client,
      api_key,
      model,
      url: OPENAI_EMBEDDINGS_URL.to_owned(),
    })
  }

  /// Point at a different endpoint — used by tests and proxies.
  pub fn with_url(mut self, url: String) -> Self {
    self.url = url;
    self
  }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
  fn model(&self) -> &str {
    &self.model
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    let response = self
      .client
      .post(&self.url)
      .bearer_auth(&self.api_key)
      .json(&EmbeddingRequest {
        model: &self.model,
        input: text,
      })
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          EmbedError::Timeout
        } else {
          EmbedError::Transport(e)
        }
      })?;

    let status = response.status();
    if !status.is_success() {
      // The body is dropped unread; only the status leaves this function.
      tracing::warn!(status = status.as_u16(), "embedding provider error");
      return Err(EmbedError::Api {
        status: status.as_u16(),
      });
    }

    let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
      if e.is_timeout() {
        EmbedError::Timeout
      } else {
        EmbedError::InvalidResponse("undecodable response".to_owned())
      }
    })?;

    let vector = parsed
      .data
      .into_iter()
      .next()
      .map(|d| d.embedding)
      .unwrap_or_default();
    if vector.is_empty() {
      return Err(EmbedError::InvalidResponse("empty vector".to_owned()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
      return Err(EmbedError::InvalidResponse(
        "non-finite vector component".to_owned(),
      ));
    }
    Ok(vector)
  }
}
