//! The embedding worker — claims queued jobs one at a time and turns them
//! into stored vectors.
//!
//! Claim exclusivity is delegated entirely to the store; the worker holds no
//! locks of its own. On failure the job returns to the queue with a bounded
//! error message and the worker sleeps `min(2^attempts, 32)` seconds before
//! claiming again; after [`MAX_ATTEMPTS`] the job fails terminally.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use agentos_core::{
  job::{ClaimedJob, MAX_ATTEMPTS, bound_error},
  store::{MemoryStore, utc_day},
};

use crate::{
  Embedder,
  text::{approx_tokens, build_embed_text},
};

/// Sleep between iterations when no job is claimable.
pub const IDLE_SLEEP: Duration = Duration::from_secs(1);

/// How a claimed job ended.
#[derive(Debug, Clone)]
pub enum JobOutcome {
  Succeeded { version_id: Uuid },
  Requeued { version_id: Uuid, attempts: i64 },
  Failed { version_id: Uuid },
}

/// One worker instance. Multiple workers may run against the same store;
/// the claim guarantees each job is processed by at most one of them per
/// attempt.
pub struct EmbedWorker<S> {
  store:    Arc<S>,
  embedder: Arc<dyn Embedder>,
  observer: Option<Arc<dyn Fn(&JobOutcome) + Send + Sync>>,
}

impl<S: MemoryStore> EmbedWorker<S> {
  pub fn new(store: Arc<S>, embedder: Arc<dyn Embedder>) -> Self {
    Self {
      store,
      embedder,
      observer: None,
    }
  }

  /// Register a callback invoked with every job outcome (metrics hook).
  pub fn with_observer(
    mut self,
    observer: Arc<dyn Fn(&JobOutcome) + Send + Sync>,
  ) -> Self {
    self.observer = Some(observer);
    self
  }

  /// Claim and process at most one job. Returns `None` when the queue had
  /// nothing claimable. `once` mode for tests is exactly one call of this.
  pub async fn run_once(&self) -> Result<Option<JobOutcome>, S::Error> {
    let Some(job) = self.store.claim_embedding_job().await? else {
      return Ok(None);
    };

    let outcome = match self.process(&job).await {
      Ok(()) => {
        self.store.complete_embedding_job(job.version_id).await?;
        JobOutcome::Succeeded {
          version_id: job.version_id,
        }
      }
      Err(message) => {
        let bounded = bound_error(&message);
        if job.attempts >= MAX_ATTEMPTS {
          tracing::error!(
            version_id = %job.version_id,
            attempts = job.attempts,
            error = %bounded,
            "embedding job failed terminally"
          );
          self
            .store
            .fail_embedding_job(job.version_id, &bounded)
            .await?;
          JobOutcome::Failed {
            version_id: job.version_id,
          }
        } else {
          tracing::warn!(
            version_id = %job.version_id,
            attempts = job.attempts,
            error = %bounded,
            "embedding job requeued"
          );
          self
            .store
            .requeue_embedding_job(job.version_id, &bounded)
            .await?;
          tokio::time::sleep(backoff(job.attempts)).await;
          JobOutcome::Requeued {
            version_id: job.version_id,
            attempts:   job.attempts,
          }
        }
      }
    };

    if let Some(observer) = &self.observer {
      observer(&outcome);
    }
    Ok(Some(outcome))
  }

  /// Run until `shutdown` flips true, sleeping [`IDLE_SLEEP`] when idle.
  pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
    loop {
      if *shutdown.borrow() {
        return;
      }
      match self.run_once().await {
        Ok(Some(_)) => {}
        Ok(None) => {
          tokio::select! {
            _ = tokio::time::sleep(IDLE_SLEEP) => {}
            _ = shutdown.changed() => {}
          }
        }
        Err(e) => {
          tracing::error!(error = %e, "embedding worker iteration failed");
          tokio::time::sleep(IDLE_SLEEP).await;
        }
      }
    }
  }

  /// Load the version, embed it, and store vector plus token usage.
  /// Errors are returned as short messages destined for `last_error`.
  async fn process(&self, job: &ClaimedJob) -> Result<(), String> {
    let source = self
      .store
      .embedding_source(job.version_id)
      .await
      .map_err(|e| format!("load version: {e}"))?
      .ok_or_else(|| "version not found".to_owned())?;

    let text = build_embed_text(&source.path, &source.value, &source.tags);
    let vector = self
      .embedder
      .embed(&text)
      .await
      .map_err(|e| e.to_string())?;
    if vector.is_empty() {
      return Err("empty embedding vector".to_owned());
    }

    self
      .store
      .record_embedding(
        source.tenant,
        job.version_id,
        &source.agent,
        &source.path,
        self.embedder.model(),
        &vector,
      )
      .await
      .map_err(|e| format!("store embedding: {e}"))?;

    let tokens = approx_tokens(&text);
    self
      .store
      .incr_embed_token_quota(source.tenant, &utc_day(Utc::now()), tokens)
      .await
      .map_err(|e| format!("record token usage: {e}"))?;

    Ok(())
  }
}

fn backoff(attempts: i64) -> Duration {
  let exp = attempts.clamp(0, 5) as u32;
  Duration::from_secs((1u64 << exp).min(32))
}
