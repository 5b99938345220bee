//! Embedding job types.
//!
//! One job row per entry version, keyed by `version_id`. Workers claim jobs
//! with an at-most-one conditional update and retry with exponential backoff
//! up to [`MAX_ATTEMPTS`].

use serde_json::Value;
use uuid::Uuid;

/// Terminal failure threshold for a job.
pub const MAX_ATTEMPTS: i64 = 5;

/// Upper bound on stored `last_error` text. Upstream response bodies are
/// never stored; this bounds even our own messages.
pub const LAST_ERROR_MAX: usize = 256;

/// Embedding job state machine:
/// `queued → running → done` (or back to `queued` with `attempts` bumped,
/// or terminal `failed` once attempts are exhausted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
  Queued,
  Running,
  Succeeded,
  Failed,
  Done,
}

impl JobStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      JobStatus::Queued => "queued",
      JobStatus::Running => "running",
      JobStatus::Succeeded => "succeeded",
      JobStatus::Failed => "failed",
      JobStatus::Done => "done",
    }
  }

  pub fn parse(s: &str) -> Option<JobStatus> {
    match s {
      "queued" => Some(JobStatus::Queued),
      "running" => Some(JobStatus::Running),
      "succeeded" => Some(JobStatus::Succeeded),
      "failed" => Some(JobStatus::Failed),
      "done" => Some(JobStatus::Done),
      _ => None,
    }
  }
}

/// A job handed to a worker by a successful claim. `attempts` includes the
/// claim that produced this value.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
  pub version_id: Uuid,
  pub attempts:   i64,
}

/// A job row as read back for inspection (worker bookkeeping, admin views).
#[derive(Debug, Clone)]
pub struct JobRecord {
  pub version_id: Uuid,
  pub status:     JobStatus,
  pub attempts:   i64,
  pub last_error: Option<String>,
}

/// The version payload a worker embeds, loaded after the claim.
#[derive(Debug, Clone)]
pub struct EmbeddingSource {
  pub tenant: Uuid,
  pub agent:  String,
  pub path:   String,
  pub value:  Value,
  pub tags:   Vec<String>,
}

/// Truncate an error message for the `last_error` column.
pub fn bound_error(message: &str) -> String {
  if message.len() <= LAST_ERROR_MAX {
    message.to_owned()
  } else {
    let mut end = LAST_ERROR_MAX;
    while !message.is_char_boundary(end) {
      end -= 1;
    }
    message[..end].to_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_round_trips() {
    for status in [
      JobStatus::Queued,
      JobStatus::Running,
      JobStatus::Succeeded,
      JobStatus::Failed,
      JobStatus::Done,
    ] {
      assert_eq!(JobStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(JobStatus::parse("bogus"), None);
  }

  #[test]
  fn bound_error_truncates_on_char_boundary() {
    let long = "é".repeat(LAST_ERROR_MAX);
    let bounded = bound_error(&long);
    assert!(bounded.len() <= LAST_ERROR_MAX);
    assert!(long.starts_with(&bounded));
  }
}
