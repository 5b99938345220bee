//! Entry types — the fundamental unit of the AgentOS memory store.
//!
//! An entry version is an immutable record of a JSON value at a path at a
//! moment in time. Versions are never updated; deletion appends a tombstone
//! version, and a per-path latest pointer tracks the newest version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Limits ──────────────────────────────────────────────────────────────────

/// Fixed embedding vector dimension.
pub const VECTOR_DIM: usize = 1536;

/// HISTORY page size cap and default.
pub const HISTORY_MAX: usize = 100;
pub const HISTORY_DEFAULT: usize = 20;

/// Row cap shared by LIST and GLOB.
pub const LISTING_CAP: usize = 500;

/// DUMP page size cap and default.
pub const DUMP_MAX: usize = 500;
pub const DUMP_DEFAULT: usize = 200;

/// SEARCH result cap and default.
pub const SEARCH_MAX: usize = 50;
pub const SEARCH_DEFAULT: usize = 10;

/// Maximum search query length, in characters.
pub const SEARCH_QUERY_MAX_CHARS: usize = 2000;

/// Maximum number of `tags_any` filter values on a search.
pub const SEARCH_TAGS_ANY_MAX: usize = 20;

/// Bounds applied to entry tags on write.
pub const TAGS_MAX: usize = 64;
pub const TAG_LEN_MAX: usize = 128;

/// Validate an agent identifier: `[A-Za-z0-9_-]{1,128}`.
pub fn validate_agent(agent: &str) -> Result<()> {
  let ok = !agent.is_empty()
    && agent.len() <= 128
    && agent
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
  if ok {
    Ok(())
  } else {
    Err(Error::InvalidAgent(agent.to_owned()))
  }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// Input for a PUT. `path` must already be normalized.
#[derive(Debug, Clone)]
pub struct NewEntry {
  pub agent:       String,
  pub path:        String,
  pub value:       Value,
  /// Derives `expires_at = now + ttl_seconds` when set.
  pub ttl_seconds: Option<u64>,
  pub tags:        Vec<String>,
  /// Relevance weight in `[0, 1]`.
  pub importance:  f64,
  /// Whether this version should get an embedding.
  pub searchable:  bool,
}

/// A persisted, immutable entry version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryVersion {
  pub version_id:   Uuid,
  pub tenant:       Uuid,
  pub agent:        String,
  pub path:         String,
  pub value:        Value,
  pub tags:         Vec<String>,
  pub importance:   f64,
  pub searchable:   bool,
  pub content_hash: String,
  pub created_at:   DateTime<Utc>,
  pub expires_at:   Option<DateTime<Utc>>,
  /// Non-null marks this version as a tombstone.
  pub deleted_at:   Option<DateTime<Utc>>,
}

impl EntryVersion {
  pub fn is_tombstone(&self) -> bool {
    self.deleted_at.is_some()
  }
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// The visible latest version of a path, as returned by GET and DUMP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibleEntry {
  pub path:       String,
  pub value:      Value,
  pub version_id: Uuid,
  pub created_at: DateTime<Utc>,
  pub expires_at: Option<DateTime<Utc>>,
  pub tags:       Vec<String>,
}

/// One version in a HISTORY response. Tombstones and expired versions are
/// included; the caller observes the full audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub version_id: Uuid,
  pub created_at: DateTime<Utc>,
  pub value:      Value,
  pub expires_at: Option<DateTime<Utc>>,
  pub deleted_at: Option<DateTime<Utc>>,
}

/// Whether a LIST child has further entries beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
  File,
  Dir,
}

/// One direct child in a LIST response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItem {
  pub path: String,
  #[serde(rename = "type")]
  pub kind: ListingKind,
}

/// One agent in an AGENTS response, with its count of visible entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
  pub id:           String,
  pub memory_count: i64,
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Backend filter for a similarity search. `path_prefix` is a normalized
/// literal prefix; LIKE escaping happens in the store.
#[derive(Debug, Clone)]
pub struct SearchFilter {
  pub agent:       String,
  pub vector:      Vec<f32>,
  pub limit:       usize,
  pub path_prefix: Option<String>,
}

/// One similarity search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
  pub path:       String,
  pub value:      Value,
  pub tags:       Vec<String>,
  pub similarity: f32,
  pub version_id: Uuid,
  pub created_at: DateTime<Utc>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
