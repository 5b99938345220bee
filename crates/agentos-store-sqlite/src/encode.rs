//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 UTC strings with microsecond precision and a `Z`
//! suffix, so lexicographic order matches time order and expiry comparisons
//! can run as string comparisons in SQL. UUIDs are hyphenated lowercase.
//! Tags and scopes are compact JSON arrays; vectors are little-endian `f32`
//! blobs.

use agentos_core::{
  auth::{ApiKeyRecord, Scope},
  entry::{HistoryEntry, VisibleEntry},
  job::{EmbeddingSource, JobRecord, JobStatus},
};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_dt_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Tags ────────────────────────────────────────────────────────────────────

pub fn encode_tags(tags: &[String]) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

pub fn decode_tags(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Scopes ──────────────────────────────────────────────────────────────────

pub fn encode_scopes(scopes: &[Scope]) -> Result<String> {
  let names: Vec<&str> = scopes.iter().map(|s| s.as_str()).collect();
  Ok(serde_json::to_string(&names)?)
}

pub fn decode_scopes(s: &str) -> Result<Vec<Scope>> {
  let names: Vec<String> = serde_json::from_str(s)?;
  names
    .iter()
    .map(|n| Scope::parse(n).ok_or_else(|| Error::UnknownValue(n.clone())))
    .collect()
}

// ─── Job status ──────────────────────────────────────────────────────────────

pub fn decode_job_status(s: &str) -> Result<JobStatus> {
  JobStatus::parse(s).ok_or_else(|| Error::UnknownValue(s.to_owned()))
}

// ─── Vectors ─────────────────────────────────────────────────────────────────

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
  let mut out = Vec::with_capacity(vector.len() * 4);
  for component in vector {
    out.extend_from_slice(&component.to_le_bytes());
  }
  out
}

pub fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
  if blob.len() % 4 != 0 {
    return Err(Error::VectorDecode(format!(
      "blob length {} is not a multiple of 4",
      blob.len()
    )));
  }
  Ok(
    blob
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read from a latest-pointer join for GET and DUMP.
pub struct RawVisible {
  pub path:       String,
  pub value_json: String,
  pub version_id: String,
  pub created_at: String,
  pub expires_at: Option<String>,
  pub tags:       String,
}

impl RawVisible {
  pub fn into_visible(self) -> Result<VisibleEntry> {
    Ok(VisibleEntry {
      path:       self.path,
      value:      serde_json::from_str(&self.value_json)?,
      version_id: decode_uuid(&self.version_id)?,
      created_at: decode_dt(&self.created_at)?,
      expires_at: decode_dt_opt(self.expires_at.as_deref())?,
      tags:       decode_tags(&self.tags)?,
    })
  }
}

/// Raw strings read from an `entry_versions` row for HISTORY.
pub struct RawHistory {
  pub version_id: String,
  pub created_at: String,
  pub value_json: String,
  pub expires_at: Option<String>,
  pub deleted_at: Option<String>,
}

impl RawHistory {
  pub fn into_history(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      version_id: decode_uuid(&self.version_id)?,
      created_at: decode_dt(&self.created_at)?,
      value:      serde_json::from_str(&self.value_json)?,
      expires_at: decode_dt_opt(self.expires_at.as_deref())?,
      deleted_at: decode_dt_opt(self.deleted_at.as_deref())?,
    })
  }
}

/// Raw strings read from an `api_keys` row.
pub struct RawApiKey {
  pub key_id:      String,
  pub tenant_id:   String,
  pub secret_hash: String,
  pub scopes:      String,
  pub label:       Option<String>,
  pub created_at:  String,
  pub revoked_at:  Option<String>,
}

impl RawApiKey {
  pub fn into_record(self) -> Result<ApiKeyRecord> {
    Ok(ApiKeyRecord {
      key_id:      self.key_id,
      tenant:      decode_uuid(&self.tenant_id)?,
      secret_hash: self.secret_hash,
      scopes:      decode_scopes(&self.scopes)?,
      label:       self.label,
      created_at:  decode_dt(&self.created_at)?,
      revoked_at:  decode_dt_opt(self.revoked_at.as_deref())?,
    })
  }
}

/// Raw strings read from an `embedding_jobs` row.
pub struct RawJob {
  pub version_id: String,
  pub status:     String,
  pub attempts:   i64,
  pub last_error: Option<String>,
}

impl RawJob {
  pub fn into_record(self) -> Result<JobRecord> {
    Ok(JobRecord {
      version_id: decode_uuid(&self.version_id)?,
      status:     decode_job_status(&self.status)?,
      attempts:   self.attempts,
      last_error: self.last_error,
    })
  }
}

/// Raw strings read from an `entry_versions` row for the embedding worker.
pub struct RawEmbeddingSource {
  pub tenant_id:  String,
  pub agent:      String,
  pub path:       String,
  pub value_json: String,
  pub tags:       String,
}

impl RawEmbeddingSource {
  pub fn into_source(self) -> Result<EmbeddingSource> {
    Ok(EmbeddingSource {
      tenant: decode_uuid(&self.tenant_id)?,
      agent:  self.agent,
      path:   self.path,
      value:  serde_json::from_str(&self.value_json)?,
      tags:   decode_tags(&self.tags)?,
    })
  }
}
