//! The `MemoryStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `agentos-store-sqlite`).
//! Higher layers (`agentos-api`, `agentos-embed`) depend on this abstraction,
//! not on any concrete backend.
//!
//! Every data-plane method takes the owning `tenant` as an explicit
//! parameter; backends must bind it as a query parameter on every statement.
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes (tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  auth::ApiKeyRecord,
  entry::{
    AgentSummary, EntryVersion, HistoryEntry, NewEntry, SearchFilter,
    SearchHit, VisibleEntry,
  },
  job::{ClaimedJob, EmbeddingSource, JobRecord, JobStatus},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Per-tenant write counters after an increment, for limit checks.
#[derive(Debug, Clone, Copy)]
pub struct WriteQuotaAfter {
  pub writes: i64,
  pub bytes:  i64,
}

/// A cached idempotent response.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
  pub request_hash: String,
  pub response:     Value,
  pub expires_at:   DateTime<Utc>,
}

/// Format a timestamp as the UTC-day quota bucket key.
pub fn utc_day(t: DateTime<Utc>) -> String {
  t.format("%Y-%m-%d").to_string()
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an AgentOS storage backend.
///
/// Entry versions are append-only; nothing updates or deletes a version row.
/// Deletion appends a tombstone, and the latest pointer for the
/// `(tenant, agent, path)` triple moves atomically with every insert.
pub trait MemoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Entries ───────────────────────────────────────────────────────────

  /// Append a new version and move the latest pointer to it, atomically.
  /// Computes `content_hash` and `expires_at`; does not touch the job queue.
  fn put_entry(
    &self,
    tenant: Uuid,
    input: NewEntry,
  ) -> impl Future<Output = Result<EntryVersion, Self::Error>> + Send + '_;

  /// Append a tombstone version and move the latest pointer to it.
  fn delete_entry<'a>(
    &'a self,
    tenant: Uuid,
    agent: &'a str,
    path: &'a str,
  ) -> impl Future<Output = Result<EntryVersion, Self::Error>> + Send + 'a;

  /// The visible latest version of `path`, or `None` when the path is
  /// absent, tombstoned, or expired.
  fn get_entry<'a>(
    &'a self,
    tenant: Uuid,
    agent: &'a str,
    path: &'a str,
  ) -> impl Future<Output = Result<Option<VisibleEntry>, Self::Error>> + Send + 'a;

  /// Up to `limit` versions for the triple, newest first, tombstones and
  /// expired versions included.
  fn history<'a>(
    &'a self,
    tenant: Uuid,
    agent: &'a str,
    path: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + 'a;

  /// Raw visible paths under `prefix + "/"`, capped at
  /// [`crate::entry::LISTING_CAP`]. LIKE metacharacters in the prefix are
  /// escaped so they match literally.
  fn list_paths<'a>(
    &'a self,
    tenant: Uuid,
    agent: &'a str,
    prefix: &'a str,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  /// Visible paths matching a validated glob `pattern`, ordered ascending,
  /// capped at [`crate::entry::LISTING_CAP`].
  fn glob_paths<'a>(
    &'a self,
    tenant: Uuid,
    agent: &'a str,
    pattern: &'a str,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  /// All visible latest versions for the agent, newest first, up to `limit`.
  fn dump<'a>(
    &'a self,
    tenant: Uuid,
    agent: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<VisibleEntry>, Self::Error>> + Send + 'a;

  /// Distinct agents for the tenant with counts of visible entries.
  fn agents(
    &self,
    tenant: Uuid,
  ) -> impl Future<Output = Result<Vec<AgentSummary>, Self::Error>> + Send + '_;

  // ── Embeddings ────────────────────────────────────────────────────────

  /// Insert or replace the embedding row for a version.
  fn record_embedding<'a>(
    &'a self,
    tenant: Uuid,
    version_id: Uuid,
    agent: &'a str,
    path: &'a str,
    model: &'a str,
    vector: &'a [f32],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Rank visible, embedded latest versions by cosine similarity against
  /// `filter.vector`, optionally under a literal path prefix.
  fn search_similar<'a>(
    &'a self,
    tenant: Uuid,
    filter: &'a SearchFilter,
  ) -> impl Future<Output = Result<Vec<SearchHit>, Self::Error>> + Send + 'a;

  // ── Embedding jobs ────────────────────────────────────────────────────

  /// Queue (or re-queue) the job for a version, recording an optional
  /// bounded `last_error` from a failed inline attempt.
  fn enqueue_embedding_job(
    &self,
    version_id: Uuid,
    last_error: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Mark the job for a version as `done`, clearing `last_error`. Inserts
  /// the row when no job was ever queued (the inline-embed path).
  fn complete_embedding_job(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Atomically claim the oldest queued job: flip it to `running` and
  /// increment `attempts`. At most one concurrent claimer can win a given
  /// job; returns `None` when nothing is claimable.
  fn claim_embedding_job(
    &self,
  ) -> impl Future<Output = Result<Option<ClaimedJob>, Self::Error>> + Send + '_;

  /// Load the version payload a worker embeds. `None` when the version row
  /// is gone.
  fn embedding_source(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Option<EmbeddingSource>, Self::Error>> + Send + '_;

  /// Return a running job to the queue for another attempt.
  fn requeue_embedding_job<'a>(
    &'a self,
    version_id: Uuid,
    last_error: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Terminally fail a job.
  fn fail_embedding_job<'a>(
    &'a self,
    version_id: Uuid,
    last_error: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Inspect a job row.
  fn embedding_job(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Option<JobRecord>, Self::Error>> + Send + '_;

  /// Admin: reset up to `limit` jobs in `status` back to `queued`.
  /// Returns the number of rows moved.
  fn requeue_jobs(
    &self,
    status: JobStatus,
    limit: usize,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Idempotency ───────────────────────────────────────────────────────

  /// Look up a cached response. Expired rows are deleted on encounter and
  /// reported as absent.
  fn idempotency_lookup<'a>(
    &'a self,
    tenant: Uuid,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<IdempotencyRecord>, Self::Error>> + Send + 'a;

  /// Store a response for replay. On conflict the existing row wins, so
  /// concurrent retries do not clobber each other.
  fn idempotency_store<'a>(
    &'a self,
    tenant: Uuid,
    key: &'a str,
    request_hash: &'a str,
    response: &'a Value,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Delete all expired idempotency rows; returns the count removed.
  fn sweep_idempotency(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Quotas ────────────────────────────────────────────────────────────

  /// Bump the day's write counters by one write and `bytes` bytes,
  /// returning the new totals.
  fn incr_write_quota<'a>(
    &'a self,
    tenant: Uuid,
    day: &'a str,
    bytes: i64,
  ) -> impl Future<Output = Result<WriteQuotaAfter, Self::Error>> + Send + 'a;

  /// Bump the day's search counter, returning the new total.
  fn incr_search_quota<'a>(
    &'a self,
    tenant: Uuid,
    day: &'a str,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + 'a;

  /// Bump the day's embed-token counter, returning the new total.
  fn incr_embed_token_quota<'a>(
    &'a self,
    tenant: Uuid,
    day: &'a str,
    tokens: i64,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + 'a;

  // ── API keys & tenants ────────────────────────────────────────────────

  /// Fetch a key by public id, revoked or not.
  fn find_api_key<'a>(
    &'a self,
    key_id: &'a str,
  ) -> impl Future<Output = Result<Option<ApiKeyRecord>, Self::Error>> + Send + 'a;

  /// Persist a newly minted key.
  fn insert_api_key<'a>(
    &'a self,
    record: &'a ApiKeyRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Create the tenant row if it does not exist yet.
  fn ensure_tenant(
    &self,
    tenant: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
