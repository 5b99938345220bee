//! [`SqliteStore`] — the SQLite implementation of [`MemoryStore`].

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use serde_json::Value;
use uuid::Uuid;

use agentos_core::{
  auth::ApiKeyRecord,
  canonical::{TOMBSTONE_CONTENT_HASH, content_hash},
  entry::{
    AgentSummary, EntryVersion, HistoryEntry, LISTING_CAP, NewEntry,
    SearchFilter, SearchHit, VisibleEntry,
  },
  job::{ClaimedJob, EmbeddingSource, JobRecord, JobStatus, MAX_ATTEMPTS},
  path::{escape_like, glob_to_like},
  store::{IdempotencyRecord, MemoryStore, WriteQuotaAfter},
};

use crate::{
  Error, Result,
  encode::{
    RawApiKey, RawEmbeddingSource, RawHistory, RawJob, RawVisible, decode_dt,
    decode_tags, decode_uuid, decode_vector, encode_dt, encode_scopes,
    encode_tags, encode_uuid, encode_vector,
  },
  schema::SCHEMA,
};

/// Visibility predicate shared by every read of latest versions, with the
/// `now` parameter at an explicit index. `expires_at` comparison runs on
/// RFC 3339 strings, which order like timestamps.
fn visible_sql(now_param: usize) -> String {
  format!(
    "v.deleted_at IS NULL AND (v.expires_at IS NULL OR v.expires_at > ?{now_param})"
  )
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An AgentOS memory store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path.as_ref().to_owned()).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert a fully-built version and move the latest pointer to it, in one
  /// IMMEDIATE transaction so readers never observe a dangling pointer.
  async fn insert_version(&self, version: &EntryVersion) -> Result<()> {
    let version_id_str = encode_uuid(version.version_id);
    let tenant_str     = encode_uuid(version.tenant);
    let agent          = version.agent.clone();
    let path           = version.path.clone();
    let value_json     = version.value.to_string();
    let tags_str       = encode_tags(&version.tags)?;
    let importance     = version.importance;
    let searchable     = version.searchable;
    let content_hash   = version.content_hash.clone();
    let created_at_str = encode_dt(version.created_at);
    let expires_at_str = version.expires_at.map(encode_dt);
    let deleted_at_str = version.deleted_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "INSERT INTO entry_versions (
             version_id, tenant_id, agent, path, value_json, tags,
             importance, searchable, content_hash, created_at,
             expires_at, deleted_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
          rusqlite::params![
            version_id_str,
            tenant_str,
            agent,
            path,
            value_json,
            tags_str,
            importance,
            searchable,
            content_hash,
            created_at_str,
            expires_at_str,
            deleted_at_str,
          ],
        )?;
        tx.execute(
          "INSERT INTO entries (tenant_id, agent, path, latest_version_id)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (tenant_id, agent, path)
           DO UPDATE SET latest_version_id = excluded.latest_version_id",
          rusqlite::params![tenant_str, agent, path, version_id_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── MemoryStore impl ────────────────────────────────────────────────────────

impl MemoryStore for SqliteStore {
  type Error = Error;

  // ── Entries ───────────────────────────────────────────────────────────────

  async fn put_entry(&self, tenant: Uuid, input: NewEntry) -> Result<EntryVersion> {
    let now = Utc::now();
    let hash = content_hash(&input.path, &input.value);
    let version = EntryVersion {
      version_id:   Uuid::new_v4(),
      tenant,
      agent:        input.agent,
      path:         input.path,
      value:        input.value,
      tags:         input.tags,
      importance:   input.importance,
      searchable:   input.searchable,
      content_hash: hash,
      created_at:   now,
      expires_at:   input
        .ttl_seconds
        .map(|secs| now + Duration::seconds(secs as i64)),
      deleted_at:   None,
    };

    self.insert_version(&version).await?;
    Ok(version)
  }

  async fn delete_entry(
    &self,
    tenant: Uuid,
    agent: &str,
    path: &str,
  ) -> Result<EntryVersion> {
    let now = Utc::now();
    let tombstone = EntryVersion {
      version_id:   Uuid::new_v4(),
      tenant,
      agent:        agent.to_owned(),
      path:         path.to_owned(),
      value:        Value::Object(serde_json::Map::new()),
      tags:         Vec::new(),
      importance:   0.0,
      searchable:   false,
      content_hash: TOMBSTONE_CONTENT_HASH.to_owned(),
      created_at:   now,
      expires_at:   None,
      deleted_at:   Some(now),
    };

    self.insert_version(&tombstone).await?;
    Ok(tombstone)
  }

  async fn get_entry(
    &self,
    tenant: Uuid,
    agent: &str,
    path: &str,
  ) -> Result<Option<VisibleEntry>> {
    let tenant_str = encode_uuid(tenant);
    let agent = agent.to_owned();
    let path = path.to_owned();
    let now_str = encode_dt(Utc::now());

    let raw: Option<RawVisible> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT v.path, v.value_json, v.version_id, v.created_at,
                      v.expires_at, v.tags
               FROM entries e
               JOIN entry_versions v ON v.version_id = e.latest_version_id
               WHERE e.tenant_id = ?1 AND e.agent = ?2 AND e.path = ?3
                 AND {}",
              visible_sql(4)
            ),
            rusqlite::params![tenant_str, agent, path, now_str],
            |row| {
              Ok(RawVisible {
                path:       row.get(0)?,
                value_json: row.get(1)?,
                version_id: row.get(2)?,
                created_at: row.get(3)?,
                expires_at: row.get(4)?,
                tags:       row.get(5)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawVisible::into_visible).transpose()
  }

  async fn history(
    &self,
    tenant: Uuid,
    agent: &str,
    path: &str,
    limit: usize,
  ) -> Result<Vec<HistoryEntry>> {
    let tenant_str = encode_uuid(tenant);
    let agent = agent.to_owned();
    let path = path.to_owned();
    let limit = limit as i64;

    let raws: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT version_id, created_at, value_json, expires_at, deleted_at
           FROM entry_versions
           WHERE tenant_id = ?1 AND agent = ?2 AND path = ?3
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?4",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, agent, path, limit], |row| {
            Ok(RawHistory {
              version_id: row.get(0)?,
              created_at: row.get(1)?,
              value_json: row.get(2)?,
              expires_at: row.get(3)?,
              deleted_at: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistory::into_history).collect()
  }

  async fn list_paths(
    &self,
    tenant: Uuid,
    agent: &str,
    prefix: &str,
  ) -> Result<Vec<String>> {
    let base = if prefix == "/" {
      "/".to_owned()
    } else {
      format!("{prefix}/")
    };
    let pattern = format!("{}%", escape_like(&base));
    self.visible_paths_like(tenant, agent, pattern).await
  }

  async fn glob_paths(
    &self,
    tenant: Uuid,
    agent: &str,
    pattern: &str,
  ) -> Result<Vec<String>> {
    let like = glob_to_like(pattern)?;
    self.visible_paths_like(tenant, agent, like).await
  }

  async fn dump(
    &self,
    tenant: Uuid,
    agent: &str,
    limit: usize,
  ) -> Result<Vec<VisibleEntry>> {
    let tenant_str = encode_uuid(tenant);
    let agent = agent.to_owned();
    let now_str = encode_dt(Utc::now());
    let limit = limit as i64;

    let raws: Vec<RawVisible> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT v.path, v.value_json, v.version_id, v.created_at,
                  v.expires_at, v.tags
           FROM entries e
           JOIN entry_versions v ON v.version_id = e.latest_version_id
           WHERE e.tenant_id = ?1 AND e.agent = ?2 AND {}
           ORDER BY v.created_at DESC, v.rowid DESC
           LIMIT ?4",
          visible_sql(3)
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![tenant_str, agent, now_str, limit],
            |row| {
              Ok(RawVisible {
                path:       row.get(0)?,
                value_json: row.get(1)?,
                version_id: row.get(2)?,
                created_at: row.get(3)?,
                expires_at: row.get(4)?,
                tags:       row.get(5)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVisible::into_visible).collect()
  }

  async fn agents(&self, tenant: Uuid) -> Result<Vec<AgentSummary>> {
    let tenant_str = encode_uuid(tenant);
    let now_str = encode_dt(Utc::now());

    let rows: Vec<AgentSummary> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT e.agent, COUNT(*)
           FROM entries e
           JOIN entry_versions v ON v.version_id = e.latest_version_id
           WHERE e.tenant_id = ?1 AND {}
           GROUP BY e.agent
           ORDER BY e.agent ASC",
          visible_sql(2)
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, now_str], |row| {
            Ok(AgentSummary {
              id:           row.get(0)?,
              memory_count: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  // ── Embeddings ────────────────────────────────────────────────────────────

  async fn record_embedding(
    &self,
    tenant: Uuid,
    version_id: Uuid,
    agent: &str,
    path: &str,
    model: &str,
    vector: &[f32],
  ) -> Result<()> {
    let version_id_str = encode_uuid(version_id);
    let tenant_str = encode_uuid(tenant);
    let agent = agent.to_owned();
    let path = path.to_owned();
    let model = model.to_owned();
    let blob = encode_vector(vector);
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO embeddings
             (version_id, tenant_id, agent, path, model, vector, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (version_id) DO UPDATE SET
             model = excluded.model,
             vector = excluded.vector,
             created_at = excluded.created_at",
          rusqlite::params![
            version_id_str,
            tenant_str,
            agent,
            path,
            model,
            blob,
            now_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn search_similar(
    &self,
    tenant: Uuid,
    filter: &SearchFilter,
  ) -> Result<Vec<SearchHit>> {
    let tenant_str = encode_uuid(tenant);
    let agent = filter.agent.clone();
    let now_str = encode_dt(Utc::now());
    let prefix_pattern = filter
      .path_prefix
      .as_deref()
      .map(|p| format!("{}%", escape_like(p)));

    type RawHit = (String, String, String, String, String, Vec<u8>);
    let raws: Vec<RawHit> = self
      .conn
      .call(move |conn| {
        let base = format!(
          "SELECT v.path, v.value_json, v.tags, v.version_id, v.created_at,
                  m.vector
           FROM embeddings m
           JOIN entry_versions v ON v.version_id = m.version_id
           JOIN entries e
             ON e.tenant_id = m.tenant_id
            AND e.agent = m.agent
            AND e.path = m.path
           WHERE m.tenant_id = ?1 AND m.agent = ?2
             AND e.latest_version_id = m.version_id
             AND {}",
          visible_sql(3)
        );
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawHit> {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ))
        };

        let rows = if let Some(pattern) = prefix_pattern {
          let sql = format!("{base} AND v.path LIKE ?4 ESCAPE '\\'");
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(
              rusqlite::params![tenant_str, agent, now_str, pattern],
              map_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&base)?;
          stmt
            .query_map(rusqlite::params![tenant_str, agent, now_str], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    let mut hits = Vec::with_capacity(raws.len());
    for (path, value_json, tags, version_id, created_at, blob) in raws {
      let stored = decode_vector(&blob)?;
      hits.push(SearchHit {
        path,
        value: serde_json::from_str(&value_json)?,
        tags: decode_tags(&tags)?,
        similarity: cosine_similarity(&filter.vector, &stored),
        version_id: decode_uuid(&version_id)?,
        created_at: decode_dt(&created_at)?,
      });
    }

    hits.sort_by(|a, b| {
      b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(filter.limit);
    Ok(hits)
  }

  // ── Embedding jobs ────────────────────────────────────────────────────────

  async fn enqueue_embedding_job(
    &self,
    version_id: Uuid,
    last_error: Option<String>,
  ) -> Result<()> {
    let version_id_str = encode_uuid(version_id);
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO embedding_jobs
             (version_id, status, attempts, last_error, created_at, updated_at)
           VALUES (?1, 'queued', 0, ?2, ?3, ?3)
           ON CONFLICT (version_id) DO UPDATE SET
             status = 'queued',
             last_error = excluded.last_error,
             updated_at = excluded.updated_at",
          rusqlite::params![version_id_str, last_error, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn complete_embedding_job(&self, version_id: Uuid) -> Result<()> {
    let version_id_str = encode_uuid(version_id);
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO embedding_jobs
             (version_id, status, attempts, last_error, created_at, updated_at)
           VALUES (?1, 'done', 0, NULL, ?2, ?2)
           ON CONFLICT (version_id) DO UPDATE SET
             status = 'done',
             last_error = NULL,
             updated_at = excluded.updated_at",
          rusqlite::params![version_id_str, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn claim_embedding_job(&self) -> Result<Option<ClaimedJob>> {
    let now_str = encode_dt(Utc::now());

    let claimed: Option<(String, i64)> = self
      .conn
      .call(move |conn| {
        // Claim-by-conditional-update: the UPDATE only wins if the row is
        // still 'queued', so concurrent claimers cannot take the same job.
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let candidate: Option<(String, i64)> = tx
          .query_row(
            "SELECT version_id, attempts
             FROM embedding_jobs
             WHERE status = 'queued' AND attempts < ?1
             ORDER BY created_at ASC
             LIMIT 1",
            rusqlite::params![MAX_ATTEMPTS],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;

        let out = match candidate {
          None => None,
          Some((version_id, attempts)) => {
            let changed = tx.execute(
              "UPDATE embedding_jobs
               SET status = 'running', attempts = attempts + 1, updated_at = ?2
               WHERE version_id = ?1 AND status = 'queued'",
              rusqlite::params![version_id, now_str],
            )?;
            if changed == 1 {
              Some((version_id, attempts + 1))
            } else {
              None
            }
          }
        };
        tx.commit()?;
        Ok(out)
      })
      .await?;

    match claimed {
      None => Ok(None),
      Some((version_id_str, attempts)) => Ok(Some(ClaimedJob {
        version_id: decode_uuid(&version_id_str)?,
        attempts,
      })),
    }
  }

  async fn embedding_source(
    &self,
    version_id: Uuid,
  ) -> Result<Option<EmbeddingSource>> {
    let version_id_str = encode_uuid(version_id);

    let raw: Option<RawEmbeddingSource> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT tenant_id, agent, path, value_json, tags
             FROM entry_versions WHERE version_id = ?1",
            rusqlite::params![version_id_str],
            |row| {
              Ok(RawEmbeddingSource {
                tenant_id:  row.get(0)?,
                agent:      row.get(1)?,
                path:       row.get(2)?,
                value_json: row.get(3)?,
                tags:       row.get(4)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawEmbeddingSource::into_source).transpose()
  }

  async fn requeue_embedding_job(
    &self,
    version_id: Uuid,
    last_error: &str,
  ) -> Result<()> {
    self
      .set_job_state(version_id, JobStatus::Queued, Some(last_error.to_owned()))
      .await
  }

  async fn fail_embedding_job(
    &self,
    version_id: Uuid,
    last_error: &str,
  ) -> Result<()> {
    self
      .set_job_state(version_id, JobStatus::Failed, Some(last_error.to_owned()))
      .await
  }

  async fn embedding_job(&self, version_id: Uuid) -> Result<Option<JobRecord>> {
    let version_id_str = encode_uuid(version_id);

    let raw: Option<RawJob> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT version_id, status, attempts, last_error
             FROM embedding_jobs WHERE version_id = ?1",
            rusqlite::params![version_id_str],
            |row| {
              Ok(RawJob {
                version_id: row.get(0)?,
                status:     row.get(1)?,
                attempts:   row.get(2)?,
                last_error: row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawJob::into_record).transpose()
  }

  async fn requeue_jobs(&self, status: JobStatus, limit: usize) -> Result<u64> {
    let status_str = status.as_str();
    let limit = limit as i64;
    let now_str = encode_dt(Utc::now());

    let moved = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE embedding_jobs
           SET status = 'queued', updated_at = ?3
           WHERE version_id IN (
             SELECT version_id FROM embedding_jobs
             WHERE status = ?1
             ORDER BY created_at ASC
             LIMIT ?2
           )",
          rusqlite::params![status_str, limit, now_str],
        )?;
        Ok(changed as u64)
      })
      .await?;
    Ok(moved)
  }

  // ── Idempotency ───────────────────────────────────────────────────────────

  async fn idempotency_lookup(
    &self,
    tenant: Uuid,
    key: &str,
  ) -> Result<Option<IdempotencyRecord>> {
    let tenant_str = encode_uuid(tenant);
    let key = key.to_owned();
    let now_str = encode_dt(Utc::now());

    let raw: Option<(String, String, String)> = self
      .conn
      .call(move |conn| {
        let row: Option<(String, String, String)> = conn
          .query_row(
            "SELECT request_hash, response_json, expires_at
             FROM idempotency_keys
             WHERE tenant_id = ?1 AND idem_key = ?2",
            rusqlite::params![tenant_str, key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?;

        match row {
          Some((_, _, ref expires)) if expires.as_str() <= now_str.as_str() => {
            conn.execute(
              "DELETE FROM idempotency_keys
               WHERE tenant_id = ?1 AND idem_key = ?2",
              rusqlite::params![tenant_str, key],
            )?;
            Ok(None)
          }
          other => Ok(other),
        }
      })
      .await?;

    match raw {
      None => Ok(None),
      Some((request_hash, response_json, expires_at)) => {
        Ok(Some(IdempotencyRecord {
          request_hash,
          response: serde_json::from_str(&response_json)?,
          expires_at: decode_dt(&expires_at)?,
        }))
      }
    }
  }

  async fn idempotency_store(
    &self,
    tenant: Uuid,
    key: &str,
    request_hash: &str,
    response: &Value,
    expires_at: DateTime<Utc>,
  ) -> Result<()> {
    let tenant_str = encode_uuid(tenant);
    let key = key.to_owned();
    let request_hash = request_hash.to_owned();
    let response_json = response.to_string();
    let now_str = encode_dt(Utc::now());
    let expires_str = encode_dt(expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO idempotency_keys
             (tenant_id, idem_key, request_hash, response_json,
              created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (tenant_id, idem_key) DO NOTHING",
          rusqlite::params![
            tenant_str,
            key,
            request_hash,
            response_json,
            now_str,
            expires_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn sweep_idempotency(&self) -> Result<u64> {
    let now_str = encode_dt(Utc::now());

    let removed = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "DELETE FROM idempotency_keys WHERE expires_at <= ?1",
          rusqlite::params![now_str],
        )?;
        Ok(changed as u64)
      })
      .await?;
    Ok(removed)
  }

  // ── Quotas ────────────────────────────────────────────────────────────────

  async fn incr_write_quota(
    &self,
    tenant: Uuid,
    day: &str,
    bytes: i64,
  ) -> Result<WriteQuotaAfter> {
    let tenant_str = encode_uuid(tenant);
    let day = day.to_owned();

    let (writes, total_bytes) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "INSERT INTO quota_usage
             (tenant_id, day, writes, bytes, embed_tokens, searches)
           VALUES (?1, ?2, 1, ?3, 0, 0)
           ON CONFLICT (tenant_id, day) DO UPDATE SET
             writes = writes + 1,
             bytes = bytes + excluded.bytes
           RETURNING writes, bytes",
          rusqlite::params![tenant_str, day, bytes],
          |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?)
      })
      .await?;

    Ok(WriteQuotaAfter {
      writes,
      bytes: total_bytes,
    })
  }

  async fn incr_search_quota(&self, tenant: Uuid, day: &str) -> Result<i64> {
    let tenant_str = encode_uuid(tenant);
    let day = day.to_owned();

    let searches = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "INSERT INTO quota_usage
             (tenant_id, day, writes, bytes, embed_tokens, searches)
           VALUES (?1, ?2, 0, 0, 0, 1)
           ON CONFLICT (tenant_id, day) DO UPDATE SET
             searches = searches + 1
           RETURNING searches",
          rusqlite::params![tenant_str, day],
          |row| row.get::<_, i64>(0),
        )?)
      })
      .await?;
    Ok(searches)
  }

  async fn incr_embed_token_quota(
    &self,
    tenant: Uuid,
    day: &str,
    tokens: i64,
  ) -> Result<i64> {
    let tenant_str = encode_uuid(tenant);
    let day = day.to_owned();

    let total = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "INSERT INTO quota_usage
             (tenant_id, day, writes, bytes, embed_tokens, searches)
           VALUES (?1, ?2, 0, 0, ?3, 0)
           ON CONFLICT (tenant_id, day) DO UPDATE SET
             embed_tokens = embed_tokens + excluded.embed_tokens
           RETURNING embed_tokens",
          rusqlite::params![tenant_str, day, tokens],
          |row| row.get::<_, i64>(0),
        )?)
      })
      .await?;
    Ok(total)
  }

  // ── API keys & tenants ────────────────────────────────────────────────────

  async fn find_api_key(&self, key_id: &str) -> Result<Option<ApiKeyRecord>> {
    let key_id = key_id.to_owned();

    let raw: Option<RawApiKey> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT key_id, tenant_id, secret_hash, scopes, label,
                    created_at, revoked_at
             FROM api_keys WHERE key_id = ?1",
            rusqlite::params![key_id],
            |row| {
              Ok(RawApiKey {
                key_id:      row.get(0)?,
                tenant_id:   row.get(1)?,
                secret_hash: row.get(2)?,
                scopes:      row.get(3)?,
                label:       row.get(4)?,
                created_at:  row.get(5)?,
                revoked_at:  row.get(6)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawApiKey::into_record).transpose()
  }

  async fn insert_api_key(&self, record: &ApiKeyRecord) -> Result<()> {
    let key_id = record.key_id.clone();
    let tenant_str = encode_uuid(record.tenant);
    let secret_hash = record.secret_hash.clone();
    let scopes_str = encode_scopes(&record.scopes)?;
    let label = record.label.clone();
    let created_at_str = encode_dt(record.created_at);
    let revoked_at_str = record.revoked_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO api_keys
             (key_id, tenant_id, secret_hash, scopes, label,
              created_at, revoked_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            key_id,
            tenant_str,
            secret_hash,
            scopes_str,
            label,
            created_at_str,
            revoked_at_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn ensure_tenant(&self, tenant: Uuid) -> Result<()> {
    let tenant_str = encode_uuid(tenant);
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO tenants (tenant_id, created_at)
           VALUES (?1, ?2)",
          rusqlite::params![tenant_str, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Private helpers ─────────────────────────────────────────────────────────

impl SqliteStore {
  /// Visible latest paths matching a prepared LIKE pattern, ordered
  /// ascending and capped.
  async fn visible_paths_like(
    &self,
    tenant: Uuid,
    agent: &str,
    pattern: String,
  ) -> Result<Vec<String>> {
    let tenant_str = encode_uuid(tenant);
    let agent = agent.to_owned();
    let now_str = encode_dt(Utc::now());
    let cap = LISTING_CAP as i64;

    let paths = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT e.path
           FROM entries e
           JOIN entry_versions v ON v.version_id = e.latest_version_id
           WHERE e.tenant_id = ?1 AND e.agent = ?2
             AND e.path LIKE ?4 ESCAPE '\\'
             AND {}
           ORDER BY e.path ASC
           LIMIT ?5",
          visible_sql(3)
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![tenant_str, agent, now_str, pattern, cap],
            |row| row.get::<_, String>(0),
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(paths)
  }

  async fn set_job_state(
    &self,
    version_id: Uuid,
    status: JobStatus,
    last_error: Option<String>,
  ) -> Result<()> {
    let version_id_str = encode_uuid(version_id);
    let status_str = status.as_str();
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE embedding_jobs
           SET status = ?2, last_error = ?3, updated_at = ?4
           WHERE version_id = ?1",
          rusqlite::params![version_id_str, status_str, last_error, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  let mut dot = 0.0f32;
  let mut norm_a = 0.0f32;
  let mut norm_b = 0.0f32;
  for i in 0..a.len().min(b.len()) {
    dot += a[i] * b[i];
    norm_a += a[i] * a[i];
    norm_b += b[i] * b[i];
  }
  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }
  dot / (norm_a.sqrt() * norm_b.sqrt())
}
