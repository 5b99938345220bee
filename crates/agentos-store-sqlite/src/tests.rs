//! Integration tests for `SqliteStore` against an in-memory database.

use agentos_core::{
  auth::{ApiKeyRecord, Scope},
  entry::{LISTING_CAP, ListingKind, NewEntry, SearchFilter},
  job::{JobStatus, MAX_ATTEMPTS},
  path::direct_children,
  store::{MemoryStore, utc_day},
};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn entry(agent: &str, path: &str, value: serde_json::Value) -> NewEntry {
  NewEntry {
    agent: agent.into(),
    path: path.into(),
    value,
    ttl_seconds: None,
    tags: Vec::new(),
    importance: 0.5,
    searchable: false,
  }
}

// ─── Latest pointer ──────────────────────────────────────────────────────────

#[tokio::test]
async fn put_then_get_returns_latest() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let v1 = s
    .put_entry(tenant, entry("a", "/x/y", json!({"n": 1})))
    .await
    .unwrap();
  let v2 = s
    .put_entry(tenant, entry("a", "/x/y", json!({"n": 2})))
    .await
    .unwrap();
  assert_ne!(v1.version_id, v2.version_id);

  let got = s.get_entry(tenant, "a", "/x/y").await.unwrap().unwrap();
  assert_eq!(got.value, json!({"n": 2}));
  assert_eq!(got.version_id, v2.version_id);
}

#[tokio::test]
async fn get_missing_path_returns_none() {
  let s = store().await;
  let got = s.get_entry(Uuid::new_v4(), "a", "/nope").await.unwrap();
  assert!(got.is_none());
}

#[tokio::test]
async fn history_is_newest_first_and_includes_tombstones() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  s.put_entry(tenant, entry("a", "/h", json!({"n": 1})))
    .await
    .unwrap();
  s.put_entry(tenant, entry("a", "/h", json!({"n": 2})))
    .await
    .unwrap();
  s.delete_entry(tenant, "a", "/h").await.unwrap();

  let versions = s.history(tenant, "a", "/h", 10).await.unwrap();
  assert_eq!(versions.len(), 3);
  assert!(versions[0].deleted_at.is_some());
  assert_eq!(versions[1].value, json!({"n": 2}));
  assert_eq!(versions[2].value, json!({"n": 1}));
}

#[tokio::test]
async fn history_honors_limit() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  for n in 0..5 {
    s.put_entry(tenant, entry("a", "/h", json!({"n": n})))
      .await
      .unwrap();
  }
  let versions = s.history(tenant, "a", "/h", 2).await.unwrap();
  assert_eq!(versions.len(), 2);
  assert_eq!(versions[0].value, json!({"n": 4}));
}

// ─── Tombstones ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn tombstone_hides_path_and_put_resurrects() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  s.put_entry(tenant, entry("a", "/t", json!({"v": 1})))
    .await
    .unwrap();
  let tomb = s.delete_entry(tenant, "a", "/t").await.unwrap();
  assert!(tomb.is_tombstone());
  assert_eq!(tomb.content_hash, "tombstone");

  assert!(s.get_entry(tenant, "a", "/t").await.unwrap().is_none());

  s.put_entry(tenant, entry("a", "/t", json!({"v": 2})))
    .await
    .unwrap();
  let got = s.get_entry(tenant, "a", "/t").await.unwrap().unwrap();
  assert_eq!(got.value, json!({"v": 2}));
}

#[tokio::test]
async fn delete_on_missing_path_is_recorded() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let tomb = s.delete_entry(tenant, "a", "/ghost").await.unwrap();
  assert!(tomb.is_tombstone());
  assert!(s.get_entry(tenant, "a", "/ghost").await.unwrap().is_none());

  let versions = s.history(tenant, "a", "/ghost", 10).await.unwrap();
  assert_eq!(versions.len(), 1);
}

// ─── TTL ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_versions_are_hidden_but_kept_in_history() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let mut input = entry("a", "/ttl", json!({"v": 1}));
  input.ttl_seconds = Some(0); // expires immediately
  s.put_entry(tenant, input).await.unwrap();

  assert!(s.get_entry(tenant, "a", "/ttl").await.unwrap().is_none());
  assert!(s.dump(tenant, "a", 10).await.unwrap().is_empty());
  assert!(s.list_paths(tenant, "a", "/").await.unwrap().is_empty());

  let versions = s.history(tenant, "a", "/ttl", 10).await.unwrap();
  assert_eq!(versions.len(), 1);
  assert!(versions[0].expires_at.is_some());
}

#[tokio::test]
async fn unexpired_ttl_is_visible_with_expiry_reported() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let mut input = entry("a", "/ttl", json!({"v": 1}));
  input.ttl_seconds = Some(3600);
  s.put_entry(tenant, input).await.unwrap();

  let got = s.get_entry(tenant, "a", "/ttl").await.unwrap().unwrap();
  let expires = got.expires_at.expect("expiry set");
  assert!(expires > Utc::now() + Duration::seconds(3000));
}

// ─── Tenant isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn tenants_cannot_see_each_other() {
  let s = store().await;
  let t1 = Uuid::new_v4();
  let t2 = Uuid::new_v4();

  s.put_entry(t1, entry("a", "/shared", json!({"who": "t1"})))
    .await
    .unwrap();

  assert!(s.get_entry(t2, "a", "/shared").await.unwrap().is_none());
  assert!(s.list_paths(t2, "a", "/").await.unwrap().is_empty());
  assert!(s.glob_paths(t2, "a", "/**").await.unwrap().is_empty());
  assert!(s.dump(t2, "a", 10).await.unwrap().is_empty());
  assert!(s.agents(t2).await.unwrap().is_empty());
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_computes_direct_children() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  for path in ["/a", "/b", "/sub/c"] {
    s.put_entry(tenant, entry("a", path, json!(1))).await.unwrap();
  }

  let paths = s.list_paths(tenant, "a", "/").await.unwrap();
  let items = direct_children("/", &paths);
  assert_eq!(items.len(), 3);
  assert!(
    items
      .iter()
      .any(|i| i.path == "/a" && i.kind == ListingKind::File)
  );
  assert!(
    items
      .iter()
      .any(|i| i.path == "/sub" && i.kind == ListingKind::Dir)
  );
}

#[tokio::test]
async fn list_prefix_is_literal_despite_metacharacters() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  s.put_entry(tenant, entry("a", "/weird%prefix/x", json!(1)))
    .await
    .unwrap();
  s.put_entry(tenant, entry("a", "/weirdXprefix/y", json!(1)))
    .await
    .unwrap();

  let paths = s.list_paths(tenant, "a", "/weird%prefix").await.unwrap();
  assert_eq!(paths, vec!["/weird%prefix/x".to_owned()]);
}

#[tokio::test]
async fn glob_matches_translated_pattern() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  for path in ["/glob/foo", "/glob/bar", "/glob/sub/baz", "/other/x"] {
    s.put_entry(tenant, entry("a", path, json!(1))).await.unwrap();
  }

  let paths = s.glob_paths(tenant, "a", "/glob/**").await.unwrap();
  assert_eq!(paths.len(), 3);
  assert!(paths.contains(&"/glob/foo".to_owned()));
  assert!(paths.contains(&"/glob/bar".to_owned()));
  assert!(paths.contains(&"/glob/sub/baz".to_owned()));
}

#[tokio::test]
async fn listing_caps_at_500_rows() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  for n in 0..(LISTING_CAP + 10) {
    s.put_entry(tenant, entry("a", &format!("/cap/{n:04}"), json!(1)))
      .await
      .unwrap();
  }

  let listed = s.list_paths(tenant, "a", "/cap").await.unwrap();
  assert_eq!(listed.len(), LISTING_CAP);

  let globbed = s.glob_paths(tenant, "a", "/cap/*").await.unwrap();
  assert_eq!(globbed.len(), LISTING_CAP);
}

// ─── Dump & agents ───────────────────────────────────────────────────────────

#[tokio::test]
async fn dump_is_newest_first_and_limited() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  for n in 0..4 {
    s.put_entry(tenant, entry("a", &format!("/d/{n}"), json!({"n": n})))
      .await
      .unwrap();
  }

  let entries = s.dump(tenant, "a", 2).await.unwrap();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0].path, "/d/3");
  assert_eq!(entries[1].path, "/d/2");
}

#[tokio::test]
async fn agents_reports_visible_counts() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  s.put_entry(tenant, entry("alpha", "/1", json!(1))).await.unwrap();
  s.put_entry(tenant, entry("alpha", "/2", json!(2))).await.unwrap();
  s.put_entry(tenant, entry("beta", "/1", json!(3))).await.unwrap();
  s.delete_entry(tenant, "beta", "/1").await.unwrap();

  let agents = s.agents(tenant).await.unwrap();
  assert_eq!(agents.len(), 1);
  assert_eq!(agents[0].id, "alpha");
  assert_eq!(agents[0].memory_count, 2);
}

// ─── Embeddings & search ─────────────────────────────────────────────────────

#[tokio::test]
async fn search_ranks_by_cosine_similarity() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let near = s
    .put_entry(tenant, entry("a", "/notes/near", json!("close")))
    .await
    .unwrap();
  let far = s
    .put_entry(tenant, entry("a", "/notes/far", json!("distant")))
    .await
    .unwrap();

  s.record_embedding(tenant, near.version_id, "a", "/notes/near", "m", &[1.0, 0.0, 0.0])
    .await
    .unwrap();
  s.record_embedding(tenant, far.version_id, "a", "/notes/far", "m", &[0.0, 1.0, 0.0])
    .await
    .unwrap();

  let hits = s
    .search_similar(tenant, &SearchFilter {
      agent:       "a".into(),
      vector:      vec![0.9, 0.1, 0.0],
      limit:       10,
      path_prefix: None,
    })
    .await
    .unwrap();

  assert_eq!(hits.len(), 2);
  assert_eq!(hits[0].path, "/notes/near");
  assert!(hits[0].similarity > hits[1].similarity);
}

#[tokio::test]
async fn search_respects_path_prefix_and_visibility() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let kept = s
    .put_entry(tenant, entry("a", "/keep/x", json!(1)))
    .await
    .unwrap();
  let other = s
    .put_entry(tenant, entry("a", "/other/y", json!(2)))
    .await
    .unwrap();
  let gone = s
    .put_entry(tenant, entry("a", "/keep/gone", json!(3)))
    .await
    .unwrap();

  for v in [&kept, &other, &gone] {
    s.record_embedding(tenant, v.version_id, "a", &v.path, "m", &[1.0, 0.0])
      .await
      .unwrap();
  }
  s.delete_entry(tenant, "a", "/keep/gone").await.unwrap();

  let hits = s
    .search_similar(tenant, &SearchFilter {
      agent:       "a".into(),
      vector:      vec![1.0, 0.0],
      limit:       10,
      path_prefix: Some("/keep".into()),
    })
    .await
    .unwrap();

  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].path, "/keep/x");
}

#[tokio::test]
async fn search_excludes_stale_versions_behind_the_pointer() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let v1 = s
    .put_entry(tenant, entry("a", "/doc", json!("old")))
    .await
    .unwrap();
  s.record_embedding(tenant, v1.version_id, "a", "/doc", "m", &[1.0])
    .await
    .unwrap();

  // A newer version without an embedding shadows the embedded one.
  s.put_entry(tenant, entry("a", "/doc", json!("new")))
    .await
    .unwrap();

  let hits = s
    .search_similar(tenant, &SearchFilter {
      agent:       "a".into(),
      vector:      vec![1.0],
      limit:       10,
      path_prefix: None,
    })
    .await
    .unwrap();
  assert!(hits.is_empty());
}

// ─── Embedding jobs ──────────────────────────────────────────────────────────

#[tokio::test]
async fn claim_flips_to_running_and_counts_attempt() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let v = s
    .put_entry(tenant, entry("a", "/j", json!(1)))
    .await
    .unwrap();
  s.enqueue_embedding_job(v.version_id, None).await.unwrap();

  let claimed = s.claim_embedding_job().await.unwrap().unwrap();
  assert_eq!(claimed.version_id, v.version_id);
  assert_eq!(claimed.attempts, 1);

  let job = s.embedding_job(v.version_id).await.unwrap().unwrap();
  assert_eq!(job.status, JobStatus::Running);

  // Nothing else is claimable while the job is running.
  assert!(s.claim_embedding_job().await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_claims_never_share_a_job() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let v = s
    .put_entry(tenant, entry("a", "/solo", json!(1)))
    .await
    .unwrap();
  s.enqueue_embedding_job(v.version_id, None).await.unwrap();

  let (a, b) = tokio::join!(s.claim_embedding_job(), s.claim_embedding_job());
  let a = a.unwrap();
  let b = b.unwrap();
  assert!(a.is_some() != b.is_some(), "exactly one claim must win");
}

#[tokio::test]
async fn requeue_and_exhaustion() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let v = s
    .put_entry(tenant, entry("a", "/retry", json!(1)))
    .await
    .unwrap();
  s.enqueue_embedding_job(v.version_id, None).await.unwrap();

  for expected_attempt in 1..=MAX_ATTEMPTS {
    let claimed = s.claim_embedding_job().await.unwrap().unwrap();
    assert_eq!(claimed.attempts, expected_attempt);
    s.requeue_embedding_job(claimed.version_id, "embedder error: status 500")
      .await
      .unwrap();
  }

  // Attempts exhausted: queued but no longer claimable.
  assert!(s.claim_embedding_job().await.unwrap().is_none());

  let job = s.embedding_job(v.version_id).await.unwrap().unwrap();
  assert_eq!(job.attempts, MAX_ATTEMPTS);
  assert_eq!(job.last_error.as_deref(), Some("embedder error: status 500"));
}

#[tokio::test]
async fn complete_clears_error_and_admin_requeue_resets() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  let v = s
    .put_entry(tenant, entry("a", "/done", json!(1)))
    .await
    .unwrap();
  s.enqueue_embedding_job(v.version_id, Some("inline failure".into()))
    .await
    .unwrap();
  let claimed = s.claim_embedding_job().await.unwrap().unwrap();
  s.fail_embedding_job(claimed.version_id, "gave up").await.unwrap();

  let moved = s.requeue_jobs(JobStatus::Failed, 100).await.unwrap();
  assert_eq!(moved, 1);
  let job = s.embedding_job(v.version_id).await.unwrap().unwrap();
  assert_eq!(job.status, JobStatus::Queued);

  s.complete_embedding_job(v.version_id).await.unwrap();
  let job = s.embedding_job(v.version_id).await.unwrap().unwrap();
  assert_eq!(job.status, JobStatus::Done);
  assert!(job.last_error.is_none());
}

// ─── Idempotency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn idempotency_round_trip_and_conflict_keeps_first() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let expires = Utc::now() + Duration::hours(24);

  s.idempotency_store(tenant, "k1", "hash-a", &json!({"ok": true}), expires)
    .await
    .unwrap();
  // A concurrent retry must not clobber the stored response.
  s.idempotency_store(tenant, "k1", "hash-b", &json!({"ok": false}), expires)
    .await
    .unwrap();

  let rec = s.idempotency_lookup(tenant, "k1").await.unwrap().unwrap();
  assert_eq!(rec.request_hash, "hash-a");
  assert_eq!(rec.response, json!({"ok": true}));
}

#[tokio::test]
async fn idempotency_expired_rows_vanish_on_lookup() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  s.idempotency_store(
    tenant,
    "old",
    "h",
    &json!({}),
    Utc::now() - Duration::seconds(1),
  )
  .await
  .unwrap();

  assert!(s.idempotency_lookup(tenant, "old").await.unwrap().is_none());
  // Row was deleted on encounter, so the sweeper finds nothing.
  assert_eq!(s.sweep_idempotency().await.unwrap(), 0);
}

#[tokio::test]
async fn idempotency_is_tenant_scoped() {
  let s = store().await;
  let t1 = Uuid::new_v4();
  let t2 = Uuid::new_v4();
  let expires = Utc::now() + Duration::hours(1);

  s.idempotency_store(t1, "shared", "h", &json!(1), expires)
    .await
    .unwrap();
  assert!(s.idempotency_lookup(t2, "shared").await.unwrap().is_none());
}

#[tokio::test]
async fn sweeper_removes_expired_rows() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  s.idempotency_store(
    tenant,
    "stale",
    "h",
    &json!(1),
    Utc::now() - Duration::hours(1),
  )
  .await
  .unwrap();
  s.idempotency_store(tenant, "fresh", "h", &json!(2), Utc::now() + Duration::hours(1))
    .await
    .unwrap();

  assert_eq!(s.sweep_idempotency().await.unwrap(), 1);
  assert!(s.idempotency_lookup(tenant, "fresh").await.unwrap().is_some());
}

// ─── Quotas ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn quota_increments_return_running_totals() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let day = utc_day(Utc::now());

  let first = s.incr_write_quota(tenant, &day, 100).await.unwrap();
  assert_eq!(first.writes, 1);
  assert_eq!(first.bytes, 100);

  let second = s.incr_write_quota(tenant, &day, 50).await.unwrap();
  assert_eq!(second.writes, 2);
  assert_eq!(second.bytes, 150);

  assert_eq!(s.incr_search_quota(tenant, &day).await.unwrap(), 1);
  assert_eq!(s.incr_search_quota(tenant, &day).await.unwrap(), 2);

  assert_eq!(s.incr_embed_token_quota(tenant, &day, 40).await.unwrap(), 40);
  assert_eq!(s.incr_embed_token_quota(tenant, &day, 2).await.unwrap(), 42);
}

#[tokio::test]
async fn quota_days_are_independent() {
  let s = store().await;
  let tenant = Uuid::new_v4();

  s.incr_write_quota(tenant, "2026-01-01", 10).await.unwrap();
  let other = s.incr_write_quota(tenant, "2026-01-02", 5).await.unwrap();
  assert_eq!(other.writes, 1);
  assert_eq!(other.bytes, 5);
}

// ─── API keys ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn api_key_round_trip() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  s.ensure_tenant(tenant).await.unwrap();
  s.ensure_tenant(tenant).await.unwrap(); // idempotent

  let record = ApiKeyRecord {
    key_id:      "key_abc".into(),
    tenant,
    secret_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
    scopes:      vec![Scope::MemoryRead, Scope::MemoryWrite],
    label:       Some("ci".into()),
    created_at:  Utc::now(),
    revoked_at:  None,
  };
  s.insert_api_key(&record).await.unwrap();

  let found = s.find_api_key("key_abc").await.unwrap().unwrap();
  assert_eq!(found.tenant, tenant);
  assert_eq!(found.scopes, vec![Scope::MemoryRead, Scope::MemoryWrite]);
  assert_eq!(found.label.as_deref(), Some("ci"));
  assert!(found.revoked_at.is_none());

  assert!(s.find_api_key("missing").await.unwrap().is_none());
}
