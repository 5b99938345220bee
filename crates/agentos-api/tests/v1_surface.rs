//! End-to-end tests for the `/v1` surface: pipeline ordering, auth, rate
//! limits, quotas, idempotency, and the memory operations, driven through
//! the real router against an in-memory store.

use std::sync::Arc;

use argon2::{Argon2, PasswordHasher as _, password_hash::SaltString};
use async_trait::async_trait;
use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use http_body_util::BodyExt as _;
use rand_core::OsRng;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use agentos_api::{ApiConfig, AppState, router};
use agentos_core::{auth::{ApiKeyRecord, Scope}, store::MemoryStore};
use agentos_embed::{EmbedError, Embedder};
use agentos_store_sqlite::SqliteStore;

// ─── Harness ─────────────────────────────────────────────────────────────────

const SECRET: &str = "test-secret-value";

struct Harness {
  app:    Router,
  store:  Arc<SqliteStore>,
}

async fn harness(config: ApiConfig) -> Harness {
  harness_with_embedder(config, None).await
}

async fn harness_with_embedder(
  config: ApiConfig,
  embedder: Option<Arc<dyn Embedder>>,
) -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let state = AppState::new(store.clone(), embedder, config);
  Harness {
    app: router(state),
    store,
  }
}

/// Insert a key directly and return its bearer token.
async fn seed_key(store: &SqliteStore, scopes: Vec<Scope>) -> (String, Uuid) {
  let tenant = Uuid::new_v4();
  store.ensure_tenant(tenant).await.unwrap();

  let key_id = format!("k{}", Uuid::new_v4().simple());
  let salt = SaltString::generate(&mut OsRng);
  let secret_hash = Argon2::default()
    .hash_password(SECRET.as_bytes(), &salt)
    .unwrap()
    .to_string();

  store
    .insert_api_key(&ApiKeyRecord {
      key_id: key_id.clone(),
      tenant,
      secret_hash,
      scopes,
      label: None,
      created_at: chrono::Utc::now(),
      revoked_at: None,
    })
    .await
    .unwrap();

  (format!("{key_id}.{SECRET}"), tenant)
}

fn request(path: &str, token: Option<&str>, body: Value) -> Request<Body> {
  let mut builder = Request::builder()
    .method("POST")
    .uri(path)
    .header(header::CONTENT_TYPE, "application/json");
  if let Some(token) = token {
    builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
  }
  builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
  let response = app.clone().oneshot(req).await.unwrap();
  let status = response.status();
  let headers = response.headers().clone();
  let bytes = response.into_body().collect().await.unwrap().to_bytes();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
  };
  (status, headers, value)
}

fn error_code(body: &Value) -> &str {
  body["error"]["code"].as_str().unwrap_or("")
}

// ─── Basics ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn healthz_is_open() {
  let h = harness(ApiConfig::default()).await;
  let req = Request::builder()
    .uri("/healthz")
    .body(Body::empty())
    .unwrap();
  let (status, _, body) = send(&h.app, req).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn v1_requires_credentials() {
  let h = harness(ApiConfig::default()).await;
  let (status, _, body) =
    send(&h.app, request("/v1/get", None, json!({"agent_id":"a","path":"/x"})))
      .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(error_code(&body), "UNAUTHORIZED");
}

#[tokio::test]
async fn wrong_secret_is_unauthorized() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;
  let bad = token.replace(SECRET, "wrong-secret-value");

  let (status, _, body) = send(
    &h.app,
    request("/v1/get", Some(&bad), json!({"agent_id":"a","path":"/x"})),
  )
  .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(error_code(&body), "UNAUTHORIZED");
}

// ─── Memory flow ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_get_history_flow() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  let (status, headers, first) = send(
    &h.app,
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":"/x/y","value":{"n":1}}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(first["ok"], json!(true));
  assert!(headers.contains_key("X-RateLimit-Remaining"));
  let v1 = first["version_id"].as_str().unwrap().to_owned();

  let (_, _, second) = send(
    &h.app,
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":"/x/y","value":{"n":2}}),
    ),
  )
  .await;
  let v2 = second["version_id"].as_str().unwrap().to_owned();
  assert_ne!(v1, v2);

  let (status, _, got) = send(
    &h.app,
    request("/v1/get", Some(&token), json!({"agent_id":"a","path":"/x/y"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(got["found"], json!(true));
  assert_eq!(got["value"], json!({"n":2}));
  assert_eq!(got["version_id"].as_str().unwrap(), v2);

  let (_, _, history) = send(
    &h.app,
    request(
      "/v1/history",
      Some(&token),
      json!({"agent_id":"a","path":"/x/y","limit":10}),
    ),
  )
  .await;
  let versions = history["versions"].as_array().unwrap();
  assert_eq!(versions.len(), 2);
  assert_eq!(versions[0]["value"], json!({"n":2}));
  assert_eq!(versions[1]["value"], json!({"n":1}));
}

#[tokio::test]
async fn ttl_hides_entries_after_expiry() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  send(
    &h.app,
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":"/ttl/e","value":{"v":1},"ttl_seconds":1}),
    ),
  )
  .await;

  let (_, _, before) = send(
    &h.app,
    request("/v1/get", Some(&token), json!({"agent_id":"a","path":"/ttl/e"})),
  )
  .await;
  assert_eq!(before["found"], json!(true));

  tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

  let (_, _, after) = send(
    &h.app,
    request("/v1/get", Some(&token), json!({"agent_id":"a","path":"/ttl/e"})),
  )
  .await;
  assert_eq!(after["found"], json!(false));
}

#[tokio::test]
async fn delete_appends_tombstone() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  send(
    &h.app,
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":"/gone","value":{"v":1}}),
    ),
  )
  .await;

  let (status, _, deleted) = send(
    &h.app,
    request("/v1/delete", Some(&token), json!({"agent_id":"a","path":"/gone"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(deleted["deleted"], json!(true));

  let (_, _, got) = send(
    &h.app,
    request("/v1/get", Some(&token), json!({"agent_id":"a","path":"/gone"})),
  )
  .await;
  assert_eq!(got["found"], json!(false));
}

#[tokio::test]
async fn reserved_and_invalid_paths_are_typed_errors() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  let (status, _, body) = send(
    &h.app,
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":"/sys/config","value":1}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(error_code(&body), "RESERVED_PATH");

  let (status, _, body) = send(
    &h.app,
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":"/a/../b","value":1}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(error_code(&body), "INVALID_PATH");

  let (status, _, body) = send(
    &h.app,
    request("/v1/put", Some(&token), json!({"path":"/a","value":1})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(error_code(&body), "VALIDATION_ERROR");
}

#[tokio::test]
async fn list_and_glob_surface() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  for path in ["/a", "/b", "/sub/c", "/glob/foo", "/glob/bar", "/glob/sub/baz"] {
    send(
      &h.app,
      request(
        "/v1/put",
        Some(&token),
        json!({"agent_id":"a","path":path,"value":1}),
      ),
    )
    .await;
  }

  let (_, _, listed) = send(
    &h.app,
    request("/v1/list", Some(&token), json!({"agent_id":"a","prefix":"/"})),
  )
  .await;
  let items = listed["items"].as_array().unwrap();
  assert!(items.contains(&json!({"path":"/a","type":"file"})));
  assert!(items.contains(&json!({"path":"/b","type":"file"})));
  assert!(items.contains(&json!({"path":"/sub","type":"dir"})));
  assert!(items.contains(&json!({"path":"/glob","type":"dir"})));

  let (_, _, globbed) = send(
    &h.app,
    request(
      "/v1/glob",
      Some(&token),
      json!({"agent_id":"a","pattern":"/glob/**"}),
    ),
  )
  .await;
  let paths = globbed["paths"].as_array().unwrap();
  assert_eq!(paths.len(), 3);

  let (status, _, body) = send(
    &h.app,
    request(
      "/v1/glob",
      Some(&token),
      json!({"agent_id":"a","pattern":"no-slash"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(error_code(&body), "INVALID_GLOB");
}

#[tokio::test]
async fn agents_lists_visible_counts() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  for (agent, path) in [("alpha", "/1"), ("alpha", "/2"), ("beta", "/1")] {
    send(
      &h.app,
      request(
        "/v1/put",
        Some(&token),
        json!({"agent_id":agent,"path":path,"value":1}),
      ),
    )
    .await;
  }

  let (_, _, body) =
    send(&h.app, request("/v1/agents", Some(&token), json!({}))).await;
  let agents = body["agents"].as_array().unwrap();
  assert!(agents.contains(&json!({"id":"alpha","memory_count":2})));
  assert!(agents.contains(&json!({"id":"beta","memory_count":1})));
}

// ─── Idempotency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn idempotent_puts_replay_and_mismatch() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  let body = json!({"agent_id":"a","path":"/i","value":{"a":1}});
  let with_key = |body: &Value| {
    let mut req = request("/v1/put", Some(&token), body.clone());
    req
      .headers_mut()
      .insert("Idempotency-Key", "K1".parse().unwrap());
    req
  };

  let (_, _, first) = send(&h.app, with_key(&body)).await;
  let (_, _, second) = send(&h.app, with_key(&body)).await;
  assert_eq!(first["version_id"], second["version_id"]);

  // Key-order-equivalent body still replays (canonical hashing).
  let reordered = json!({"value":{"a":1},"path":"/i","agent_id":"a"});
  let (_, _, third) = send(&h.app, with_key(&reordered)).await;
  assert_eq!(first["version_id"], third["version_id"]);

  let different = json!({"agent_id":"a","path":"/i","value":{"a":2}});
  let (status, _, body) = send(&h.app, with_key(&different)).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(error_code(&body), "IDEMPOTENCY_KEY_MISMATCH");
}

#[tokio::test]
async fn malformed_idempotency_key_is_rejected() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  let mut req = request(
    "/v1/put",
    Some(&token),
    json!({"agent_id":"a","path":"/i","value":1}),
  );
  req
    .headers_mut()
    .insert("Idempotency-Key", "bad key!".parse().unwrap());
  let (status, _, body) = send(&h.app, req).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(error_code(&body), "INVALID_IDEMPOTENCY_KEY");
}

// ─── Scopes, rate limits, quotas ─────────────────────────────────────────────

#[tokio::test]
async fn scope_is_enforced() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, vec![Scope::MemoryRead]).await;

  let (status, _, body) = send(
    &h.app,
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":"/x","value":1}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(error_code(&body), "FORBIDDEN");
}

#[tokio::test]
async fn endpoint_rate_limit_denies_with_headers() {
  let config = ApiConfig {
    rate_limit_per_minute: 2,
    ..ApiConfig::default()
  };
  let h = harness(config).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  let get = |_: usize| {
    request("/v1/get", Some(&token), json!({"agent_id":"a","path":"/x"}))
  };
  send(&h.app, get(0)).await;
  send(&h.app, get(1)).await;
  let (status, headers, body) = send(&h.app, get(2)).await;
  assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
  assert_eq!(error_code(&body), "RATE_LIMIT_EXCEEDED");
  assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "0");
  assert!(headers.contains_key("X-RateLimit-Reset"));
}

#[tokio::test]
async fn preauth_bucket_denies_before_auth() {
  let config = ApiConfig {
    preauth_rate_limit_per_minute: 1,
    ..ApiConfig::default()
  };
  let h = harness(config).await;

  // No credentials at all: the first request reaches auth (401), the second
  // dies at the pre-auth gate (429).
  let first = send(
    &h.app,
    request("/v1/get", None, json!({"agent_id":"a","path":"/x"})),
  )
  .await;
  assert_eq!(first.0, StatusCode::UNAUTHORIZED);

  let (status, headers, body) = send(
    &h.app,
    request("/v1/get", None, json!({"agent_id":"a","path":"/x"})),
  )
  .await;
  assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
  assert_eq!(error_code(&body), "PREAUTH_RATE_LIMIT_EXCEEDED");
  assert!(headers.contains_key("Retry-After"));
  assert!(headers.contains_key("X-PreAuth-RateLimit-Reset"));
}

#[tokio::test]
async fn write_quota_denies_after_limit() {
  let config = ApiConfig {
    write_quota_per_day: 1,
    ..ApiConfig::default()
  };
  let h = harness(config).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  let put = |n: usize| {
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":format!("/q/{n}"),"value":1}),
    )
  };
  let (status, _, _) = send(&h.app, put(0)).await;
  assert_eq!(status, StatusCode::OK);

  let (status, _, body) = send(&h.app, put(1)).await;
  assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
  assert_eq!(error_code(&body), "QUOTA_WRITES_PER_DAY");
}

#[tokio::test]
async fn search_quota_denies_after_limit() {
  let config = ApiConfig {
    search_quota_per_day: 1,
    ..ApiConfig::default()
  };
  let h = harness(config).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  let search = || {
    request(
      "/v1/search",
      Some(&token),
      json!({"agent_id":"a","query":"anything"}),
    )
  };
  let (status, _, _) = send(&h.app, search()).await;
  assert_eq!(status, StatusCode::OK);

  let (status, _, body) = send(&h.app, search()).await;
  assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
  assert_eq!(error_code(&body), "QUOTA_SEARCHES");
}

// ─── Auth lockout ────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_failures_lock_the_key_id() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;
  let bad = token.replace(SECRET, "definitely-wrong-secret");

  for _ in 0..10 {
    let (status, _, _) = send(
      &h.app,
      request("/v1/get", Some(&bad), json!({"agent_id":"a","path":"/x"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  let (status, headers, body) = send(
    &h.app,
    request("/v1/get", Some(&bad), json!({"agent_id":"a","path":"/x"})),
  )
  .await;
  assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
  assert_eq!(error_code(&body), "AUTH_LOCKOUT");
  assert!(headers.contains_key("Retry-After"));

  // The lockout is per id, so the correct secret is also refused.
  let (status, _, _) = send(
    &h.app,
    request("/v1/get", Some(&token), json!({"agent_id":"a","path":"/x"})),
  )
  .await;
  assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

// ─── Search ──────────────────────────────────────────────────────────────────

struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
  fn model(&self) -> &str {
    "keyword-mock"
  }

  /// Texts mentioning "alpha" land on one axis, everything else on the
  /// other, so ranking is deterministic.
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    if text.contains("alpha") {
      Ok(vec![1.0, 0.0])
    } else {
      Ok(vec![0.0, 1.0])
    }
  }
}

#[tokio::test]
async fn search_without_embedder_returns_note() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  let (status, _, body) = send(
    &h.app,
    request(
      "/v1/search",
      Some(&token),
      json!({"agent_id":"a","query":"hello"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["results"], json!([]));
  assert!(body["note"].as_str().is_some());
}

#[tokio::test]
async fn search_ranks_inline_embedded_entries() {
  let h = harness_with_embedder(
    ApiConfig::default(),
    Some(Arc::new(KeywordEmbedder)),
  )
  .await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  for (path, value, tags) in [
    ("/notes/alpha", json!("about alpha things"), json!(["greek"])),
    ("/notes/other", json!("unrelated"), json!([])),
  ] {
    let (status, _, _) = send(
      &h.app,
      request(
        "/v1/put",
        Some(&token),
        json!({
          "agent_id": "a",
          "path": path,
          "value": value,
          "tags": tags,
          "searchable": true,
        }),
      ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
  }

  let (status, _, body) = send(
    &h.app,
    request(
      "/v1/search",
      Some(&token),
      json!({"agent_id":"a","query":"alpha","limit":5}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let results = body["results"].as_array().unwrap();
  assert_eq!(results.len(), 2);
  assert_eq!(results[0]["path"], json!("/notes/alpha"));
  assert!(
    results[0]["similarity"].as_f64().unwrap()
      > results[1]["similarity"].as_f64().unwrap()
  );

  // tags_any post-filter narrows the result set.
  let (_, _, tagged) = send(
    &h.app,
    request(
      "/v1/search",
      Some(&token),
      json!({"agent_id":"a","query":"alpha","tags_any":["greek"]}),
    ),
  )
  .await;
  let results = tagged["results"].as_array().unwrap();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0]["path"], json!("/notes/alpha"));
}

// ─── Dump cache ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn dump_cache_header_and_invalidation() {
  let h = harness(ApiConfig::default()).await;
  let (token, _) = seed_key(&h.store, Scope::all_non_admin()).await;

  send(
    &h.app,
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":"/d/1","value":1}),
    ),
  )
  .await;

  let dump = || request("/v1/dump", Some(&token), json!({"agent_id":"a"}));

  let (_, headers, first) = send(&h.app, dump()).await;
  assert_eq!(headers.get("X-Cache").unwrap(), "MISS");
  assert_eq!(first["count"], json!(1));

  let (_, headers, _) = send(&h.app, dump()).await;
  assert_eq!(headers.get("X-Cache").unwrap(), "HIT");

  // A write for the agent invalidates the cached dump.
  send(
    &h.app,
    request(
      "/v1/put",
      Some(&token),
      json!({"agent_id":"a","path":"/d/2","value":2}),
    ),
  )
  .await;
  let (_, headers, second) = send(&h.app, dump()).await;
  assert_eq!(headers.get("X-Cache").unwrap(), "MISS");
  assert_eq!(second["count"], json!(2));
}

// ─── Admin & metrics ─────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_bootstrap_mints_usable_keys() {
  let config = ApiConfig {
    admin_bootstrap_token: Some("bootstrap-token".into()),
    ..ApiConfig::default()
  };
  let h = harness(config).await;

  let (status, _, body) = send(
    &h.app,
    request(
      "/v1/admin/create-key",
      None,
      json!({"token":"bootstrap-token","label":"ci"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let api_key = body["api_key"].as_str().unwrap().to_owned();

  let (status, _, put) = send(
    &h.app,
    request(
      "/v1/put",
      Some(&api_key),
      json!({"agent_id":"a","path":"/boot","value":1}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(put["ok"], json!(true));

  let (status, _, body) = send(
    &h.app,
    request("/v1/admin/create-key", None, json!({"token":"wrong"})),
  )
  .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(error_code(&body), "UNAUTHORIZED");
}

#[tokio::test]
async fn metrics_endpoint_is_gated() {
  let config = ApiConfig {
    enable_metrics: true,
    metrics_token: Some("metrics-token".into()),
    ..ApiConfig::default()
  };
  let h = harness(config).await;

  let bare = Request::builder()
    .uri("/metrics")
    .body(Body::empty())
    .unwrap();
  let (status, _, _) = send(&h.app, bare).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let authed = Request::builder()
    .uri("/metrics")
    .header(header::AUTHORIZATION, "Bearer metrics-token")
    .body(Body::empty())
    .unwrap();
  let response = h.app.clone().oneshot(authed).await.unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let text = String::from_utf8(
    response
      .into_body()
      .collect()
      .await
      .unwrap()
      .to_bytes()
      .to_vec(),
  )
  .unwrap();
  assert!(text.contains("agentos_http_requests_total"));
}

#[tokio::test]
async fn metrics_endpoint_absent_when_disabled() {
  let h = harness(ApiConfig::default()).await;
  let req = Request::builder()
    .uri("/metrics")
    .body(Body::empty())
    .unwrap();
  let (status, _, _) = send(&h.app, req).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}
