//! agentos-server binary.
//!
//! Reads configuration from the environment, opens the SQLite store with
//! warmup retries, and serves the AgentOS API over HTTP, running the
//! embedding worker and the idempotency sweeper alongside.
//!
//! # Key secret hashing
//!
//! To generate the argon2 PHC string for a key secret out of band:
//!
//! ```
//! cargo run -p agentos-server -- --hash-secret
//! ```

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use serde::Deserialize;
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use agentos_api::{ApiConfig, AppState, router};
use agentos_core::store::MemoryStore;
use agentos_embed::{EmbedWorker, Embedder, JobOutcome, OpenAiEmbedder};
use agentos_store_sqlite::SqliteStore;

/// How often the idempotency sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Database warmup: attempts and per-step delay increment.
const DB_WARMUP_ATTEMPTS: u32 = 5;
const DB_WARMUP_STEP: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(author, version, about = "AgentOS memory server")]
struct Cli {
  /// Print the argon2 hash for a key secret entered on stdin and exit.
  #[arg(long)]
  hash_secret: bool,
}

/// Environment configuration. Every field maps 1:1 to an environment
/// variable of the same name uppercased (`PORT`, `DATABASE_URL`, …).
#[derive(Debug, Clone, Deserialize)]
struct ServerConfig {
  #[serde(default = "default_port")]
  port: u16,
  #[serde(default = "default_database_url")]
  database_url: String,
  node_env: Option<String>,
  trust_proxy: Option<bool>,
  enable_metrics: Option<bool>,
  metrics_token: Option<String>,
  admin_bootstrap_token: Option<String>,
  write_quota_per_day: Option<i64>,
  embed_tokens_quota_per_day: Option<i64>,
  search_quota_per_day: Option<i64>,
  search_rate_limit_per_minute: Option<u32>,
  rate_limit_requests_per_minute: Option<u32>,
  preauth_rate_limit_per_minute: Option<u32>,
  openai_api_key: Option<String>,
  #[serde(default = "default_embed_model")]
  openai_embed_model: String,
}

fn default_port() -> u16 {
  8080
}

fn default_database_url() -> String {
  "agentos.db".to_owned()
}

fn default_embed_model() -> String {
  "text-embedding-3-small".to_owned()
}

impl ServerConfig {
  fn api_config(&self) -> ApiConfig {
    let defaults = ApiConfig::default();
    ApiConfig {
      production: self.node_env.as_deref() == Some("production"),
      trust_proxy: self.trust_proxy.unwrap_or(false),
      enable_metrics: self.enable_metrics.unwrap_or(false),
      metrics_token: self.metrics_token.clone(),
      admin_bootstrap_token: self.admin_bootstrap_token.clone(),
      write_quota_per_day: self
        .write_quota_per_day
        .unwrap_or(defaults.write_quota_per_day),
      embed_tokens_quota_per_day: self
        .embed_tokens_quota_per_day
        .unwrap_or(defaults.embed_tokens_quota_per_day),
      search_quota_per_day: self
        .search_quota_per_day
        .unwrap_or(defaults.search_quota_per_day),
      rate_limit_per_minute: self
        .rate_limit_requests_per_minute
        .unwrap_or(defaults.rate_limit_per_minute),
      search_rate_limit_per_minute: self
        .search_rate_limit_per_minute
        .unwrap_or(defaults.search_rate_limit_per_minute),
      admin_rate_limit_per_minute: defaults.admin_rate_limit_per_minute,
      preauth_rate_limit_per_minute: self
        .preauth_rate_limit_per_minute
        .unwrap_or(defaults.preauth_rate_limit_per_minute),
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Helper mode: hash a secret and exit.
  if cli.hash_secret {
    let secret = read_line_from_stdin()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(secret.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  // Load configuration from the environment.
  let settings = config::Config::builder()
    .add_source(config::Environment::default().try_parsing(true))
    .build()
    .context("failed to read environment configuration")?;
  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Open the store, retrying while the database warms up.
  let store = Arc::new(open_store_with_retry(&server_cfg.database_url).await?);

  // Outbound embedder, when configured.
  let embedder: Option<Arc<dyn Embedder>> = match &server_cfg.openai_api_key {
    Some(key) => {
      let embedder =
        OpenAiEmbedder::new(key.clone(), server_cfg.openai_embed_model.clone())
          .map_err(|e| anyhow::anyhow!("embedder init: {e}"))?;
      tracing::info!(model = %server_cfg.openai_embed_model, "embeddings enabled");
      Some(Arc::new(embedder))
    }
    None => {
      tracing::info!("no OPENAI_API_KEY; embeddings disabled");
      None
    }
  };

  let state = AppState::new(store.clone(), embedder.clone(), server_cfg.api_config());
  let (shutdown_tx, shutdown_rx) = watch::channel(false);

  // Embedding worker.
  if let Some(embedder) = embedder {
    let metrics = state.metrics.clone();
    let worker =
      EmbedWorker::new(store.clone(), embedder).with_observer(Arc::new(
        move |outcome: &JobOutcome| {
          let label = match outcome {
            JobOutcome::Succeeded { .. } => "succeeded",
            JobOutcome::Requeued { .. } => "retried",
            JobOutcome::Failed { .. } => "failed",
          };
          metrics.job_outcome(label);
        },
      ));
    let worker_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
      worker.run(worker_shutdown).await;
    });
  }

  // Idempotency sweeper.
  {
    let store = store.clone();
    let mut sweep_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
          _ = sweep_shutdown.changed() => return,
        }
        match store.sweep_idempotency().await {
          Ok(removed) if removed > 0 => {
            tracing::info!(removed, "swept expired idempotency keys");
          }
          Ok(_) => {}
          Err(e) => tracing::warn!(error = %e, "idempotency sweep failed"),
        }
      }
    });
  }

  let app = router(state);
  let address = format!("0.0.0.0:{}", server_cfg.port);

  tracing::info!("listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .with_graceful_shutdown(async move {
    shutdown_signal().await;
    tracing::info!("shutting down: draining in-flight requests");
    let _ = shutdown_tx.send(true);
  })
  .await
  .context("server error")?;

  Ok(())
}

/// Open the store, retrying with a linearly increasing delay.
async fn open_store_with_retry(url: &str) -> anyhow::Result<SqliteStore> {
  let path = database_path(url);
  let mut last_error = None;
  for attempt in 1..=DB_WARMUP_ATTEMPTS {
    match SqliteStore::open(path).await {
      Ok(store) => return Ok(store),
      Err(e) => {
        tracing::warn!(attempt, error = %e, "database open failed");
        last_error = Some(e);
        tokio::time::sleep(DB_WARMUP_STEP * attempt).await;
      }
    }
  }
  Err(last_error.map_or_else(
    || anyhow::anyhow!("database open failed"),
    |e| anyhow::Error::new(e).context("database open failed"),
  ))
}

/// Accept a bare path, `sqlite:<path>`, or `sqlite://<path>`.
fn database_path(url: &str) -> &str {
  url
    .strip_prefix("sqlite://")
    .or_else(|| url.strip_prefix("sqlite:"))
    .unwrap_or(url)
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
  let ctrl_c = async {
    let _ = signal::ctrl_c().await;
  };

  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut stream) => {
        stream.recv().await;
      }
      Err(_) => std::future::pending::<()>().await,
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {}
    _ = terminate => {}
  }
}

/// Read one line from stdin, stripping the trailing newline.
fn read_line_from_stdin() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Secret: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}
