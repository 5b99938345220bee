//! Prometheus counters and histograms emitted by the request pipeline and
//! the embedding worker.

use std::time::Instant;

use prometheus::{
  Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
  TextEncoder,
};

/// All metrics owned by one process, registered on a private registry.
pub struct Metrics {
  registry: Registry,

  /// `agentos_http_requests_total{endpoint, status}`
  pub http_requests: IntCounterVec,
  /// `agentos_http_request_duration_seconds{endpoint}`
  pub http_duration: HistogramVec,
  /// `agentos_quota_denials_total{type}`
  pub quota_denials: IntCounterVec,
  /// `agentos_embed_jobs_total{outcome}`
  pub embed_jobs: IntCounterVec,
  /// `agentos_dump_cache_total{result}`
  pub dump_cache: IntCounterVec,
}

impl Metrics {
  pub fn new() -> Self {
    let registry = Registry::new();

    let http_requests = IntCounterVec::new(
      Opts::new("agentos_http_requests_total", "API requests by endpoint"),
      &["endpoint", "status"],
    )
    .expect("http_requests metric");

    let http_duration = HistogramVec::new(
      HistogramOpts::new(
        "agentos_http_request_duration_seconds",
        "API request duration",
      ),
      &["endpoint"],
    )
    .expect("http_duration metric");

    let quota_denials = IntCounterVec::new(
      Opts::new("agentos_quota_denials_total", "Quota denials by type"),
      &["type"],
    )
    .expect("quota_denials metric");

    let embed_jobs = IntCounterVec::new(
      Opts::new("agentos_embed_jobs_total", "Embedding job outcomes"),
      &["outcome"],
    )
    .expect("embed_jobs metric");

    let dump_cache = IntCounterVec::new(
      Opts::new("agentos_dump_cache_total", "Dump cache lookups"),
      &["result"],
    )
    .expect("dump_cache metric");

    for collector in [
      Box::new(http_requests.clone()) as Box<dyn prometheus::core::Collector>,
      Box::new(http_duration.clone()),
      Box::new(quota_denials.clone()),
      Box::new(embed_jobs.clone()),
      Box::new(dump_cache.clone()),
    ] {
      registry.register(collector).expect("metric registration");
    }

    Self {
      registry,
      http_requests,
      http_duration,
      quota_denials,
      embed_jobs,
      dump_cache,
    }
  }

  pub fn observe_request(&self, endpoint: &str, status: u16, started: Instant) {
    self
      .http_requests
      .with_label_values(&[endpoint, &status.to_string()])
      .inc();
    self
      .http_duration
      .with_label_values(&[endpoint])
      .observe(started.elapsed().as_secs_f64());
  }

  pub fn quota_denial(&self, kind: &str) {
    self.quota_denials.with_label_values(&[kind]).inc();
  }

  pub fn job_outcome(&self, outcome: &str) {
    self.embed_jobs.with_label_values(&[outcome]).inc();
  }

  pub fn dump_cache_result(&self, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    self.dump_cache.with_label_values(&[result]).inc();
  }

  /// Render the registry in Prometheus text exposition format.
  pub fn render(&self) -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
      return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
  }
}

impl Default for Metrics {
  fn default() -> Self {
    Self::new()
  }
}
