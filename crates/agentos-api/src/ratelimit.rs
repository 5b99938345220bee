//! Process-local rate limiters.
//!
//! Two layers: a per-`(tenant, endpoint)` sliding window applied after
//! authentication, and a per-IP token bucket consulted on `/v1/*` before any
//! auth or database work. Both are best-effort under multi-instance
//! deployment; each process enforces its own share.

use std::{collections::HashMap, net::IpAddr, sync::Mutex};

use axum::{
  extract::{ConnectInfo, Request, State},
  http::HeaderValue,
  middleware::Next,
  response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

use agentos_core::store::MemoryStore;

use crate::{AppState, error::ApiError};

/// Window length for the authenticated limiter, seconds.
const WINDOW_SECS: i64 = 60;

/// Buckets idle for two windows are evicted.
const BUCKET_IDLE_MS: i64 = 2 * WINDOW_SECS * 1000;

/// Eviction scan threshold for the bucket map.
const BUCKET_SCAN_LEN: usize = 1024;

/// State returned by a successful limiter check, emitted as
/// `X-RateLimit-*` / `X-PreAuth-RateLimit-*` headers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
  pub limit:       u32,
  pub remaining:   u32,
  pub reset_epoch: i64,
}

// ─── Sliding window ──────────────────────────────────────────────────────────

struct Window {
  count:       u32,
  start_epoch: i64,
}

/// Fixed 60-second windows per `(tenant, endpoint)`; the counter resets when
/// a window expires.
#[derive(Default)]
pub struct SlidingWindows {
  inner: Mutex<HashMap<(Uuid, &'static str), Window>>,
}

impl SlidingWindows {
  pub fn check(
    &self,
    tenant: Uuid,
    endpoint: &'static str,
    limit: u32,
  ) -> Result<RateLimitInfo, ApiError> {
    let now = Utc::now().timestamp();
    let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let window = map.entry((tenant, endpoint)).or_insert(Window {
      count:       0,
      start_epoch: now,
    });

    if now - window.start_epoch >= WINDOW_SECS {
      window.count = 0;
      window.start_epoch = now;
    }

    window.count += 1;
    let reset_epoch = window.start_epoch + WINDOW_SECS;
    if window.count > limit {
      return Err(ApiError::RateLimited { limit, reset_epoch });
    }
    Ok(RateLimitInfo {
      limit,
      remaining: limit - window.count,
      reset_epoch,
    })
  }
}

// ─── Pre-auth token bucket ───────────────────────────────────────────────────

struct Bucket {
  tokens:     f64,
  updated_ms: i64,
}

/// Per-IP token bucket with linear refill of `limit / 60_000` tokens per
/// millisecond, capacity `limit`.
#[derive(Default)]
pub struct PreAuthBuckets {
  inner: Mutex<HashMap<IpAddr, Bucket>>,
}

impl PreAuthBuckets {
  pub fn take(&self, ip: IpAddr, limit: u32) -> Result<RateLimitInfo, ApiError> {
    let now_ms = Utc::now().timestamp_millis();
    let capacity = f64::from(limit);
    let rate_per_ms = capacity / 60_000.0;

    let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    if map.len() > BUCKET_SCAN_LEN {
      map.retain(|_, b| now_ms - b.updated_ms < BUCKET_IDLE_MS);
    }

    let bucket = map.entry(ip).or_insert(Bucket {
      tokens:     capacity,
      updated_ms: now_ms,
    });

    let elapsed_ms = (now_ms - bucket.updated_ms).max(0) as f64;
    bucket.tokens = (bucket.tokens + elapsed_ms * rate_per_ms).min(capacity);
    bucket.updated_ms = now_ms;

    if bucket.tokens >= 1.0 {
      bucket.tokens -= 1.0;
      Ok(RateLimitInfo {
        limit,
        remaining: bucket.tokens.floor() as u32,
        reset_epoch: now_ms / 1000 + WINDOW_SECS,
      })
    } else {
      let deficit = 1.0 - bucket.tokens;
      let retry_after_secs = ((deficit / rate_per_ms) / 1000.0).ceil() as u64;
      Err(ApiError::PreAuthRateLimited {
        limit,
        retry_after_secs,
        reset_epoch: now_ms / 1000 + retry_after_secs as i64,
      })
    }
  }
}

/// Both limiter maps, shared through [`AppState`].
#[derive(Default)]
pub struct RateLimits {
  pub windows: SlidingWindows,
  pub preauth: PreAuthBuckets,
}

impl RateLimits {
  pub fn new() -> Self {
    Self::default()
  }
}

// ─── Middleware ──────────────────────────────────────────────────────────────

/// Resolve the client IP, honoring `X-Forwarded-For` only when the deployment
/// says the proxy is trusted. Falls back to the unspecified address when the
/// transport provides no peer info (some test harnesses).
fn client_ip(request: &Request, trust_proxy: bool) -> IpAddr {
  if trust_proxy
    && let Some(forwarded) = request.headers().get("x-forwarded-for")
    && let Ok(value) = forwarded.to_str()
    && let Some(first) = value.split(',').next()
    && let Ok(ip) = first.trim().parse()
  {
    return ip;
  }
  request
    .extensions()
    .get::<ConnectInfo<std::net::SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip())
    .unwrap_or(IpAddr::from([0, 0, 0, 0]))
}

/// Pre-auth gate applied to every `/v1/*` request before authentication or
/// any database access.
pub async fn preauth_middleware<S>(
  State(state): State<AppState<S>>,
  request: Request,
  next: Next,
) -> Response
where
  S: MemoryStore + 'static,
{
  let ip = client_ip(&request, state.config.trust_proxy);
  let info = match state
    .limits
    .preauth
    .take(ip, state.config.preauth_rate_limit_per_minute)
  {
    Ok(info) => info,
    Err(denied) => return denied.into_response(),
  };

  let mut response = next.run(request).await;
  let headers = response.headers_mut();
  if let Ok(v) = HeaderValue::from_str(&info.limit.to_string()) {
    headers.insert("X-PreAuth-RateLimit-Limit", v);
  }
  if let Ok(v) = HeaderValue::from_str(&info.remaining.to_string()) {
    headers.insert("X-PreAuth-RateLimit-Remaining", v);
  }
  if let Ok(v) = HeaderValue::from_str(&info.reset_epoch.to_string()) {
    headers.insert("X-PreAuth-RateLimit-Reset", v);
  }
  response
}

// ─── Tests ───────────────────────────────────────────────────────────────────
