//! Process-local response cache for DUMP.
//!
//! Keyed `(tenant, agent, limit)` with a 60 s TTL and a hard size cap;
//! exceeding the cap evicts the oldest half. Invalidated on every
//! successful write for the agent.

use std::{
  collections::HashMap,
  sync::Mutex,
  time::{Duration, Instant},
};

use serde_json::Value;
use uuid::Uuid;

pub const DUMP_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DUMP_CACHE_CAP: usize = 100;

type Key = (Uuid, String, usize);

struct Cached {
  inserted: Instant,
  response: Value,
}

#[derive(Default)]
pub struct DumpCache {
  inner: Mutex<HashMap<Key, Cached>>,
}

impl DumpCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, tenant: Uuid, agent: &str, limit: usize) -> Option<Value> {
    let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let cached = map.get(&(tenant, agent.to_owned(), limit))?;
    if cached.inserted.elapsed() > DUMP_CACHE_TTL {
      return None;
    }
    Some(cached.response.clone())
  }

  pub fn insert(&self, tenant: Uuid, agent: &str, limit: usize, response: Value) {
    let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    if map.len() >= DUMP_CACHE_CAP {
      let mut by_age: Vec<(Key, Instant)> = map
        .iter()
        .map(|(k, v)| (k.clone(), v.inserted))
        .collect();
      by_age.sort_by_key(|(_, inserted)| *inserted);
      for (key, _) in by_age.into_iter().take(DUMP_CACHE_CAP / 2) {
        map.remove(&key);
      }
    }
    map.insert(
      (tenant, agent.to_owned(), limit),
      Cached {
        inserted: Instant::now(),
        response,
      },
    );
  }

  /// Drop every cached dump for `(tenant, agent)`, all limits.
  pub fn invalidate(&self, tenant: Uuid, agent: &str) {
    let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    map.retain(|(t, a, _), _| !(*t == tenant && a == agent));
  }
}
