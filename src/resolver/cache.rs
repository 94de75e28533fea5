use std::{
  sync::atomic::{AtomicUsize, Ordering},
  time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hls::Variant;

/// Inserts between sweeps of expired entries.
const PURGE_EVERY: usize = 64;

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache backend unavailable: {0}")]
  Unavailable(String),
}

/// What is remembered for a resolved request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedStream {
  pub manifest_url: String,
  pub source_identity: String,
  /// The variant picked when the stream was first resolved, if any.
  #[serde(default)]
  pub variant: Option<Variant>,
}

/// Storage for successful resolutions. Callers log and ignore failures.
#[async_trait]
pub trait ResultCache: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<CachedStream>, CacheError>;
  async fn set(&self, key: &str, value: CachedStream, ttl: Duration) -> Result<(), CacheError>;
}

/// In-process cache with per-entry expiry. An entry whose TTL overflows the
/// clock never expires.
#[derive(Default)]
pub struct MemoryCache {
  entries: DashMap<String, (CachedStream, Option<Instant>)>,
  inserts: AtomicUsize,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Drops every expired entry.
  pub fn purge_expired(&self) {
    let now = Instant::now();
    self
      .entries
      .retain(|_, (_, expires)| expires.is_none_or(|at| at > now));
  }
}

#[async_trait]
impl ResultCache for MemoryCache {
  async fn get(&self, key: &str) -> Result<Option<CachedStream>, CacheError> {
    let now = Instant::now();
    let hit = self
      .entries
      .get(key)
      .map(|entry| (entry.0.clone(), entry.1.is_none_or(|at| at > now)));
    match hit {
      Some((value, true)) => Ok(Some(value)),
      Some((_, false)) => {
        self.entries.remove(key);
        Ok(None)
      }
      None => Ok(None),
    }
  }

  async fn set(&self, key: &str, value: CachedStream, ttl: Duration) -> Result<(), CacheError> {
    if self.inserts.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
      self.purge_expired();
    }
    let expires = Instant::now().checked_add(ttl);
    self.entries.insert(key.to_string(), (value, expires));
    Ok(())
  }
}
