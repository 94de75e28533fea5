use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;

pub const DEFAULT_UNAVAILABLE_MARKER: &str = "This media is unavailable at the moment.";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ResolverConfig {
  /// Walkers allowed in flight at once.
  pub concurrency: usize,
  /// Pages a single walker may fetch.
  pub max_hops: usize,
  pub stagger_min_ms: u64,
  pub stagger_max_ms: u64,
  pub unavailable_marker: String,
  pub prefer_best_variant: bool,
}

impl Default for ResolverConfig {
  fn default() -> Self {
    Self {
      concurrency: 3,
      max_hops: 5,
      stagger_min_ms: 40,
      stagger_max_ms: 160,
      unavailable_marker: DEFAULT_UNAVAILABLE_MARKER.to_string(),
      prefer_best_variant: false,
    }
  }
}

impl ResolverConfig {
  pub fn validate(&self) -> AnyResult<()> {
    if self.concurrency == 0 {
      return Err("resolver.concurrency must be at least 1".into());
    }
    if self.max_hops == 0 {
      return Err("resolver.max_hops must be at least 1".into());
    }
    if self.stagger_min_ms > self.stagger_max_ms {
      return Err("resolver.stagger_min_ms must not exceed stagger_max_ms".into());
    }
    Ok(())
  }
}
