use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::{Rng, seq::SliceRandom};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
  types::{ResolutionOutcome, ResolutionRequest, Source},
  walker::ChainWalker,
};
use crate::{configs::ResolverConfig, transport::TransportError};

#[derive(Debug, Clone, Copy)]
pub struct RaceSettings {
  pub concurrency: usize,
  pub stagger_min: Duration,
  pub stagger_max: Duration,
}

impl From<&ResolverConfig> for RaceSettings {
  fn from(config: &ResolverConfig) -> Self {
    Self {
      concurrency: config.concurrency.max(1),
      stagger_min: Duration::from_millis(config.stagger_min_ms),
      stagger_max: Duration::from_millis(config.stagger_max_ms.max(config.stagger_min_ms)),
    }
  }
}

/// Races chain walkers over a shuffled source list with a bounded pool.
///
/// The first `Found` or `Unavailable` wins: the shared token is cancelled,
/// every walker still running is aborted and its result is never read.
#[derive(Clone)]
pub struct RaceScheduler {
  walker: ChainWalker,
  settings: RaceSettings,
}

impl RaceScheduler {
  pub fn new(walker: ChainWalker, settings: RaceSettings) -> Self {
    Self { walker, settings }
  }

  pub fn walker(&self) -> &ChainWalker {
    &self.walker
  }

  pub async fn resolve(&self, request: &ResolutionRequest, sources: &[Source]) -> ResolutionOutcome {
    let mut queue = sources.to_vec();
    queue.shuffle(&mut rand::thread_rng());
    self.race(request, queue).await
  }

  /// Runs the race over `queue` in the given order.
  pub async fn race(&self, request: &ResolutionRequest, queue: Vec<Source>) -> ResolutionOutcome {
    let cancel = CancellationToken::new();
    let mut pending = queue.into_iter();
    let mut running: FuturesUnordered<JoinHandle<ResolutionOutcome>> = FuturesUnordered::new();
    let mut handles = Vec::new();
    let mut next_launch = Instant::now();

    let outcome = loop {
      let can_launch = running.len() < self.settings.concurrency && pending.len() > 0;
      if !can_launch && running.is_empty() {
        break ResolutionOutcome::NotFound;
      }

      tokio::select! {
        _ = tokio::time::sleep_until(next_launch), if can_launch => {
          let Some(source) = pending.next() else { continue };
          let handle = self.spawn_walker(request, source, cancel.child_token());
          handles.push(handle.abort_handle());
          running.push(handle);
          next_launch = Instant::now() + self.jitter();
        }
        Some(joined) = running.next(), if !running.is_empty() => {
          let result = joined.unwrap_or_else(|e| {
            warn!("Walker task failed: {}", e);
            ResolutionOutcome::TransportError {
              detail: TransportError::Network(e.to_string()),
            }
          });
          if result.is_decisive() {
            break result;
          }
          debug!("Walker finished with {}, freeing slot", result.label());
        }
      }
    };

    cancel.cancel();
    for handle in handles {
      handle.abort();
    }
    outcome
  }

  fn spawn_walker(
    &self,
    request: &ResolutionRequest,
    source: Source,
    cancel: CancellationToken,
  ) -> JoinHandle<ResolutionOutcome> {
    let walker = self.walker.clone();
    let start_url = source.origin_url(request);
    debug!("Launching walker for {} at {}", source.identity, start_url);
    tokio::spawn(async move { walker.walk(&start_url, &source, &cancel).await })
  }

  fn jitter(&self) -> Duration {
    let (min, max) = (self.settings.stagger_min, self.settings.stagger_max);
    if max <= min {
      return min;
    }
    rand::thread_rng().gen_range(min..=max)
  }
}
