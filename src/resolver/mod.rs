//! The resolution engine: a race of chain walkers over shuffled sources,
//! fronted by an optional result cache.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
  common::{http::HttpClient, types::AnyResult},
  configs::Config,
  extract::ExtractorChain,
  hls::{self, Variant},
  transport::{Fetcher, Transport},
};

pub mod cache;
pub mod scheduler;
pub mod types;
pub mod walker;

pub use cache::{CacheError, CachedStream, MemoryCache, ResultCache};
pub use scheduler::{RaceScheduler, RaceSettings};
pub use types::{ChainState, ContentKind, FoundStream, ResolutionOutcome, ResolutionRequest, Source};
pub use walker::{ChainTrace, ChainWalker, HopRecord, WalkSettings};

/// A stream handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStream {
  pub manifest_url: String,
  pub source_identity: String,
  /// `None` when served from the cache.
  pub hops_used: Option<usize>,
  pub variant: Option<Variant>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
  Stream(ResolvedStream),
  Unavailable { source_identity: String },
  NotFound,
}

impl Resolved {
  pub fn stream(&self) -> Option<&ResolvedStream> {
    match self {
      Self::Stream(stream) => Some(stream),
      _ => None,
    }
  }
}

pub struct Resolver {
  scheduler: RaceScheduler,
  sources: Vec<Source>,
  cache: Option<(Arc<dyn ResultCache>, Duration)>,
  prefer_best_variant: bool,
}

impl Resolver {
  pub fn new(scheduler: RaceScheduler, sources: Vec<Source>) -> Self {
    Self {
      scheduler,
      sources,
      cache: None,
      prefer_best_variant: false,
    }
  }

  /// Wires transport, extractors, walker and scheduler from `config`.
  pub fn from_config(config: &Config) -> AnyResult<Self> {
    let transport = Transport::new(&config.transport)?;
    let extractors = ExtractorChain::from_config(&config.extraction)?;
    let settings = WalkSettings {
      max_hops: config.resolver.max_hops,
      unavailable_marker: config.resolver.unavailable_marker.clone(),
      base_headers: HttpClient::browser_headers(
        config.transport.user_agent.as_deref(),
        &config.transport.headers,
      ),
    };
    let walker = ChainWalker::new(Arc::new(transport), Arc::new(extractors), settings);
    let scheduler = RaceScheduler::new(walker, RaceSettings::from(&config.resolver));

    let mut resolver = Self::new(scheduler, Source::from_config(&config.sources))
      .prefer_best_variant(config.resolver.prefer_best_variant);
    if config.cache.enabled {
      resolver = resolver.with_cache(
        Arc::new(MemoryCache::new()),
        Duration::from_secs(config.cache.ttl_secs),
      );
    }
    Ok(resolver)
  }

  pub fn with_cache(mut self, cache: Arc<dyn ResultCache>, ttl: Duration) -> Self {
    self.cache = Some((cache, ttl));
    self
  }

  pub fn prefer_best_variant(mut self, enabled: bool) -> Self {
    self.prefer_best_variant = enabled;
    self
  }

  pub fn source_count(&self) -> usize {
    self.sources.len()
  }

  pub fn walker(&self) -> &ChainWalker {
    self.scheduler.walker()
  }

  pub async fn resolve(&self, request: &ResolutionRequest) -> Resolved {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("resolve", %request_id, content_id = %request.content_id);
    self.resolve_inner(request).instrument(span).await
  }

  async fn resolve_inner(&self, request: &ResolutionRequest) -> Resolved {
    let key = request.cache_key();
    if let Some(hit) = self.cache_get(&key).await {
      debug!("Cache hit for {}", key);
      return Resolved::Stream(ResolvedStream {
        manifest_url: hit.manifest_url,
        source_identity: hit.source_identity,
        hops_used: None,
        variant: hit.variant.filter(|_| self.prefer_best_variant),
      });
    }

    let outcome = self.scheduler.resolve(request, &self.sources).await;
    info!("Race for {} ended: {}", key, outcome.label());

    match outcome {
      ResolutionOutcome::Found(found) => {
        let variant = if self.prefer_best_variant {
          self.best_variant(&found.manifest_url).await
        } else {
          None
        };
        self
          .cache_set(
            &key,
            CachedStream {
              manifest_url: found.manifest_url.clone(),
              source_identity: found.source_identity.clone(),
              variant: variant.clone(),
            },
          )
          .await;
        Resolved::Stream(ResolvedStream {
          manifest_url: found.manifest_url,
          source_identity: found.source_identity,
          hops_used: Some(found.hops_used),
          variant,
        })
      }
      ResolutionOutcome::Unavailable { source_identity } => Resolved::Unavailable { source_identity },
      ResolutionOutcome::NotFound | ResolutionOutcome::TransportError { .. } => Resolved::NotFound,
    }
  }

  async fn cache_get(&self, key: &str) -> Option<CachedStream> {
    let (cache, _) = self.cache.as_ref()?;
    match cache.get(key).await {
      Ok(hit) => hit,
      Err(e) => {
        warn!("Cache read failed for {}: {}", key, e);
        None
      }
    }
  }

  async fn cache_set(&self, key: &str, value: CachedStream) {
    let Some((cache, ttl)) = self.cache.as_ref() else {
      return;
    };
    if let Err(e) = cache.set(key, value, *ttl).await {
      warn!("Cache write failed for {}: {}", key, e);
    }
  }

  /// Fetches the master playlist once; any failure keeps the master URL.
  async fn best_variant(&self, manifest_url: &str) -> Option<Variant> {
    let walker = self.scheduler.walker();
    let resp = walker
      .fetcher()
      .fetch(manifest_url, walker.base_headers(), &CancellationToken::new())
      .await;
    match resp {
      Ok(resp) if resp.is_success() => hls::select_best_variant(&resp.body, manifest_url),
      Ok(resp) => {
        debug!("Manifest fetch answered {}", resp.status);
        None
      }
      Err(e) => {
        debug!("Manifest fetch failed: {}", e);
        None
      }
    }
  }
}
