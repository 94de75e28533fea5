use std::sync::Arc;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue, REFERER};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::{ChainState, FoundStream, ResolutionOutcome, Source};
use crate::{
  extract::{
    ExtractorChain,
    encoded::encoded_filename,
    next_hop::{origin_referer, resolve_next},
  },
  transport::{FetchRoute, Fetcher, TransportError},
};

#[derive(Debug, Clone)]
pub struct WalkSettings {
  pub max_hops: usize,
  /// Checked on the first page only. Empty disables the check.
  pub unavailable_marker: String,
  pub base_headers: HeaderMap,
}

/// One fetched page of a chain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HopRecord {
  pub url: String,
  pub status: Option<u16>,
  pub route: Option<String>,
  pub error: Option<String>,
}

/// Everything a walk saw, for diagnostics.
#[derive(Debug, Clone)]
pub struct ChainTrace {
  pub outcome: ResolutionOutcome,
  pub hops: Vec<HopRecord>,
  pub last_body: Option<String>,
  /// File name decoded from the first `atob` payload seen on the chain.
  pub filename: Option<String>,
}

/// Follows one source's chain of embedded pages to a manifest, a dead end,
/// or the unavailable marker.
#[derive(Clone)]
pub struct ChainWalker {
  fetcher: Arc<dyn Fetcher>,
  extractors: Arc<ExtractorChain>,
  settings: Arc<WalkSettings>,
}

impl ChainWalker {
  pub fn new(fetcher: Arc<dyn Fetcher>, extractors: Arc<ExtractorChain>, settings: WalkSettings) -> Self {
    Self {
      fetcher,
      extractors,
      settings: Arc::new(settings),
    }
  }

  pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
    &self.fetcher
  }

  pub fn base_headers(&self) -> &HeaderMap {
    &self.settings.base_headers
  }

  pub async fn walk(&self, start_url: &str, source: &Source, cancel: &CancellationToken) -> ResolutionOutcome {
    self.walk_traced(start_url, source, cancel).await.outcome
  }

  pub async fn walk_traced(&self, start_url: &str, source: &Source, cancel: &CancellationToken) -> ChainTrace {
    self.walk_from(start_url, None, source, cancel).await
  }

  /// Full walk whose first hop is sent with `first_referer` instead of the
  /// start URL's origin.
  pub async fn walk_from(
    &self,
    start_url: &str,
    first_referer: Option<String>,
    source: &Source,
    cancel: &CancellationToken,
  ) -> ChainTrace {
    let referer = first_referer.or_else(|| origin_referer(start_url));
    self.run(start_url, referer, source, true, cancel).await
  }

  /// Follows frames only, ignoring manifests and the unavailable marker, so
  /// the last page of the chain can be inspected.
  pub async fn trace_frames(
    &self,
    start_url: &str,
    first_referer: Option<String>,
    cancel: &CancellationToken,
  ) -> ChainTrace {
    let source = Source::new("trace", |_| String::new());
    let referer = first_referer.or_else(|| origin_referer(start_url));
    self.run(start_url, referer, &source, false, cancel).await
  }

  /// Same walker with `extra` layered over the base headers.
  pub fn with_extra_headers(&self, extra: &HeaderMap) -> Self {
    let mut settings = (*self.settings).clone();
    for (name, value) in extra {
      settings.base_headers.insert(name.clone(), value.clone());
    }
    Self {
      settings: Arc::new(settings),
      ..self.clone()
    }
  }

  async fn run(
    &self,
    start_url: &str,
    first_referer: Option<String>,
    source: &Source,
    resolve: bool,
    cancel: &CancellationToken,
  ) -> ChainTrace {
    let mut state = ChainState::new(start_url);
    let mut hops = Vec::new();
    let mut last_body = None;
    let mut filename = None;

    let outcome = loop {
      if cancel.is_cancelled() {
        break ResolutionOutcome::NotFound;
      }
      if state.hop_count >= self.settings.max_hops {
        debug!("[{}] hop budget spent at {}", source.identity, state.current_url);
        break ResolutionOutcome::NotFound;
      }
      if !state.visited.insert(state.current_url.clone()) {
        debug!("[{}] already visited {}, stopping", source.identity, state.current_url);
        break ResolutionOutcome::NotFound;
      }
      state.hop_count += 1;

      let referer = state.previous_url.clone().or_else(|| first_referer.clone());
      let headers = self.hop_headers(referer.as_deref(), state.session_cookies.as_deref());

      debug!("[{}] hop {} -> {}", source.identity, state.hop_count, state.current_url);
      let resp = match self.fetcher.fetch(&state.current_url, &headers, cancel).await {
        Ok(resp) => resp,
        Err(e) => {
          hops.push(HopRecord {
            url: state.current_url.clone(),
            status: e.upstream_status(),
            route: None,
            error: Some(e.to_string()),
          });
          if !e.is_cancelled() {
            debug!("[{}] fetch failed: {}", source.identity, e);
          }
          break ResolutionOutcome::TransportError { detail: e };
        }
      };

      hops.push(HopRecord {
        url: state.current_url.clone(),
        status: Some(resp.status),
        route: Some(match &resp.route {
          FetchRoute::Direct => "direct".to_string(),
          FetchRoute::Relay(name) => name.clone(),
        }),
        error: None,
      });

      if !resp.is_success() {
        break ResolutionOutcome::TransportError {
          detail: TransportError::Status {
            url: state.current_url.clone(),
            status: resp.status,
          },
        };
      }

      if let Some(cookies) = resp.session_cookies() {
        state.remember_cookies(&cookies);
      }

      let body = resp.body;
      if resolve
        && state.hop_count == 1
        && !self.settings.unavailable_marker.is_empty()
        && body.contains(self.settings.unavailable_marker.as_str())
      {
        debug!("[{}] content reported unavailable", source.identity);
        last_body = Some(body);
        break ResolutionOutcome::Unavailable {
          source_identity: source.identity.clone(),
        };
      }

      if resolve && filename.is_none() {
        filename = encoded_filename(&body);
      }

      if let Some(found) = resolve.then(|| self.extractors.extract(&body)).flatten() {
        debug!(
          "[{}] manifest via {} after {} hops",
          source.identity, found.stage, state.hop_count
        );
        last_body = Some(body);
        break ResolutionOutcome::Found(FoundStream {
          manifest_url: found.manifest_url,
          source_identity: source.identity.clone(),
          hops_used: state.hop_count,
        });
      }

      let next = self
        .extractors
        .next_hop(&body)
        .and_then(|candidate| resolve_next(&state.current_url, &candidate));
      last_body = Some(body);
      match next {
        Some(next) => state.advance(next),
        None => {
          debug!("[{}] no next hop on {}", source.identity, state.current_url);
          break ResolutionOutcome::NotFound;
        }
      }
    };

    ChainTrace {
      outcome,
      hops,
      last_body,
      filename,
    }
  }

  fn hop_headers(&self, referer: Option<&str>, cookies: Option<&str>) -> HeaderMap {
    let mut headers = self.settings.base_headers.clone();
    headers.remove(reqwest::header::HOST);
    if let Some(value) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
      headers.insert(REFERER, value);
    }
    if let Some(value) = cookies.and_then(|c| HeaderValue::from_str(c).ok()) {
      headers.insert(COOKIE, value);
    }
    headers
  }
}
