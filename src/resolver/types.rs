use std::{collections::HashSet, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{configs::SourcesConfig, transport::TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
  Movie,
  Series,
}

impl ContentKind {
  pub fn parse(raw: &str) -> Option<Self> {
    match raw {
      "movie" => Some(Self::Movie),
      "series" | "tv" => Some(Self::Series),
      _ => None,
    }
  }
}

/// One inbound resolution call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
  pub content_id: String,
  pub kind: ContentKind,
  pub season: Option<u32>,
  pub episode: Option<u32>,
}

impl ResolutionRequest {
  pub fn movie(content_id: impl Into<String>) -> Self {
    Self {
      content_id: content_id.into(),
      kind: ContentKind::Movie,
      season: None,
      episode: None,
    }
  }

  pub fn episode(content_id: impl Into<String>, season: u32, episode: u32) -> Self {
    Self {
      content_id: content_id.into(),
      kind: ContentKind::Series,
      season: Some(season),
      episode: Some(episode),
    }
  }

  /// Parses a `tt123` or `tt123:1:2` style id. Zero or non-numeric season and
  /// episode parts are dropped.
  pub fn from_stream_id(kind: ContentKind, id: &str) -> Self {
    let mut parts = id.split(':');
    let content_id = parts.next().unwrap_or_default().to_string();
    let mut positive = || parts.next().and_then(|p| p.parse::<u32>().ok()).filter(|n| *n > 0);
    let season = positive();
    let episode = positive();
    Self {
      content_id,
      kind,
      season,
      episode,
    }
  }

  /// Cache key derived from `contentId:season:episode`.
  pub fn cache_key(&self) -> String {
    let part = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_default();
    format!("{}:{}:{}", self.content_id, part(self.season), part(self.episode))
  }
}

pub type OriginFn = dyn Fn(&ResolutionRequest) -> String + Send + Sync;

/// An independently probed upstream origin.
#[derive(Clone)]
pub struct Source {
  pub identity: String,
  origin: Arc<OriginFn>,
}

impl Source {
  pub fn new(
    identity: impl Into<String>,
    origin: impl Fn(&ResolutionRequest) -> String + Send + Sync + 'static,
  ) -> Self {
    Self {
      identity: identity.into(),
      origin: Arc::new(origin),
    }
  }

  /// Builds a source for `host` from the configured path templates.
  pub fn from_host(host: &str, templates: &SourcesConfig) -> Self {
    let host = host.to_string();
    let movie = templates.movie_path.clone();
    let series = templates.series_path.clone();
    let episode = templates.episode_path.clone();
    let identity = host.clone();
    Self::new(identity, move |req| {
      let template = match (req.kind, req.season, req.episode) {
        (ContentKind::Movie, _, _) => &movie,
        (ContentKind::Series, Some(_), Some(_)) => &episode,
        (ContentKind::Series, _, _) => &series,
      };
      render_template(template, &host, req)
    })
  }

  pub fn from_config(config: &SourcesConfig) -> Vec<Self> {
    config
      .hosts
      .iter()
      .map(|host| Self::from_host(host, config))
      .collect()
  }

  pub fn origin_url(&self, request: &ResolutionRequest) -> String {
    (self.origin)(request)
  }
}

impl fmt::Debug for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Source")
      .field("identity", &self.identity)
      .finish_non_exhaustive()
  }
}

fn render_template(template: &str, host: &str, req: &ResolutionRequest) -> String {
  let number = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_default();
  template
    .replace("{host}", host)
    .replace("{id}", &req.content_id)
    .replace("{season}", &number(req.season))
    .replace("{episode}", &number(req.episode))
}

/// Per-walker mutable state. Never shared between walkers.
#[derive(Debug, Clone)]
pub struct ChainState {
  pub current_url: String,
  pub previous_url: Option<String>,
  pub visited: HashSet<String>,
  pub hop_count: usize,
  pub session_cookies: Option<String>,
}

impl ChainState {
  pub fn new(start_url: impl Into<String>) -> Self {
    Self {
      current_url: start_url.into(),
      previous_url: None,
      visited: HashSet::new(),
      hop_count: 0,
      session_cookies: None,
    }
  }

  /// Moves the chain onto `next`, remembering the page it came from.
  pub fn advance(&mut self, next: String) {
    let previous = std::mem::replace(&mut self.current_url, next);
    self.previous_url = Some(previous);
  }

  /// Merges `name=value; …` pairs into the session, newer values winning.
  pub fn remember_cookies(&mut self, fresh: &str) {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let existing = self.session_cookies.take().unwrap_or_default();
    for pair in existing.split("; ").chain(fresh.split("; ")) {
      let Some((name, value)) = pair.split_once('=') else {
        continue;
      };
      let name = name.trim();
      match pairs.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = value.to_string(),
        None => pairs.push((name.to_string(), value.to_string())),
      }
    }
    self.session_cookies = (!pairs.is_empty()).then(|| {
      pairs
        .iter()
        .map(|(n, v)| format!("{}={}", n, v))
        .collect::<Vec<_>>()
        .join("; ")
    });
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundStream {
  pub manifest_url: String,
  pub source_identity: String,
  pub hops_used: usize,
}

/// What a single walker, and then the whole race, concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
  Found(FoundStream),
  /// The source asserted the content does not exist or cannot be served.
  Unavailable { source_identity: String },
  NotFound,
  TransportError { detail: TransportError },
}

impl ResolutionOutcome {
  /// `Found` and `Unavailable` end the race; everything else frees a slot.
  pub fn is_decisive(&self) -> bool {
    matches!(self, Self::Found(_) | Self::Unavailable { .. })
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Found(_) => "found",
      Self::Unavailable { .. } => "unavailable",
      Self::NotFound => "not_found",
      Self::TransportError { .. } => "transport_error",
    }
  }
}
