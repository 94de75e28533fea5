use serde::{Deserialize, Serialize};

const DEFAULT_HOSTS: &[&str] = &[
  "vidsrc.xyz",
  "vidsrc.in",
  "vidsrc.io",
  "vidsrc.me",
  "vidsrc.net",
  "vidsrc.pm",
  "vidsrc.vc",
  "vidsrc.to",
  "vidsrc.icu",
];

/// Mirror hosts and the URL templates used to build each one's first page.
///
/// Templates understand `{host}`, `{id}`, `{season}` and `{episode}`.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
  pub hosts: Vec<String>,
  pub movie_path: String,
  pub series_path: String,
  pub episode_path: String,
}

impl Default for SourcesConfig {
  fn default() -> Self {
    Self {
      hosts: DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect(),
      movie_path: "https://{host}/embed/movie/{id}".to_string(),
      series_path: "https://{host}/embed/tv/{id}".to_string(),
      episode_path: "https://{host}/embed/tv/{id}/{season}-{episode}".to_string(),
    }
  }
}
