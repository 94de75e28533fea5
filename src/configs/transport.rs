use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TransportConfig {
  pub attempt_timeout_ms: u64,
  /// Whether the direct attempt is made before the relays.
  pub direct: bool,
  pub user_agent: Option<String>,
  /// Extra or replacement request headers sent on every hop.
  pub headers: BTreeMap<String, String>,
  pub relays: Vec<RelayConfig>,
}

impl Default for TransportConfig {
  fn default() -> Self {
    Self {
      attempt_timeout_ms: 5_000,
      direct: true,
      user_agent: None,
      headers: BTreeMap::new(),
      relays: Vec::new(),
    }
  }
}

impl TransportConfig {
  pub fn validate(&self) -> AnyResult<()> {
    if self.attempt_timeout_ms == 0 {
      return Err("transport.attempt_timeout_ms must be at least 1".into());
    }
    if !self.direct && self.relays.is_empty() {
      return Err("transport.direct is off and no relays are configured".into());
    }
    Ok(())
  }
}

/// One relay endpoint, tried in list order after the direct attempt.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RelayConfig {
  pub name: String,
  pub endpoint: String,
  #[serde(default)]
  pub request: RelayRequest,
  #[serde(default)]
  pub response: RelayResponse,
}

/// How the target URL is handed to the relay.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelayRequest {
  /// `GET {endpoint}{target}`
  #[default]
  Concat,
  /// `GET {endpoint}{percent-encoded target}`
  PercentEncoded,
  /// `POST {endpoint}` with `{"targetUrl": .., "headers": {..}}`
  JsonPost,
}

/// How the relay's answer maps back onto a page response.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayResponse {
  /// The relay body is the page body.
  #[default]
  Raw,
  /// The page is wrapped in a JSON envelope. Field names may be dotted paths.
  Json {
    body_field: String,
    #[serde(default)]
    status_field: Option<String>,
    #[serde(default)]
    headers_field: Option<String>,
    #[serde(default = "default_error_field")]
    error_field: Option<String>,
  },
}

fn default_error_field() -> Option<String> {
  Some("error".to_string())
}
