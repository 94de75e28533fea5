use serde::{Deserialize, Serialize};

use crate::{common::types::AnyResult, configs::*};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub logging: Option<LoggingConfig>,
  #[serde(default)]
  pub resolver: ResolverConfig,
  #[serde(default)]
  pub sources: SourcesConfig,
  #[serde(default)]
  pub transport: TransportConfig,
  #[serde(default)]
  pub extraction: ExtractionConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

impl Config {
  pub fn load() -> AnyResult<Self> {
    let config_path = if std::path::Path::new("config.toml").exists() {
      "config.toml"
    } else if std::path::Path::new("config.default.toml").exists() {
      "config.default.toml"
    } else {
      return Err("config.toml or config.default.toml not found".into());
    };

    crate::log_println!("Loading configuration from: {}", config_path);

    let config_str = std::fs::read_to_string(config_path)?;
    Self::from_toml(&config_str)
  }

  pub fn from_toml(raw: &str) -> AnyResult<Self> {
    let config: Config = toml::from_str(raw)?;
    config.resolver.validate()?;
    config.transport.validate()?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_file_yields_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.resolver.concurrency, 3);
    assert_eq!(config.resolver.max_hops, 5);
    assert_eq!(config.sources.hosts.len(), 9);
    assert!(config.transport.relays.is_empty());
    assert_eq!(config.extraction.decoders.len(), 1);
  }

  #[test]
  fn relays_and_decoders_parse_from_toml() {
    let raw = r#"
      [resolver]
      concurrency = 2
      stagger_min_ms = 0
      stagger_max_ms = 0

      [[transport.relays]]
      name = "codetabs"
      endpoint = "https://api.codetabs.com/v1/proxy?quest="
      request = "concat"

      [[transport.relays]]
      name = "allorigins"
      endpoint = "https://api.allorigins.win/get?url="
      request = "percent_encoded"
      response = { kind = "json", body_field = "contents", status_field = "status.http_code" }

      [[extraction.decoders]]
      name = "rev-b64-shift"
      steps = [{ op = "reverse" }, { op = "base64" }, { op = "shift", by = -3 }]
    "#;
    let config = Config::from_toml(raw).unwrap();
    assert_eq!(config.resolver.concurrency, 2);
    assert_eq!(config.transport.relays.len(), 2);
    assert_eq!(config.transport.relays[0].request, RelayRequest::Concat);
    assert_eq!(config.transport.relays[0].response, RelayResponse::Raw);
    match &config.transport.relays[1].response {
      RelayResponse::Json { body_field, status_field, .. } => {
        assert_eq!(body_field, "contents");
        assert_eq!(status_field.as_deref(), Some("status.http_code"));
      }
      other => panic!("unexpected response rule: {:?}", other),
    }
    assert_eq!(
      config.extraction.decoders[0].steps,
      vec![DecodeStep::Reverse, DecodeStep::Base64, DecodeStep::Shift { by: -3 }]
    );
  }

  #[test]
  fn zero_concurrency_is_rejected() {
    assert!(Config::from_toml("[resolver]\nconcurrency = 0\n").is_err());
  }

  #[test]
  fn zero_attempt_timeout_is_rejected() {
    assert!(Config::from_toml("[transport]\nattempt_timeout_ms = 0\n").is_err());
    assert!(Config::from_toml("[transport]\nattempt_timeout_ms = 1\n").is_ok());
  }

  #[test]
  fn transport_needs_some_route() {
    assert!(Config::from_toml("[transport]\ndirect = false\n").is_err());
  }
}
