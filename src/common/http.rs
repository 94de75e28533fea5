use std::{collections::BTreeMap, time::Duration};

use reqwest::{
  Client, Error,
  header::{HeaderMap, HeaderName, HeaderValue},
};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Header set of a desktop browser loading a cross-site iframe.
const BROWSER_HEADERS: &[(&str, &str)] = &[
  (
    "accept",
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9",
  ),
  ("accept-language", "en-US,en;q=0.9"),
  ("upgrade-insecure-requests", "1"),
  ("sec-fetch-site", "cross-site"),
  ("sec-fetch-mode", "navigate"),
  ("sec-fetch-dest", "iframe"),
];

pub struct HttpClient;

impl HttpClient {
  pub fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
  }

  /// Browser-like headers sent on every hop. Entries in `overrides` replace or
  /// extend the defaults; invalid names or values are skipped.
  pub fn browser_headers(user_agent: Option<&str>, overrides: &BTreeMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
      reqwest::header::USER_AGENT,
      HeaderValue::from_str(user_agent.unwrap_or(DEFAULT_USER_AGENT))
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
    );
    for (name, value) in BROWSER_HEADERS {
      headers.insert(*name, HeaderValue::from_static(value));
    }
    for (name, value) in overrides {
      match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
      ) {
        (Ok(name), Ok(value)) => {
          headers.insert(name, value);
        }
        _ => tracing::warn!("Ignoring invalid header override: {}", name),
      }
    }
    headers
  }

  /// Client used for every outbound fetch. Redirects are followed by reqwest;
  /// cookies are carried by the chain walker, not by the client.
  pub fn new(timeout: Duration) -> Result<Client, Error> {
    Client::builder()
      .user_agent(Self::default_user_agent())
      .timeout(timeout)
      .redirect(reqwest::redirect::Policy::limited(10))
      .build()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn overrides_replace_defaults() {
    let mut overrides = BTreeMap::new();
    overrides.insert("Accept-Language".to_string(), "nl-NL".to_string());
    let headers = HttpClient::browser_headers(Some("test-agent"), &overrides);
    assert_eq!(headers["user-agent"], "test-agent");
    assert_eq!(headers["accept-language"], "nl-NL");
    assert_eq!(headers["sec-fetch-dest"], "iframe");
  }

  #[test]
  fn invalid_override_is_skipped() {
    let mut overrides = BTreeMap::new();
    overrides.insert("bad header".to_string(), "x".to_string());
    let headers = HttpClient::browser_headers(None, &overrides);
    assert_eq!(headers.len(), BROWSER_HEADERS.len() + 1);
  }
}
