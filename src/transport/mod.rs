//! One logical page fetch: a direct attempt, then each configured relay in
//! order, every attempt bounded by the same timeout and the caller's
//! cancellation token.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{common::http::HttpClient, configs::TransportConfig};

pub mod relay;

pub use relay::Relay;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
  #[error("fetch cancelled")]
  Cancelled,
  #[error("timed out after {after_ms}ms fetching {url}")]
  Timeout { url: String, after_ms: u64 },
  #[error("upstream answered {status} for {url}")]
  Status { url: String, status: u16 },
  #[error("network error: {0}")]
  Network(String),
  #[error("relay {relay} failed: {detail}")]
  Relay { relay: String, detail: String },
  #[error("invalid url {0}")]
  InvalidUrl(String),
  #[error("all {attempts} attempts failed, last: {last}")]
  Exhausted {
    attempts: usize,
    last: Box<TransportError>,
  },
}

impl TransportError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }

  /// The HTTP status behind a failure, when the upstream answered at all.
  pub fn upstream_status(&self) -> Option<u16> {
    match self {
      Self::Status { status, .. } => Some(*status),
      Self::Exhausted { last, .. } => last.upstream_status(),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for TransportError {
  fn from(e: reqwest::Error) -> Self {
    let url = e.url().map(|u| u.to_string()).unwrap_or_default();
    if e.is_timeout() {
      Self::Timeout { url, after_ms: 0 }
    } else if let Some(status) = e.status() {
      Self::Status {
        url,
        status: status.as_u16(),
      }
    } else {
      Self::Network(e.to_string())
    }
  }
}

/// Which path produced a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRoute {
  Direct,
  Relay(String),
}

/// A page response, normalized regardless of the path it took.
#[derive(Debug, Clone)]
pub struct FetchResponse {
  pub status: u16,
  pub headers: HeaderMap,
  pub body: String,
  pub route: FetchRoute,
}

impl FetchResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// `Set-Cookie` values reduced to a single `Cookie` header value.
  pub fn session_cookies(&self) -> Option<String> {
    let pairs: Vec<&str> = self
      .headers
      .get_all(SET_COOKIE)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .filter_map(|v| v.split(';').next())
      .map(str::trim)
      .filter(|pair| pair.contains('='))
      .collect();
    (!pairs.is_empty()).then(|| pairs.join("; "))
  }
}

/// The seam the chain walker fetches through.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(
    &self,
    url: &str,
    headers: &HeaderMap,
    cancel: &CancellationToken,
  ) -> Result<FetchResponse, TransportError>;
}

pub struct Transport {
  client: reqwest::Client,
  relays: Vec<Relay>,
  attempt_timeout: Duration,
  direct: bool,
}

impl Transport {
  pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
    let attempt_timeout = Duration::from_millis(config.attempt_timeout_ms);
    Ok(Self {
      client: HttpClient::new(attempt_timeout)?,
      relays: config.relays.iter().cloned().map(Relay::new).collect(),
      attempt_timeout,
      direct: config.direct,
    })
  }

  pub fn relay_count(&self) -> usize {
    self.relays.len()
  }

  async fn direct(&self, url: &str, headers: &HeaderMap) -> Result<FetchResponse, TransportError> {
    let resp = self.client.get(url).headers(headers.clone()).send().await?;
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let body = resp.text().await?;
    Ok(FetchResponse {
      status,
      headers,
      body,
      route: FetchRoute::Direct,
    })
  }

  /// Runs one attempt under the per-attempt timeout, abandoning it as soon as
  /// `cancel` fires. Non-success statuses count as failures.
  async fn attempt<F>(
    &self,
    url: &str,
    cancel: &CancellationToken,
    fut: F,
  ) -> Result<FetchResponse, TransportError>
  where
    F: Future<Output = Result<FetchResponse, TransportError>>,
  {
    let timed_out = || TransportError::Timeout {
      url: url.to_string(),
      after_ms: self.attempt_timeout.as_millis() as u64,
    };
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(TransportError::Cancelled),
      res = tokio::time::timeout(self.attempt_timeout, fut) => match res {
        Err(_) | Ok(Err(TransportError::Timeout { .. })) => Err(timed_out()),
        Ok(Ok(resp)) if resp.is_success() => Ok(resp),
        Ok(Ok(resp)) => Err(TransportError::Status {
          url: url.to_string(),
          status: resp.status,
        }),
        Ok(Err(e)) => Err(e),
      },
    }
  }
}

#[async_trait]
impl Fetcher for Transport {
  async fn fetch(
    &self,
    url: &str,
    headers: &HeaderMap,
    cancel: &CancellationToken,
  ) -> Result<FetchResponse, TransportError> {
    if cancel.is_cancelled() {
      return Err(TransportError::Cancelled);
    }
    reqwest::Url::parse(url).map_err(|_| TransportError::InvalidUrl(url.to_string()))?;

    let mut attempts = 0;
    let mut last = None;

    if self.direct {
      attempts += 1;
      match self.attempt(url, cancel, self.direct(url, headers)).await {
        Ok(resp) => return Ok(resp),
        Err(TransportError::Cancelled) => return Err(TransportError::Cancelled),
        Err(e) => {
          debug!("Direct fetch of {} failed: {}", url, e);
          last = Some(e);
        }
      }
    }

    for relay in &self.relays {
      attempts += 1;
      trace!("Trying relay {} for {}", relay.name(), url);
      match self
        .attempt(url, cancel, relay.fetch(&self.client, url, headers))
        .await
      {
        Ok(resp) => {
          debug!("Relay {} served {} ({} bytes)", relay.name(), url, resp.body.len());
          return Ok(resp);
        }
        Err(TransportError::Cancelled) => return Err(TransportError::Cancelled),
        Err(e) => {
          debug!("Relay {} failed for {}: {}", relay.name(), url, e);
          last = Some(TransportError::Relay {
            relay: relay.name().to_string(),
            detail: e.to_string(),
          });
        }
      }
    }

    Err(match last {
      Some(last) if attempts == 1 => last,
      Some(last) => TransportError::Exhausted {
        attempts,
        last: Box::new(last),
      },
      None => TransportError::Network("no direct attempt and no relays configured".to_string()),
    })
  }
}

#[cfg(test)]
mod tests {
  use std::time::Instant;

  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
  };

  use super::*;
  use crate::configs::{RelayConfig, RelayRequest, RelayResponse};

  fn concat_relay(server: &MockServer, name: &str) -> RelayConfig {
    RelayConfig {
      name: name.to_string(),
      endpoint: format!("{}/{}?url=", server.uri(), name),
      request: RelayRequest::Concat,
      response: RelayResponse::Raw,
    }
  }

  fn transport(relays: Vec<RelayConfig>, timeout_ms: u64) -> Transport {
    Transport::new(&TransportConfig {
      attempt_timeout_ms: timeout_ms,
      relays,
      ..TransportConfig::default()
    })
    .unwrap()
  }

  #[tokio::test]
  async fn direct_success_carries_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/embed"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_string("<html>hello</html>")
          .append_header("set-cookie", "sid=abc; Path=/; HttpOnly"),
      )
      .expect(1)
      .mount(&server)
      .await;

    let resp = transport(vec![], 2_000)
      .fetch(&format!("{}/embed", server.uri()), &HeaderMap::new(), &CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(resp.route, FetchRoute::Direct);
    assert_eq!(resp.body, "<html>hello</html>");
    assert_eq!(resp.session_cookies().as_deref(), Some("sid=abc"));
  }

  #[tokio::test]
  async fn falls_back_through_relays_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/page"))
      .respond_with(ResponseTemplate::new(503))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/relay-a"))
      .respond_with(ResponseTemplate::new(500))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/relay-b"))
      .respond_with(ResponseTemplate::new(200).set_body_string("relayed page"))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/relay-c"))
      .respond_with(ResponseTemplate::new(200).set_body_string("never used"))
      .expect(0)
      .mount(&server)
      .await;

    let relays = vec![
      concat_relay(&server, "relay-a"),
      concat_relay(&server, "relay-b"),
      concat_relay(&server, "relay-c"),
    ];
    let t = transport(relays, 2_000);
    assert_eq!(t.relay_count(), 3);
    let resp = t
      .fetch(&format!("{}/page", server.uri()), &HeaderMap::new(), &CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(resp.body, "relayed page");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.route, FetchRoute::Relay("relay-b".to_string()));
  }

  #[tokio::test]
  async fn json_envelope_relay_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/page"))
      .respond_with(ResponseTemplate::new(403))
      .mount(&server)
      .await;
    let target = format!("{}/page", server.uri());
    Mock::given(method("POST"))
      .and(path("/api/proxy"))
      .and(body_partial_json(serde_json::json!({ "targetUrl": target })))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "status": 200,
        "statusText": "OK",
        "body": "<iframe src=\"/next\"></iframe>",
      })))
      .expect(1)
      .mount(&server)
      .await;

    let relay = RelayConfig {
      name: "self".to_string(),
      endpoint: format!("{}/api/proxy", server.uri()),
      request: RelayRequest::JsonPost,
      response: RelayResponse::Json {
        body_field: "body".to_string(),
        status_field: Some("status".to_string()),
        headers_field: None,
        error_field: Some("error".to_string()),
      },
    };
    let resp = transport(vec![relay], 2_000)
      .fetch(&target, &HeaderMap::new(), &CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(resp.body, "<iframe src=\"/next\"></iframe>");
    assert_eq!(resp.route, FetchRoute::Relay("self".to_string()));
  }

  #[tokio::test]
  async fn exhausted_reports_attempt_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(502))
      .mount(&server)
      .await;

    let err = transport(vec![concat_relay(&server, "relay-a")], 2_000)
      .fetch(&format!("{}/page", server.uri()), &HeaderMap::new(), &CancellationToken::new())
      .await
      .unwrap_err();
    match err {
      TransportError::Exhausted { attempts, last } => {
        assert_eq!(attempts, 2);
        assert!(matches!(*last, TransportError::Relay { .. }));
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[tokio::test]
  async fn slow_attempt_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
      .mount(&server)
      .await;

    let err = transport(vec![], 200)
      .fetch(&format!("{}/slow", server.uri()), &HeaderMap::new(), &CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { after_ms: 200, .. }));
  }

  #[tokio::test]
  async fn cancellation_aborts_in_flight_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
      .mount(&server)
      .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      trigger.cancel();
    });

    let started = Instant::now();
    let err = transport(vec![concat_relay(&server, "relay-a")], 4_000)
      .fetch(&format!("{}/slow", server.uri()), &HeaderMap::new(), &cancel)
      .await
      .unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(2));
  }

  #[tokio::test]
  async fn invalid_url_is_rejected_without_io() {
    let err = transport(vec![], 1_000)
      .fetch("not a url", &HeaderMap::new(), &CancellationToken::new())
      .await
      .unwrap_err();
    assert_eq!(err, TransportError::InvalidUrl("not a url".to_string()));
  }
}
