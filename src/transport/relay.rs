use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value, json};

use super::{FetchResponse, FetchRoute, TransportError};
use crate::configs::{RelayConfig, RelayRequest, RelayResponse};

/// A relay descriptor turned into request construction and response
/// unwrapping. Relays are data; adding one never touches the engine.
#[derive(Debug, Clone)]
pub struct Relay {
  config: RelayConfig,
}

impl Relay {
  pub fn new(config: RelayConfig) -> Self {
    Self { config }
  }

  pub fn name(&self) -> &str {
    &self.config.name
  }

  /// The URL actually requested for `target`.
  pub fn request_url(&self, target: &str) -> String {
    match self.config.request {
      RelayRequest::Concat => format!("{}{}", self.config.endpoint, target),
      RelayRequest::PercentEncoded => {
        format!("{}{}", self.config.endpoint, urlencoding::encode(target))
      }
      RelayRequest::JsonPost => self.config.endpoint.clone(),
    }
  }

  pub async fn fetch(
    &self,
    client: &reqwest::Client,
    target: &str,
    headers: &HeaderMap,
  ) -> Result<FetchResponse, TransportError> {
    let url = self.request_url(target);
    let request = match self.config.request {
      RelayRequest::Concat | RelayRequest::PercentEncoded => client.get(url).headers(headers.clone()),
      RelayRequest::JsonPost => client.post(url).json(&json!({
        "targetUrl": target,
        "headers": header_object(headers),
      })),
    };

    let resp = request.send().await?;
    let status = resp.status().as_u16();
    let resp_headers = resp.headers().clone();
    let body = resp.text().await?;
    self.unwrap_response(status, resp_headers, body)
  }

  /// Maps the relay's own answer back onto the page it fetched.
  pub fn unwrap_response(
    &self,
    status: u16,
    headers: HeaderMap,
    body: String,
  ) -> Result<FetchResponse, TransportError> {
    let route = FetchRoute::Relay(self.config.name.clone());
    let (body_field, status_field, headers_field, error_field) = match &self.config.response {
      RelayResponse::Raw => {
        return Ok(FetchResponse {
          status,
          headers,
          body,
          route,
        });
      }
      RelayResponse::Json {
        body_field,
        status_field,
        headers_field,
        error_field,
      } => (body_field, status_field, headers_field, error_field),
    };

    if !(200..300).contains(&status) {
      return Err(self.failure(format!("relay answered {}", status)));
    }

    let envelope: Value = serde_json::from_str(&body)
      .map_err(|e| self.failure(format!("invalid envelope: {}", e)))?;

    if let Some(error) = error_field.as_deref().and_then(|f| lookup(&envelope, f)) {
      if !error.is_null() && error != &Value::Bool(false) {
        let detail = envelope
          .get("details")
          .and_then(Value::as_str)
          .map(str::to_string)
          .unwrap_or_else(|| value_text(error));
        return Err(self.failure(detail));
      }
    }

    let page = lookup(&envelope, body_field)
      .and_then(Value::as_str)
      .ok_or_else(|| self.failure(format!("envelope has no `{}` field", body_field)))?;

    let page_status = match status_field.as_deref().and_then(|f| lookup(&envelope, f)) {
      Some(v) => v
        .as_u64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| self.failure("envelope status is not a number".to_string()))?,
      None => 200,
    };

    let page_headers = headers_field
      .as_deref()
      .and_then(|f| lookup(&envelope, f))
      .map(headers_from_json)
      .unwrap_or_default();

    Ok(FetchResponse {
      status: page_status,
      headers: page_headers,
      body: page.to_string(),
      route,
    })
  }

  fn failure(&self, detail: String) -> TransportError {
    TransportError::Relay {
      relay: self.config.name.clone(),
      detail,
    }
  }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
  path.split('.').try_fold(value, |v, key| v.get(key))
}

fn value_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn header_object(headers: &HeaderMap) -> Value {
  let map: Map<String, Value> = headers
    .iter()
    .filter_map(|(name, value)| {
      value
        .to_str()
        .ok()
        .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
    })
    .collect();
  Value::Object(map)
}

/// Accepts `{"name": "v"}` and `{"name": ["v1", "v2"]}` shapes.
fn headers_from_json(value: &Value) -> HeaderMap {
  let mut headers = HeaderMap::new();
  let Some(object) = value.as_object() else {
    return headers;
  };
  for (name, entry) in object {
    let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
      continue;
    };
    let values: Vec<&str> = match entry {
      Value::String(s) => vec![s.as_str()],
      Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
      _ => Vec::new(),
    };
    for v in values {
      if let Ok(v) = HeaderValue::from_str(v) {
        headers.append(name.clone(), v);
      }
    }
  }
  headers
}
