use std::{collections::BTreeMap, sync::Arc};

use axum::{
  extract::{Path, State},
  http::{
    HeaderMap, HeaderName, HeaderValue, StatusCode,
    header::{CACHE_CONTROL, CONTENT_TYPE},
  },
  response::{IntoResponse, Json, Response},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
  common::errors::ApiError,
  resolver::{ContentKind, ResolutionOutcome, Resolved, ResolutionRequest, Source},
  rest::models::*,
  server::AppState,
};

const NO_STORE: &str = "no-cache, no-store, must-revalidate";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
/// Non-standard status answered when the source reports the media gone.
const MEDIA_UNAVAILABLE: u16 = 499;

/// GET /manifest.json
pub async fn manifest(State(state): State<Arc<AppState>>) -> Json<AddonManifest> {
  let icon = state
    .config
    .server
    .public_url
    .as_deref()
    .map(|base| format!("{}/icon.png", base.trim_end_matches('/')));
  Json(AddonManifest {
    id: "community.streamscout",
    version: env!("CARGO_PKG_VERSION"),
    name: "StreamScout",
    description: "HLS streams resolved from embed mirrors",
    icon,
    catalogs: Vec::new(),
    resources: vec!["stream"],
    types: vec!["movie", "series"],
    id_prefixes: vec!["tt"],
  })
}

/// GET /stream/{kind}/{id}.json
pub async fn stream(
  State(state): State<Arc<AppState>>,
  Path((kind, id)): Path<(String, String)>,
) -> Response {
  let Some(kind) = ContentKind::parse(&kind) else {
    return ApiError::not_found(format!("Unknown content type: {}", kind)).into_response();
  };
  let id = id.strip_suffix(".json").unwrap_or(&id);
  let request = ResolutionRequest::from_stream_id(kind, id);
  if request.content_id.is_empty() {
    return streams_response(StreamsResponse::default(), NO_STORE.to_string());
  }

  debug!("Stream request {:?} {}", kind, id);
  match state.resolver.resolve(&request).await {
    Resolved::Stream(found) => {
      let url = found
        .variant
        .map(|v| v.url)
        .unwrap_or(found.manifest_url);
      let ttl = state.config.cache.ttl_secs;
      streams_response(
        StreamsResponse {
          streams: vec![StreamEntry {
            url,
            title: found.source_identity,
          }],
        },
        format!("public, s-maxage={}, stale-while-revalidate=3600", ttl),
      )
    }
    Resolved::Unavailable { .. } | Resolved::NotFound => {
      streams_response(StreamsResponse::default(), NO_STORE.to_string())
    }
  }
}

fn streams_response(body: StreamsResponse, cache_control: String) -> Response {
  let mut response = Json(body).into_response();
  if let Ok(value) = HeaderValue::from_str(&cache_control) {
    response.headers_mut().insert(CACHE_CONTROL, value);
  }
  response
}

/// POST /api/resolve
///
/// Walks a single source's chain from `targetUrl`, no race.
pub async fn resolve_one(State(state): State<Arc<AppState>>, Json(req): Json<ResolveRequest>) -> Response {
  let target = req.target_url.filter(|t| !t.is_empty());
  let domain = req.source_domain.filter(|d| !d.is_empty());
  let (Some(target), Some(domain)) = (target, domain) else {
    return ApiError::bad_request("Bad Request: targetUrl and sourceDomain are required").into_response();
  };

  let source = Source::new(domain.clone(), |_| String::new());
  let walker = state.resolver.walker().with_extra_headers(&header_map(&req.headers));
  let trace = walker
    .walk_from(
      &target,
      Some(format!("https://{}/", domain)),
      &source,
      &CancellationToken::new(),
    )
    .await;

  match trace.outcome {
    ResolutionOutcome::Found(found) => Json(ResolveResponse {
      master_url: found.manifest_url,
      source_domain: domain,
      filename: trace.filename,
    })
    .into_response(),
    ResolutionOutcome::Unavailable { .. } => ApiError::new(
      StatusCode::from_u16(MEDIA_UNAVAILABLE).unwrap_or(StatusCode::GONE),
      "Media unavailable",
    )
    .into_response(),
    ResolutionOutcome::TransportError { detail } if detail.upstream_status().is_none() => {
      warn!("Chain fetch from {} failed: {}", target, detail);
      ApiError::new(StatusCode::BAD_GATEWAY, "Proxy fetch failed")
        .with_details(detail.to_string())
        .into_response()
    }
    ResolutionOutcome::TransportError { .. } | ResolutionOutcome::NotFound => {
      ApiError::not_found("M3U8 not found in chain").into_response()
    }
  }
}

/// POST /api/proxy
///
/// Performs one direct fetch for a caller and reports the upstream status in
/// the envelope, whatever it was.
pub async fn proxy(State(state): State<Arc<AppState>>, Json(req): Json<ProxyRequest>) -> Response {
  let Some(target) = req.target_url.filter(|t| !t.is_empty()) else {
    return ApiError::bad_request("Bad Request: targetUrl is required").into_response();
  };

  let result = async {
    let resp = state
      .proxy_client
      .get(&target)
      .headers(header_map(&req.headers))
      .send()
      .await?;
    let status = resp.status();
    let body = resp.text().await?;
    Ok::<_, reqwest::Error>(ProxyResponse {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      body,
    })
  }
  .await;

  match result {
    Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
    Err(e) => {
      warn!("Proxy fetch for {} failed: {}", target, e);
      ApiError::internal("Proxy request failed", e.to_string()).into_response()
    }
  }
}

/// POST /api/debug
///
/// Follows the frame chain from `targetUrl` and answers the last page as text.
pub async fn debug_chain(State(state): State<Arc<AppState>>, Json(req): Json<DebugRequest>) -> Response {
  let Some(target) = req.target_url.filter(|t| !t.is_empty()) else {
    return ApiError::bad_request("Bad Request: targetUrl is required").into_response();
  };

  let referer = req.source_domain.map(|domain| format!("https://{}/", domain));
  let walker = state.resolver.walker().with_extra_headers(&header_map(&req.headers));
  let trace = walker
    .trace_frames(&target, referer, &CancellationToken::new())
    .await;

  let last_html = trace
    .last_body
    .unwrap_or_else(|| "No HTML was fetched.".to_string());
  let (status, text) = match trace.hops.last() {
    Some(hop) if hop.status.is_some_and(|s| !(200..300).contains(&s)) => (
      StatusCode::OK,
      format!(
        "Fetch failed for {} with status {}",
        hop.url,
        hop.status.unwrap_or_default()
      ),
    ),
    Some(hop) if hop.error.is_some() => (
      StatusCode::INTERNAL_SERVER_ERROR,
      format!(
        "An error occurred: {}\n\nLast fetched HTML was:\n\n{}",
        hop.error.as_deref().unwrap_or_default(),
        last_html
      ),
    ),
    _ => (StatusCode::OK, last_html),
  };
  (status, [(CONTENT_TYPE, TEXT_PLAIN)], text).into_response()
}

/// Caller-supplied headers; `host` and anything unparsable are dropped.
fn header_map(raw: &BTreeMap<String, String>) -> HeaderMap {
  raw
    .iter()
    .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
    .filter_map(|(name, value)| {
      Some((
        HeaderName::from_bytes(name.as_bytes()).ok()?,
        HeaderValue::from_str(value).ok()?,
      ))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use axum::body::to_bytes;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
  };

  use super::*;
  use crate::{
    configs::Config,
    resolver::{RaceScheduler, RaceSettings, Resolver, Source, walker::tests::{MARKER, ScriptedFetcher, walker}},
  };

  fn state(fetcher: ScriptedFetcher) -> Arc<AppState> {
    let scheduler = RaceScheduler::new(
      walker(Arc::new(fetcher)),
      RaceSettings {
        concurrency: 1,
        stagger_min: Duration::ZERO,
        stagger_max: Duration::ZERO,
      },
    );
    let source = Source::new("a.example", |req: &ResolutionRequest| match (req.season, req.episode) {
      (Some(s), Some(e)) => format!("https://a.example/tv/{}/{}-{}", req.content_id, s, e),
      _ => format!("https://a.example/movie/{}", req.content_id),
    });
    let resolver = Resolver::new(scheduler, vec![source]);
    Arc::new(AppState::new(Config::default(), Arc::new(resolver)).unwrap())
  }

  /// State backed by the real transport.
  fn live_state() -> Arc<AppState> {
    let mut config = Config::default();
    config.transport.attempt_timeout_ms = 2_000;
    config.cache.enabled = false;
    Arc::new(AppState::from_config(config).unwrap())
  }

  /// A URL on a port nothing listens on.
  async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/embed/1", addr)
  }

  async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
  }

  #[tokio::test]
  async fn found_stream_is_cacheable() {
    let fetcher = ScriptedFetcher::default().page(
      "https://a.example/tv/tt9/1-2",
      "<script>file: 'https://cdn.example/master.m3u8'</script>",
    );
    let response = stream(
      State(state(fetcher)),
      Path(("series".to_string(), "tt9:1:2.json".to_string())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
      response.headers()[CACHE_CONTROL],
      "public, s-maxage=18000, stale-while-revalidate=3600"
    );
    let body: StreamsResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(
      body.streams,
      vec![StreamEntry {
        url: "https://cdn.example/master.m3u8".to_string(),
        title: "a.example".to_string(),
      }]
    );
  }

  #[tokio::test]
  async fn unavailable_answers_empty_and_uncached() {
    let fetcher = ScriptedFetcher::default().page("https://a.example/movie/tt8", MARKER);
    let response = stream(
      State(state(fetcher)),
      Path(("movie".to_string(), "tt8.json".to_string())),
    )
    .await;
    assert_eq!(response.headers()[CACHE_CONTROL], NO_STORE);
    assert_eq!(body_text(response).await, r#"{"streams":[]}"#);
  }

  #[tokio::test]
  async fn unknown_kind_is_not_found() {
    let response = stream(
      State(state(ScriptedFetcher::default())),
      Path(("channel".to_string(), "tt1.json".to_string())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn manifest_lists_stream_resource() {
    let Json(descriptor) = manifest(State(state(ScriptedFetcher::default()))).await;
    let value = serde_json::to_value(&descriptor).unwrap();
    assert_eq!(value["resources"], serde_json::json!(["stream"]));
    assert_eq!(value["idPrefixes"], serde_json::json!(["tt"]));
    assert!(value.get("icon").is_none());
  }

  #[tokio::test]
  async fn proxy_wraps_upstream_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/page"))
      .and(header("x-test", "1"))
      .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
      .mount(&server)
      .await;

    let mut headers = BTreeMap::new();
    headers.insert("x-test".to_string(), "1".to_string());
    headers.insert("Host".to_string(), "spoofed.example".to_string());
    let response = proxy(
      State(state(ScriptedFetcher::default())),
      Json(ProxyRequest {
        target_url: Some(format!("{}/page", server.uri())),
        headers,
      }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let envelope: ProxyResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(envelope.status, 404);
    assert_eq!(envelope.status_text, "Not Found");
    assert_eq!(envelope.body, "gone");
  }

  #[tokio::test]
  async fn proxy_requires_target() {
    let response = proxy(
      State(state(ScriptedFetcher::default())),
      Json(ProxyRequest {
        target_url: None,
        headers: BTreeMap::new(),
      }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn debug_returns_last_page_as_text() {
    let fetcher = ScriptedFetcher::default()
      .page("https://a.example/movie/tt1", r#"<iframe src="/rcp/1"></iframe>"#)
      .page("https://a.example/rcp/1", "<html>final</html>");
    let response = debug_chain(
      State(state(fetcher)),
      Json(DebugRequest {
        target_url: Some("https://a.example/movie/tt1".to_string()),
        source_domain: Some("a.example".to_string()),
        headers: BTreeMap::new(),
      }),
    )
    .await;
    assert_eq!(response.headers()[CONTENT_TYPE], TEXT_PLAIN);
    assert_eq!(body_text(response).await, "<html>final</html>");
  }

  #[tokio::test]
  async fn debug_reports_upstream_status_as_note() {
    let fetcher = ScriptedFetcher::default().page("https://a.example/movie/tt1", r#"<iframe src="/missing"></iframe>"#);
    let response = debug_chain(
      State(state(fetcher)),
      Json(DebugRequest {
        target_url: Some("https://a.example/movie/tt1".to_string()),
        source_domain: None,
        headers: BTreeMap::new(),
      }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
      body_text(response).await,
      "Fetch failed for https://a.example/missing with status 404"
    );
  }

  #[tokio::test]
  async fn debug_reports_status_through_real_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/a"))
      .respond_with(ResponseTemplate::new(200).set_body_string(r#"<iframe src="/b"></iframe>"#))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/b"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let response = debug_chain(
      State(live_state()),
      Json(DebugRequest {
        target_url: Some(format!("{}/a", server.uri())),
        source_domain: None,
        headers: BTreeMap::new(),
      }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
      body_text(response).await,
      format!("Fetch failed for {}/b with status 404", server.uri())
    );
  }

  #[tokio::test]
  async fn debug_network_failure_is_an_error() {
    let target = closed_port_url().await;
    let response = debug_chain(
      State(live_state()),
      Json(DebugRequest {
        target_url: Some(target),
        source_domain: None,
        headers: BTreeMap::new(),
      }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = body_text(response).await;
    assert!(text.starts_with("An error occurred: network error"));
    assert!(text.ends_with("No HTML was fetched."));
  }

  fn resolve_request(target: &str) -> Json<ResolveRequest> {
    Json(ResolveRequest {
      target_url: Some(target.to_string()),
      source_domain: Some("vidsrc.example".to_string()),
      headers: BTreeMap::new(),
    })
  }

  #[tokio::test]
  async fn resolve_one_returns_master_and_filename() {
    let fetcher = ScriptedFetcher::default()
      .page(
        "https://a.example/embed/1",
        r#"<script>atob('L2hscy9hYmMvdmlkZW8ubTN1OA==')</script><iframe src="/rcp/1"></iframe>"#,
      )
      .page("https://a.example/rcp/1", "'https://cdn.example/abc/master.m3u8'");
    let response = resolve_one(State(state(fetcher)), resolve_request("https://a.example/embed/1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: ResolveResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body.master_url, "https://cdn.example/abc/master.m3u8");
    assert_eq!(body.source_domain, "vidsrc.example");
    assert_eq!(body.filename.as_deref(), Some("video.m3u8"));
  }

  #[tokio::test]
  async fn resolve_one_unavailable_is_499() {
    let fetcher = ScriptedFetcher::default().page("https://a.example/embed/1", MARKER);
    let response = resolve_one(State(state(fetcher)), resolve_request("https://a.example/embed/1")).await;
    assert_eq!(response.status().as_u16(), 499);
    assert!(body_text(response).await.contains("Media unavailable"));
  }

  #[tokio::test]
  async fn resolve_one_dead_end_is_404() {
    let fetcher = ScriptedFetcher::default()
      .page("https://a.example/embed/1", r#"<iframe src="/gone"></iframe>"#);
    let response = resolve_one(State(state(fetcher)), resolve_request("https://a.example/embed/1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn resolve_one_network_failure_is_502() {
    let target = closed_port_url().await;
    let response = resolve_one(State(live_state()), resolve_request(&target)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
  }

  #[tokio::test]
  async fn resolve_one_requires_source_domain() {
    let response = resolve_one(
      State(state(ScriptedFetcher::default())),
      Json(ResolveRequest {
        target_url: Some("https://a.example/embed/1".to_string()),
        source_domain: None,
        headers: BTreeMap::new(),
      }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }
}
