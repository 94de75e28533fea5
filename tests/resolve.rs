use streamscout::{
  configs::{Config, RelayConfig, RelayRequest, RelayResponse},
  resolver::{Resolved, ResolutionRequest, Resolver},
};
use wiremock::{
  Mock, MockServer, ResponseTemplate,
  matchers::{body_partial_json, header, method, path},
};

fn host_of(server: &MockServer) -> String {
  server.address().to_string()
}

fn config(hosts: Vec<String>) -> Config {
  let mut config = Config::default();
  config.resolver.stagger_min_ms = 0;
  config.resolver.stagger_max_ms = 0;
  config.sources.hosts = hosts;
  config.sources.movie_path = "http://{host}/embed/movie/{id}".to_string();
  config.sources.episode_path = "http://{host}/embed/tv/{id}/{season}-{episode}".to_string();
  config.transport.attempt_timeout_ms = 2_000;
  config.cache.enabled = false;
  config
}

const HIDDEN_PLAYER: &str = r#"<html><body>
<div id="pjs_main" style="display:none">=gTdz0mLyVGdzFWbv4WZkRWao9SZsBXbhhXZu4GZj9yL</div>
<script>new Playerjs({id: "player", file: pjs_main});</script>
</body></html>"#;

#[tokio::test]
async fn resolves_through_iframe_chain_and_hidden_payload() {
  let broken = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(503))
    .mount(&broken)
    .await;

  let good = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/embed/tv/tt0944947/1-2"))
    .respond_with(
      ResponseTemplate::new(200)
        .set_body_string(r#"<iframe id="player_iframe" src="/rcp/abc123" frameborder="0"></iframe>"#)
        .append_header("set-cookie", "cf=ok; Path=/"),
    )
    .mount(&good)
    .await;
  Mock::given(method("GET"))
    .and(path("/rcp/abc123"))
    .and(header("cookie", "cf=ok"))
    .respond_with(ResponseTemplate::new(200).set_body_string(HIDDEN_PLAYER))
    .expect(1)
    .mount(&good)
    .await;

  let resolver = Resolver::from_config(&config(vec![host_of(&broken), host_of(&good)])).unwrap();
  let resolved = resolver
    .resolve(&ResolutionRequest::episode("tt0944947", 1, 2))
    .await;

  let stream = resolved.stream().expect("stream resolved");
  assert_eq!(stream.manifest_url, "https://cdn.example/hidden/master.m3u8");
  assert_eq!(stream.source_identity, host_of(&good));
  assert_eq!(stream.hops_used, Some(2));
}

#[tokio::test]
async fn unavailable_source_ends_the_race() {
  let gone = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/embed/movie/tt404"))
    .respond_with(
      ResponseTemplate::new(200)
        .set_body_string("<h3>This media is unavailable at the moment.</h3><iframe src=\"/rcp/x\"></iframe>"),
    )
    .mount(&gone)
    .await;
  Mock::given(method("GET"))
    .and(path("/rcp/x"))
    .respond_with(ResponseTemplate::new(200))
    .expect(0)
    .mount(&gone)
    .await;

  let resolver = Resolver::from_config(&config(vec![host_of(&gone)])).unwrap();
  let resolved = resolver.resolve(&ResolutionRequest::movie("tt404")).await;
  assert_eq!(
    resolved,
    Resolved::Unavailable {
      source_identity: host_of(&gone)
    }
  );
}

#[tokio::test]
async fn blocked_direct_fetch_falls_back_to_json_relay() {
  let origin = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(403))
    .mount(&origin)
    .await;

  let relay = MockServer::start().await;
  let target = format!("http://{}/embed/movie/tt1", host_of(&origin));
  Mock::given(method("POST"))
    .and(path("/api/proxy"))
    .and(body_partial_json(serde_json::json!({ "targetUrl": target })))
    .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
      "status": 200,
      "statusText": "OK",
      "body": "<script>var src = atob('aHR0cHM6Ly9jZG4uZXhhbXBsZS9tYXN0ZXIubTN1OA==');</script>",
    })))
    .expect(1)
    .mount(&relay)
    .await;

  let mut config = config(vec![host_of(&origin)]);
  config.transport.relays = vec![RelayConfig {
    name: "self".to_string(),
    endpoint: format!("{}/api/proxy", relay.uri()),
    request: RelayRequest::JsonPost,
    response: RelayResponse::Json {
      body_field: "body".to_string(),
      status_field: Some("status".to_string()),
      headers_field: None,
      error_field: Some("error".to_string()),
    },
  }];

  let resolved = Resolver::from_config(&config)
    .unwrap()
    .resolve(&ResolutionRequest::movie("tt1"))
    .await;
  assert_eq!(
    resolved.stream().map(|s| s.manifest_url.as_str()),
    Some("https://cdn.example/master.m3u8")
  );
}

#[tokio::test]
async fn nothing_anywhere_is_not_found() {
  let empty = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(200).set_body_string("<p>coming soon</p>"))
    .mount(&empty)
    .await;

  let resolver = Resolver::from_config(&config(vec![host_of(&empty)])).unwrap();
  assert_eq!(
    resolver.resolve(&ResolutionRequest::movie("tt2")).await,
    Resolved::NotFound
  );
}

#[tokio::test]
async fn unreachable_sources_are_not_found() {
  let mut hosts = Vec::new();
  for _ in 0..3 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    hosts.push(listener.local_addr().unwrap().to_string());
  }

  let resolver = Resolver::from_config(&config(hosts)).unwrap();
  let resolved = tokio::time::timeout(
    std::time::Duration::from_secs(10),
    resolver.resolve(&ResolutionRequest::movie("tt3")),
  )
  .await
  .expect("race finished in time");
  assert_eq!(resolved, Resolved::NotFound);
}
