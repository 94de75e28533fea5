use std::sync::LazyLock;

use regex::Regex;

use super::{ManifestExtractor, ManifestPattern, decode::decode_base64};

static ATOB_CALL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"atob\s*\(\s*['"]([A-Za-z0-9+/=_\-\s]+)['"]\s*\)"#).unwrap()
});

/// Stage 2: `atob('<literal>')` whose decoded text names a manifest.
#[derive(Debug, Clone)]
pub struct EncodedPayload {
  pattern: ManifestPattern,
}

impl EncodedPayload {
  pub fn new(pattern: ManifestPattern) -> Self {
    Self { pattern }
  }

  /// Every decode call in `text` is tried in document order.
  pub fn search(&self, text: &str) -> Option<String> {
    ATOB_CALL
      .captures_iter(text)
      .filter_map(|caps| decode_base64(caps.get(1)?.as_str()))
      .filter(|decoded| self.pattern.mentions_manifest(decoded))
      .find_map(|decoded| self.pattern.find_in_decoded(&decoded))
  }
}

/// Last path segment of the first `atob('<literal>')` on the page, which
/// names the stream file even when no manifest URL is decoded.
pub fn encoded_filename(body: &str) -> Option<String> {
  let caps = ATOB_CALL.captures(body)?;
  let decoded = decode_base64(caps.get(1)?.as_str())?;
  decoded
    .rsplit('/')
    .next()
    .map(str::trim)
    .filter(|name| !name.is_empty())
    .map(str::to_string)
}

impl ManifestExtractor for EncodedPayload {
  fn name(&self) -> &'static str {
    "encoded_payload"
  }

  fn extract(&self, body: &str) -> Option<String> {
    self.search(body)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn stage() -> EncodedPayload {
    EncodedPayload::new(ManifestPattern::new(".m3u8").unwrap())
  }

  #[test]
  fn decodes_literal_argument() {
    let body = r#"<script>var src = atob("aHR0cHM6Ly9jZG4uZXhhbXBsZS9tYXN0ZXIubTN1OA==");</script>"#;
    assert_eq!(stage().extract(body).as_deref(), Some("https://cdn.example/master.m3u8"));
  }

  #[test]
  fn skips_payloads_without_manifest() {
    // "hello world", then the real one
    let body = r#"atob('aGVsbG8gd29ybGQ='); atob( 'aHR0cHM6Ly9jZG4uZXhhbXBsZS9tYXN0ZXIubTN1OA' )"#;
    assert_eq!(stage().extract(body).as_deref(), Some("https://cdn.example/master.m3u8"));
    assert_eq!(stage().extract("atob('aGVsbG8gd29ybGQ=')"), None);
  }

  #[test]
  fn non_literal_argument_is_ignored() {
    assert_eq!(stage().extract("atob(payload)"), None);
  }

  #[test]
  fn filename_is_last_segment_of_first_payload() {
    // "/hls/abc/video.m3u8"
    let body = r#"atob('L2hscy9hYmMvdmlkZW8ubTN1OA=='); atob('aGVsbG8=')"#;
    assert_eq!(encoded_filename(body).as_deref(), Some("video.m3u8"));
    assert_eq!(encoded_filename("<p>none</p>"), None);
  }
}
