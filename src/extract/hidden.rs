use std::sync::LazyLock;

use regex::Regex;

use super::{ManifestExtractor, ManifestPattern, decode::apply_chain};
use crate::configs::DecoderConfig;

/// `file: someId` or `file: document.getElementById('someId').innerHTML`.
static FILE_BINDING: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r#"\bfile["']?\s*:\s*(?:document\.getElementById\(\s*["']([\w-]+)["']\s*\)|([A-Za-z_$][\w$]*)\b)"#,
  )
  .unwrap()
});

static HIDDEN_MARKER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?i)display\s*:\s*none|visibility\s*:\s*hidden|\bhidden\b"#).unwrap()
});

/// A text-only element: its attributes and its content.
static TEXT_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?s)<(?:div|span|p|textarea)\b([^>]*)>([^<]*)<"#).unwrap()
});

static ID_ATTR: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"\bid\s*=\s*["']([\w-]+)["']"#).unwrap());

const NOT_IDENTIFIERS: &[&str] = &["true", "false", "null", "undefined", "this", "function"];

/// Stage 3: a non-rendered element referenced by the player's `file`
/// binding, whose text is run through the configured decoder chains.
#[derive(Debug, Clone)]
pub struct HiddenPayload {
  pattern: ManifestPattern,
  decoders: Vec<DecoderConfig>,
}

impl HiddenPayload {
  pub fn new(pattern: ManifestPattern, decoders: Vec<DecoderConfig>) -> Self {
    Self { pattern, decoders }
  }

  fn bound_ids(body: &str) -> Vec<&str> {
    FILE_BINDING
      .captures_iter(body)
      .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
      .map(|m| m.as_str())
      .filter(|id| !NOT_IDENTIFIERS.contains(id))
      .collect()
  }

  /// Text content of the hidden element with `id`, if there is one.
  fn hidden_text<'a>(body: &'a str, id: &str) -> Option<&'a str> {
    let caps = TEXT_ELEMENT.captures_iter(body).find(|caps| {
      caps
        .get(1)
        .and_then(|attrs| ID_ATTR.captures(attrs.as_str()))
        .and_then(|id_caps| id_caps.get(1))
        .is_some_and(|m| m.as_str() == id)
    })?;
    let attrs = caps.get(1)?.as_str();
    if !HIDDEN_MARKER.is_match(attrs) {
      return None;
    }
    let text = caps.get(2)?.as_str().trim();
    (!text.is_empty()).then_some(text)
  }

  fn decode(&self, payload: &str) -> Option<String> {
    self.decoders.iter().find_map(|decoder| {
      let decoded = apply_chain(&decoder.steps, payload)?;
      tracing::trace!("Decoder {} produced {} chars", decoder.name, decoded.len());
      self.pattern.find_in_decoded(&decoded)
    })
  }
}

impl ManifestExtractor for HiddenPayload {
  fn name(&self) -> &'static str {
    "hidden_payload"
  }

  fn extract(&self, body: &str) -> Option<String> {
    if self.decoders.is_empty() {
      return None;
    }
    Self::bound_ids(body)
      .into_iter()
      .filter_map(|id| Self::hidden_text(body, id))
      .find_map(|payload| self.decode(payload))
  }
}
