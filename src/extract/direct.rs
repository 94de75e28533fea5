use regex::Regex;

use super::{ManifestExtractor, ManifestPattern};

/// Stage 1: a literal absolute manifest URL in the page text.
///
/// Key-bound references (`file: "…"`, `"source":"…"`) are preferred over the
/// first loose match. With `strict` set, loose matches are ignored.
#[derive(Debug, Clone)]
pub struct DirectReference {
  pattern: ManifestPattern,
  keyed: Option<Regex>,
  strict: bool,
}

impl DirectReference {
  pub fn new(pattern: ManifestPattern, keys: &[String], strict: bool) -> Result<Self, regex::Error> {
    let keyed = if keys.is_empty() {
      None
    } else {
      let alternation = keys.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
      let ext = regex::escape(pattern.extension());
      Some(Regex::new(&format!(
        r#"["']?\b(?:{alternation})["']?\s*[:=]\s*["'](https?://[^"'\s]+?{ext}[^"'\s]*)["']"#
      ))?)
    };
    Ok(Self {
      pattern,
      keyed,
      strict,
    })
  }
}

impl ManifestExtractor for DirectReference {
  fn name(&self) -> &'static str {
    "direct"
  }

  fn extract(&self, body: &str) -> Option<String> {
    if !self.pattern.mentions_manifest(body) {
      return None;
    }
    let text = body.replace("\\/", "/");

    let keyed = self
      .keyed
      .as_ref()
      .and_then(|re| re.captures(&text))
      .and_then(|caps| caps.get(1))
      .map(|m| m.as_str().to_string());
    if keyed.is_some() || self.strict {
      return keyed;
    }
    self.pattern.find_absolute(&text)
  }
}
