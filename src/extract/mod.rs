//! Best-effort static extraction over untrusted page markup.
//!
//! A page is handed to an ordered list of [`ManifestExtractor`] stages; the
//! first stage that yields a manifest URL wins and later stages never run.
//! Stages are pure: they see the body and nothing else. Next-hop discovery is
//! a separate search used only when every stage came up empty.

use regex::Regex;
use tracing::trace;

use crate::configs::ExtractionConfig;

pub mod decode;
pub mod direct;
pub mod encoded;
pub mod hidden;
pub mod next_hop;
pub mod packed;

pub use direct::DirectReference;
pub use encoded::EncodedPayload;
pub use hidden::HiddenPayload;
pub use next_hop::NextHopFinder;
pub use packed::PackedScript;

/// One extraction strategy.
pub trait ManifestExtractor: Send + Sync {
  fn name(&self) -> &'static str;
  fn extract(&self, body: &str) -> Option<String>;
}

/// A manifest URL plus the stage that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
  pub manifest_url: String,
  pub stage: &'static str,
}

/// Finds manifest references inside already-extracted text.
#[derive(Debug, Clone)]
pub struct ManifestPattern {
  extension: String,
  absolute: Regex,
  scheme_relative: Regex,
}

impl ManifestPattern {
  pub fn new(extension: &str) -> Result<Self, regex::Error> {
    let ext = regex::escape(extension);
    Ok(Self {
      extension: extension.to_string(),
      absolute: Regex::new(&format!(r#"https?://[^\s'"<>\\]+?{ext}[^\s'"<>\\]*"#))?,
      scheme_relative: Regex::new(&format!(r#"(?:https?:)?//[^\s'"<>\\]+?{ext}[^\s'"<>\\]*"#))?,
    })
  }

  pub fn extension(&self) -> &str {
    &self.extension
  }

  pub fn mentions_manifest(&self, text: &str) -> bool {
    text.contains(self.extension.as_str())
  }

  /// First absolute `http(s)://…<ext>…` reference.
  pub fn find_absolute(&self, text: &str) -> Option<String> {
    self.absolute.find(text).map(|m| m.as_str().to_string())
  }

  /// Like [`find_absolute`](Self::find_absolute), but also accepts
  /// scheme-relative `//host/…` references, which are pinned to https.
  pub fn find_in_decoded(&self, text: &str) -> Option<String> {
    let found = self.scheme_relative.find(text)?.as_str();
    Some(match found.strip_prefix("//") {
      Some(rest) => format!("https://{}", rest),
      None => found.to_string(),
    })
  }
}

pub struct ExtractorChain {
  stages: Vec<Box<dyn ManifestExtractor>>,
  next_hop: NextHopFinder,
}

impl ExtractorChain {
  /// Direct match, encoded payload, hidden payload, packed script.
  pub fn from_config(config: &ExtractionConfig) -> Result<Self, regex::Error> {
    let pattern = ManifestPattern::new(&config.manifest_extension)?;
    let encoded = EncodedPayload::new(pattern.clone());
    let stages: Vec<Box<dyn ManifestExtractor>> = vec![
      Box::new(DirectReference::new(
        pattern.clone(),
        &config.direct_keys,
        config.strict_keys,
      )?),
      Box::new(encoded.clone()),
      Box::new(HiddenPayload::new(pattern.clone(), config.decoders.clone())),
      Box::new(PackedScript::new(pattern, encoded)),
    ];
    Ok(Self::with_stages(
      stages,
      NextHopFinder::new(config.script_extensions.clone()),
    ))
  }

  pub fn with_stages(stages: Vec<Box<dyn ManifestExtractor>>, next_hop: NextHopFinder) -> Self {
    Self { stages, next_hop }
  }

  pub fn stage_names(&self) -> Vec<&'static str> {
    self.stages.iter().map(|s| s.name()).collect()
  }

  pub fn extract(&self, body: &str) -> Option<Extraction> {
    self.stages.iter().find_map(|stage| {
      let found = stage.extract(body);
      trace!("Extractor {} -> {:?}", stage.name(), found);
      found.map(|manifest_url| Extraction {
        manifest_url,
        stage: stage.name(),
      })
    })
  }

  pub fn next_hop(&self, body: &str) -> Option<String> {
    self.next_hop.find(body)
  }
}
