use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ExtractionConfig {
  pub manifest_extension: String,
  /// Assignment keys (`file:`, `source:`) preferred by the direct matcher.
  pub direct_keys: Vec<String>,
  /// Only accept direct matches bound to one of `direct_keys`.
  pub strict_keys: bool,
  /// Next-hop candidates ending in these are script assets, not pages.
  pub script_extensions: Vec<String>,
  /// Hidden-payload decode chains, tried in order.
  pub decoders: Vec<DecoderConfig>,
}

impl Default for ExtractionConfig {
  fn default() -> Self {
    Self {
      manifest_extension: ".m3u8".to_string(),
      direct_keys: vec!["file".into(), "source".into(), "src".into()],
      strict_keys: false,
      script_extensions: vec![".js".into(), ".mjs".into()],
      decoders: vec![DecoderConfig {
        name: "reverse-base64".to_string(),
        steps: vec![DecodeStep::Reverse, DecodeStep::Base64],
      }],
    }
  }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DecoderConfig {
  pub name: String,
  pub steps: Vec<DecodeStep>,
}

/// A single reversible-text transform. Chains of these recover hidden
/// payloads and change whenever the upstream player is re-obfuscated.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DecodeStep {
  Reverse,
  Base64,
  Base64Url,
  Hex,
  Rot13,
  /// Shift every char code by `by`.
  Shift { by: i32 },
  /// XOR every byte with the repeating key.
  Xor { key: String },
  /// Replace every occurrence of `from` with `to`.
  Replace { from: String, to: String },
}
