use serde::{Deserialize, Serialize};

/// `RESOLUTION=WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
  pub width: u32,
  pub height: u32,
}

impl Resolution {
  pub fn area(&self) -> u64 {
    u64::from(self.width) * u64::from(self.height)
  }
}

/// One `#EXT-X-STREAM-INF` entry of a master playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
  pub url: String,
  pub bandwidth: u64,
  pub resolution: Option<Resolution>,
  pub codecs: Option<String>,
  pub frame_rate: Option<f64>,
}

pub enum Playlist {
  Master { variants: Vec<Variant> },
  /// Segments only; nothing to choose between.
  Media,
}
