//! Master playlist inspection for picking a concrete rendition.

pub mod parser;
pub mod types;
pub mod utils;

pub use parser::{parse_master, parse_playlist};
pub use types::{Playlist, Resolution, Variant};

/// Highest bandwidth wins; equal bandwidths go to the larger picture.
pub fn select_best_variant(body: &str, manifest_url: &str) -> Option<Variant> {
  parse_master(body, manifest_url).into_iter().max_by_key(|v| {
    (
      v.bandwidth,
      v.resolution.map(|r| r.area()).unwrap_or(0),
    )
  })
}
