use super::{
  types::{Playlist, Variant},
  utils::{extract_attr_str, extract_attr_u64, parse_resolution, resolve_url},
};

/// Parses just enough of an M3U8 playlist to list its variants.
pub fn parse_playlist(text: &str, base_url: &str) -> Playlist {
  let lines: Vec<&str> = text.lines().map(str::trim).collect();

  if !lines.iter().any(|l| l.starts_with("#EXT-X-STREAM-INF")) {
    return Playlist::Media;
  }

  let mut variants = Vec::new();
  let mut i = 0;
  while i < lines.len() {
    let line = lines[i];
    if !line.starts_with("#EXT-X-STREAM-INF") {
      i += 1;
      continue;
    }

    let mut j = i + 1;
    while j < lines.len() && (lines[j].starts_with('#') || lines[j].is_empty()) {
      j += 1;
    }
    if j < lines.len() {
      variants.push(Variant {
        url: resolve_url(base_url, lines[j]),
        bandwidth: extract_attr_u64(line, "BANDWIDTH").unwrap_or(0),
        resolution: extract_attr_str(line, "RESOLUTION").as_deref().and_then(parse_resolution),
        codecs: extract_attr_str(line, "CODECS"),
        frame_rate: extract_attr_str(line, "FRAME-RATE").and_then(|f| f.parse().ok()),
      });
    }
    i = j + 1;
  }

  Playlist::Master { variants }
}

/// Variants of a master playlist; empty for media playlists.
pub fn parse_master(text: &str, base_url: &str) -> Vec<Variant> {
  match parse_playlist(text, base_url) {
    Playlist::Master { variants } => variants,
    Playlist::Media => Vec::new(),
  }
}
