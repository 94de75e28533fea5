use url::Url;

use super::types::Resolution;

pub fn extract_attr_u64(line: &str, key: &str) -> Option<u64> {
  extract_attr_str(line, key)?.parse().ok()
}

pub fn extract_attr_str(line: &str, key: &str) -> Option<String> {
  let key_eq = format!("{}=", key);
  // Attributes follow `#TAG:` or a comma
  let pos = line
    .find(&format!(":{}", key_eq))
    .or_else(|| line.find(&format!(",{}", key_eq)))?
    + 1;

  let rest = &line[pos + key_eq.len()..];
  if let Some(quoted) = rest.strip_prefix('"') {
    let end = quoted.find('"')?;
    Some(quoted[..end].to_string())
  } else {
    let end = rest.find(',').unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
  }
}

pub fn parse_resolution(raw: &str) -> Option<Resolution> {
  let (w, h) = raw.split_once(['x', 'X'])?;
  Some(Resolution {
    width: w.trim().parse().ok()?,
    height: h.trim().parse().ok()?,
  })
}

/// Resolves a playlist URI against the playlist's own URL. Tokens in the
/// playlist URL's query are not carried over to relative entries.
pub fn resolve_url(base: &str, maybe_relative: &str) -> String {
  if maybe_relative.starts_with("http://") || maybe_relative.starts_with("https://") {
    return maybe_relative.to_string();
  }
  let Ok(mut base_url) = Url::parse(base) else {
    return maybe_relative.to_string();
  };
  base_url.set_query(None);
  base_url.set_fragment(None);
  base_url
    .join(maybe_relative)
    .map(|u| u.to_string())
    .unwrap_or_else(|_| maybe_relative.to_string())
}
