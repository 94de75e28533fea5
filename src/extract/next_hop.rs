use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static IFRAME_SRC: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?i)<iframe[^>]+src\s*=\s*["']([^"']+)["']"#).unwrap()
});

/// `src: "…"` in a config object, or `el.src = "…"`.
static DYNAMIC_SRC: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?:\bsrc\s*:\s*|\.src\s*=\s*)["']([^"']+)["']"#).unwrap()
});

const REJECTED_SCHEMES: &[&str] = &["about:", "javascript:", "data:", "blob:", "mailto:"];

/// Finds the embedded page a chain continues to.
#[derive(Debug, Clone)]
pub struct NextHopFinder {
  script_extensions: Vec<String>,
}

impl NextHopFinder {
  pub fn new(script_extensions: Vec<String>) -> Self {
    Self {
      script_extensions: script_extensions
        .into_iter()
        .map(|ext| ext.to_ascii_lowercase())
        .collect(),
    }
  }

  /// Literal `<iframe src>` first, then script assignments. The result may
  /// still be relative; see [`resolve_next`].
  pub fn find(&self, body: &str) -> Option<String> {
    self
      .first_page(&IFRAME_SRC, body)
      .or_else(|| self.first_page(&DYNAMIC_SRC, body))
  }

  fn first_page(&self, re: &Regex, body: &str) -> Option<String> {
    re.captures_iter(body)
      .filter_map(|caps| caps.get(1))
      .map(|m| m.as_str().trim().replace("&amp;", "&"))
      .find(|candidate| self.is_page(candidate))
  }

  fn is_page(&self, candidate: &str) -> bool {
    if candidate.is_empty() || candidate.starts_with('#') {
      return false;
    }
    let lower = candidate.to_ascii_lowercase();
    if REJECTED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
      return false;
    }
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    !self.script_extensions.iter().any(|ext| path.ends_with(ext.as_str()))
  }
}

/// Resolves `candidate` against the page it was found on. Only http(s)
/// targets are followed.
pub fn resolve_next(current: &str, candidate: &str) -> Option<String> {
  let base = Url::parse(current).ok()?;
  let next = base.join(candidate).ok()?;
  matches!(next.scheme(), "http" | "https").then(|| next.to_string())
}

/// `scheme://host[:port]/` of `url`.
pub fn origin_referer(url: &str) -> Option<String> {
  let parsed = Url::parse(url).ok()?;
  let host = parsed.host_str()?;
  Some(match parsed.port() {
    Some(port) => format!("{}://{}:{}/", parsed.scheme(), host, port),
    None => format!("{}://{}/", parsed.scheme(), host),
  })
}
