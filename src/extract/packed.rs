use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{ManifestExtractor, ManifestPattern, encoded::EncodedPayload};

/// The `eval(function(p,a,c,k,e,d)` prologue, whatever the whitespace.
static PACKER_PROLOGUE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"eval\s*\(\s*function\s*\(\s*p\s*,\s*a\s*,\s*c\s*,\s*k\s*,\s*e\s*,\s*[rd]\s*\)"#).unwrap()
});

static PACKER_ARGS_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r#"\}\s*\(\s*'((?:[^'\\]|\\.)*)'\s*,\s*(\d+|\[\])\s*,\s*(\d+)\s*,\s*'((?:[^'\\]|\\.)*)'\s*\.split\(\s*'\|'\s*\)"#,
  )
  .unwrap()
});

static PACKER_ARGS_DOUBLE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r#"\}\s*\(\s*"((?:[^"\\]|\\.)*)"\s*,\s*(\d+|\[\])\s*,\s*(\d+)\s*,\s*"((?:[^"\\]|\\.)*)"\s*\.split\(\s*"\|"\s*\)"#,
  )
  .unwrap()
});

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").unwrap());

/// Stage 4: unpack `eval(function(p,a,c,k,e,d){…})` blobs and search only
/// inside the unpacked source.
#[derive(Debug, Clone)]
pub struct PackedScript {
  pattern: ManifestPattern,
  encoded: EncodedPayload,
}

impl PackedScript {
  pub fn new(pattern: ManifestPattern, encoded: EncodedPayload) -> Self {
    Self { pattern, encoded }
  }

  /// Unpacked source of every packer blob in `body`, in document order.
  pub fn unpack_all(body: &str) -> Vec<String> {
    PACKER_PROLOGUE
      .find_iter(body)
      .filter_map(|m| {
        let rest = &body[m.end()..];
        PACKER_ARGS_SINGLE
          .captures(rest)
          .or_else(|| PACKER_ARGS_DOUBLE.captures(rest))
          .and_then(|caps| unpack_captures(&caps))
      })
      .collect()
  }

  fn search_blob(&self, blob: &str) -> Option<String> {
    self.encoded.search(blob).or_else(|| {
      let text = blob.replace("\\/", "/");
      self.pattern.find_absolute(&text)
    })
  }
}

impl ManifestExtractor for PackedScript {
  fn name(&self) -> &'static str {
    "packed_script"
  }

  fn extract(&self, body: &str) -> Option<String> {
    Self::unpack_all(body)
      .iter()
      .find_map(|blob| self.search_blob(blob))
  }
}

fn unpack_captures(caps: &Captures<'_>) -> Option<String> {
  let payload = caps.get(1)?.as_str();
  let radix = match caps.get(2)?.as_str() {
    "[]" => 62,
    n => n.parse().ok()?,
  };
  let count: usize = caps.get(3)?.as_str().parse().ok()?;
  let keywords: Vec<&str> = caps.get(4)?.as_str().split('|').collect();
  unpack(&unescape(payload), radix, count, &keywords)
}

/// Replaces every base-`radix` token in `payload` with its dictionary word.
/// Tokens without a (non-empty) word stay as they are.
pub fn unpack(payload: &str, radix: u32, count: usize, keywords: &[&str]) -> Option<String> {
  if !(2..=62).contains(&radix) {
    return None;
  }
  let unpacked = WORD.replace_all(payload, |caps: &Captures<'_>| {
    let token = &caps[0];
    decode_token(token, radix)
      .filter(|i| *i < count)
      .and_then(|i| keywords.get(i))
      .filter(|word| !word.is_empty())
      .map_or_else(|| token.to_string(), |word| word.to_string())
  });
  Some(unpacked.into_owned())
}

fn decode_token(token: &str, radix: u32) -> Option<usize> {
  token.chars().try_fold(0usize, |acc, c| {
    let digit = match c {
      '0'..='9' => c as u32 - '0' as u32,
      'a'..='z' => c as u32 - 'a' as u32 + 10,
      'A'..='Z' => c as u32 - 'A' as u32 + 36,
      _ => return None,
    };
    if digit >= radix {
      return None;
    }
    acc.checked_mul(radix as usize)?.checked_add(digit as usize)
  })
}

fn unescape(payload: &str) -> String {
  payload.replace("\\'", "'").replace("\\\"", "\"").replace("\\\\", "\\")
}
