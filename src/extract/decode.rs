use base64::{
  Engine as _,
  engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};

use crate::configs::DecodeStep;

/// Runs `steps` left to right. Any step that cannot be applied aborts the chain.
pub fn apply_chain(steps: &[DecodeStep], input: &str) -> Option<String> {
  steps
    .iter()
    .try_fold(input.to_string(), |acc, step| apply_step(step, &acc))
}

pub fn apply_step(step: &DecodeStep, input: &str) -> Option<String> {
  match step {
    DecodeStep::Reverse => Some(input.chars().rev().collect()),
    DecodeStep::Base64 => decode_base64(input),
    DecodeStep::Base64Url => decode_with(input, &[&URL_SAFE, &URL_SAFE_NO_PAD]),
    DecodeStep::Hex => hex::decode(input.trim())
      .ok()
      .and_then(|bytes| String::from_utf8(bytes).ok()),
    DecodeStep::Rot13 => Some(input.chars().map(rot13).collect()),
    DecodeStep::Shift { by } => input
      .chars()
      .map(|c| {
        let shifted = i64::from(u32::from(c)) + i64::from(*by);
        u32::try_from(shifted).ok().and_then(char::from_u32)
      })
      .collect(),
    DecodeStep::Xor { key } => {
      if key.is_empty() {
        return None;
      }
      let bytes: Vec<u8> = input
        .bytes()
        .zip(key.bytes().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
      String::from_utf8(bytes).ok()
    }
    DecodeStep::Replace { from, to } => Some(input.replace(from.as_str(), to)),
  }
}

/// Standard or URL-safe alphabet, padded or not, whitespace ignored.
pub fn decode_base64(input: &str) -> Option<String> {
  decode_with(input, &[&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD])
}

fn decode_with(input: &str, engines: &[&base64::engine::GeneralPurpose]) -> Option<String> {
  let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
  let unpadded = compact.trim_end_matches('=');
  engines
    .iter()
    .find_map(|engine| {
      engine
        .decode(compact.as_bytes())
        .or_else(|_| engine.decode(unpadded.as_bytes()))
        .ok()
    })
    .and_then(|bytes| String::from_utf8(bytes).ok())
}

fn rot13(c: char) -> char {
  match c {
    'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
    'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
    _ => c,
  }
}
