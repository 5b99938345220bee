//! Deterministic embedding text assembly.

use serde_json::{Value, json};

/// Truncation bound for assembled embedding text, in characters.
pub const EMBED_TEXT_MAX_CHARS: usize = 8000;

/// Build the text a version is embedded under:
/// `"path:<p>\nvalue:<json>\ntags:<json>"`, truncated to
/// [`EMBED_TEXT_MAX_CHARS`]. Deterministic so re-embedding the same version
/// always produces the same input.
pub fn build_embed_text(path: &str, value: &Value, tags: &[String]) -> String {
  let full = format!(
    "path:{path}\nvalue:{}\ntags:{}",
    value,
    json!(tags)
  );
  if full.chars().count() <= EMBED_TEXT_MAX_CHARS {
    full
  } else {
    full.chars().take(EMBED_TEXT_MAX_CHARS).collect()
  }
}

/// Approximate token count used for quota accounting: `ceil(chars / 4)`.
pub fn approx_tokens(text: &str) -> i64 {
  (text.chars().count() as i64 + 3) / 4
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embed_text_layout() {
    let text =
      build_embed_text("/a/b", &json!({"k": 1}), &["x".into(), "y".into()]);
    assert_eq!(text, "path:/a/b\nvalue:{\"k\":1}\ntags:[\"x\",\"y\"]");
  }

  #[test]
  fn embed_text_truncates() {
    let big = json!("x".repeat(EMBED_TEXT_MAX_CHARS * 2));
    let text = build_embed_text("/big", &big, &[]);
    assert_eq!(text.chars().count(), EMBED_TEXT_MAX_CHARS);
  }

  #[test]
  fn token_estimate_rounds_up() {
    assert_eq!(approx_tokens(""), 0);
    assert_eq!(approx_tokens("abc"), 1);
    assert_eq!(approx_tokens("abcd"), 1);
    assert_eq!(approx_tokens("abcde"), 2);
  }
}
