//! Text patching of the `"version"` field in JSON documents.
//!
//! The document is never parsed and re-serialized, so key order, indentation
//! and every byte outside the matched field stay as they were.

use std::sync::LazyLock;

use regex_lite::{NoExpand, Regex};

static VERSION_FIELD: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#""version"\s*:\s*"\d+\.\d+(?:\.\d+)?""#).expect("version field pattern is valid")
});

/// Returns the current value of the first `"version"` field, if any.
pub fn find_version(content: &str) -> Option<&str> {
  let field = VERSION_FIELD.find(content)?.as_str();
  let value = field.trim_end_matches('"');
  value.rsplit('"').next()
}

/// Rewrites the first `"version"` field to `version`.
///
/// Returns `None` when the document has no matching field.
pub fn patch_version(content: &str, version: &str) -> Option<String> {
  if !VERSION_FIELD.is_match(content) {
    return None;
  }
  let replacement = format!(r#""version": "{}""#, version);
  Some(VERSION_FIELD.replacen(content, 1, NoExpand(&replacement)).into_owned())
}
