//! `KEY=value` env files.

use std::fs;
use std::io;
use std::path::Path;

use regex_lite::Regex;

/// Matches an assignment of `key`: optional indentation and `export `, spaces
/// around `=`. Group 1 is everything before the key, group 2 the raw value.
fn assignment(key: &str) -> Regex {
  let pattern = format!(
    r"(?m)^([ \t]*(?:export[ \t]+)?){}[ \t]*=([^\r\n]*)",
    regex_lite::escape(key)
  );
  Regex::new(&pattern).expect("escaped key is a valid pattern")
}

/// Sets `key` to `value`.
///
/// The first assignment of the key is rewritten in place, keeping its
/// indentation and `export ` prefix. When the key is absent a new line is
/// appended, keeping the rest of the file byte for byte.
pub fn set_value(content: &str, key: &str, value: &str) -> String {
  if let Some(caps) = assignment(key).captures(content) {
    let (Some(whole), Some(lead)) = (caps.get(0), caps.get(1)) else {
      return content.to_string();
    };
    let mut out = String::with_capacity(content.len() + value.len());
    out.push_str(&content[..whole.start()]);
    out.push_str(lead.as_str());
    out.push_str(key);
    out.push('=');
    out.push_str(value);
    out.push_str(&content[whole.end()..]);
    return out;
  }

  let line = format!("{}={}", key, value);
  let mut out = String::with_capacity(content.len() + line.len() + 2);
  out.push_str(content);
  if !out.is_empty() && !out.ends_with('\n') {
    out.push('\n');
  }
  out.push_str(&line);
  out.push('\n');
  out
}

/// Looks up `key` in env file text.
///
/// Reads the same assignment [`set_value`] rewrites, so a value written back is
/// the value read next time. Matching single or double quotes around the value
/// are removed.
pub fn parse_value(content: &str, key: &str) -> Option<String> {
  let caps = assignment(key).captures(content)?;
  let raw = caps.get(2).map_or("", |m| m.as_str());
  Some(unquote(raw.trim()).to_string())
}

/// Reads `key` from the env file at `path`.
pub fn read_value(path: &Path, key: &str) -> io::Result<Option<String>> {
  let content = fs::read_to_string(path)?;
  Ok(parse_value(&content, key))
}

fn unquote(value: &str) -> &str {
  for quote in ['"', '\''] {
    if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
      return &value[1..value.len() - 1];
    }
  }
  value
}
