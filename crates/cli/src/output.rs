//! Terminal rendering for release results.
//!
//! Status lines go to stdout; warnings and errors go to stderr. Colors are
//! only applied when the target stream supports them.

use std::fmt::Display;
use std::time::Duration;

use owo_colors::{OwoColorize, Stream};
use shipwright_lib::metadata::{FileOutcome, FileStatus};

const OK: &str = "✓";
const FAIL: &str = "✗";
const WARN: &str = "⚠";
const NOTE: &str = "•";
pub const ARROW: &str = "→";

/// Hex digits of the archive digest shown in the summary.
const DIGEST_PREFIX: usize = 12;

pub fn short_digest(sha256: &str) -> &str {
  sha256.get(..DIGEST_PREFIX).unwrap_or(sha256)
}

/// Archive size with a binary unit, e.g. `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KB", "MB", "GB"];

  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = UNITS[0];
  for next in &UNITS[1..] {
    if value < 1024.0 {
      break;
    }
    value /= 1024.0;
    unit = *next;
  }
  format!("{:.1} {}", value, unit)
}

/// Build time as `850ms`, `12.4s` or `3m 07s`.
pub fn format_elapsed(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  match secs {
    0 => format!("{}ms", elapsed.as_millis()),
    1..=59 => format!("{:.1}s", elapsed.as_secs_f64()),
    _ => format!("{}m {:02}s", secs / 60, secs % 60),
  }
}

pub fn print_success(message: impl Display) {
  println!("{} {}", OK.if_supports_color(Stream::Stdout, |s| s.green()), message);
}

pub fn print_note(message: impl Display) {
  println!("{} {}", NOTE.if_supports_color(Stream::Stdout, |s| s.blue()), message);
}

pub fn print_warning(message: impl Display) {
  let message = message.to_string();
  eprintln!(
    "{} {}",
    WARN.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_error(message: impl Display) {
  let message = message.to_string();
  eprintln!(
    "{} {}",
    FAIL.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

/// One summary row, e.g. `  Archive: build_stage_1.4.8_abc1234.zip`.
pub fn print_field(label: &str, value: impl Display) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// Marker and text for one metadata file after synchronization.
pub fn sync_line(file: &FileOutcome) -> String {
  let path = file.path.display();
  match &file.status {
    FileStatus::Updated => format!("  ~ {} (updated)", path),
    FileStatus::Unchanged => format!("  = {} (unchanged)", path),
    FileStatus::Skipped(reason) => format!("  - {} (skipped: {})", path, reason),
    FileStatus::Failed(reason) => format!("  ! {} (failed: {})", path, reason),
  }
}

/// Prints the sync line, routing skipped and failed files to stderr.
pub fn print_sync(file: &FileOutcome) {
  let line = sync_line(file);
  match file.status {
    FileStatus::Updated => println!("{}", line.if_supports_color(Stream::Stdout, |s| s.yellow())),
    FileStatus::Unchanged => println!("{}", line.if_supports_color(Stream::Stdout, |s| s.dimmed())),
    FileStatus::Skipped(_) | FileStatus::Failed(_) => print_warning(line.trim_start()),
  }
}
