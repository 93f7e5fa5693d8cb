//! Version propagation into project metadata files.
//!
//! Each target is read, patched as text and rewritten on its own. A failure on
//! one file is logged and recorded in the [`SyncReport`]; the remaining files
//! are still processed.

pub mod envfile;
pub mod json;

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{ENV_KEY, MANIFEST_PATH, PACKAGE_JSON_PATH, VERSION_KEY};
use crate::environment::Environment;
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
  /// JSON text with a top-level `"version"` string.
  Json,
  /// Line-oriented `KEY=value` file.
  EnvFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTarget {
  pub path: PathBuf,
  pub kind: TargetKind,
}

impl MetadataTarget {
  pub fn json(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      kind: TargetKind::Json,
    }
  }

  pub fn env_file(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      kind: TargetKind::EnvFile,
    }
  }
}

/// The manifest, the package descriptor and the environment's env file.
pub fn release_targets(project_dir: &Path, environment: Environment) -> Vec<MetadataTarget> {
  vec![
    MetadataTarget::json(project_dir.join(MANIFEST_PATH)),
    MetadataTarget::json(project_dir.join(PACKAGE_JSON_PATH)),
    MetadataTarget::env_file(environment.env_file_path(project_dir)),
  ]
}

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
  Updated,
  Unchanged,
  Skipped(String),
  Failed(String),
}

impl fmt::Display for FileStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FileStatus::Updated => f.write_str("updated"),
      FileStatus::Unchanged => f.write_str("unchanged"),
      FileStatus::Skipped(reason) => write!(f, "skipped ({})", reason),
      FileStatus::Failed(message) => write!(f, "failed ({})", message),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
  pub path: PathBuf,
  pub status: FileStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub files: Vec<FileOutcome>,
}

impl SyncReport {
  pub fn updated(&self) -> usize {
    self.count(|s| matches!(s, FileStatus::Updated))
  }

  pub fn failed(&self) -> usize {
    self.count(|s| matches!(s, FileStatus::Failed(_)))
  }

  fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
    self.files.iter().filter(|f| pred(&f.status)).count()
  }
}

/// Writes `version` (and, for env files, the environment id) into every target.
pub fn sync_metadata(targets: &[MetadataTarget], version: &Version, environment: Environment) -> SyncReport {
  let version = version.to_string();
  let mut report = SyncReport::default();

  for target in targets {
    let status = match sync_target(target, &version, environment) {
      Ok(status) => status,
      Err(e) => {
        warn!(path = %target.path.display(), error = %e, "failed to update metadata file, continuing");
        FileStatus::Failed(e.to_string())
      }
    };
    debug!(path = %target.path.display(), status = %status, "metadata target processed");
    report.files.push(FileOutcome {
      path: target.path.clone(),
      status,
    });
  }

  report
}

fn sync_target(target: &MetadataTarget, version: &str, environment: Environment) -> Result<FileStatus, SyncError> {
  if !target.path.exists() {
    let reason = match target.kind {
      TargetKind::EnvFile => "env file not found",
      TargetKind::Json => "file not found",
    };
    warn!(path = %target.path.display(), "{}, skipping", reason);
    return Ok(FileStatus::Skipped(reason.to_string()));
  }

  let content = fs::read_to_string(&target.path).map_err(|source| SyncError::Read {
    path: target.path.clone(),
    source,
  })?;

  let patched = match target.kind {
    TargetKind::Json => match json::patch_version(&content, version) {
      Some(patched) => patched,
      None => {
        warn!(path = %target.path.display(), "version key not found, leaving file untouched");
        return Ok(FileStatus::Skipped("version key not found".to_string()));
      }
    },
    TargetKind::EnvFile => {
      let patched = envfile::set_value(&content, VERSION_KEY, version);
      envfile::set_value(&patched, ENV_KEY, environment.id())
    }
  };

  if patched == content {
    return Ok(FileStatus::Unchanged);
  }

  write_atomic(&target.path, &patched).map_err(|source| SyncError::Write {
    path: target.path.clone(),
    source,
  })?;
  info!(path = %target.path.display(), version = %version, "version updated");

  Ok(FileStatus::Updated)
}

/// Replaces `path` with `content` via a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
  let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
  let mut tmp = NamedTempFile::new_in(dir)?;
  tmp.write_all(content.as_bytes())?;
  tmp.as_file().sync_all()?;

  // Carry the original permissions over to the replacement.
  if let Ok(meta) = fs::metadata(path) {
    fs::set_permissions(tmp.path(), meta.permissions())?;
  }

  tmp.persist(path).map_err(|e| e.error)?;
  Ok(())
}
