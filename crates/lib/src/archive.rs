//! Build output packaging.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::environment::Environment;
use crate::version::Version;

/// Deflate level used for release archives.
const COMPRESSION_LEVEL: i64 = 9;

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("build output directory not found: {0}")]
  SourceMissing(PathBuf),

  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("zip error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("archive task panicked: {0}")]
  Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
  pub path: PathBuf,
  pub files: usize,
  pub bytes: u64,
  pub sha256: String,
}

/// `build_<env>_<version>_<revision>.zip`
pub fn archive_file_name(environment: Environment, version: &Version, revision: &str) -> String {
  format!("build_{}_{}_{}.zip", environment.id(), version, revision)
}

/// Zips `source` off the async thread and waits for the archive to be closed.
pub async fn package(source: PathBuf, dest: PathBuf) -> Result<ArchiveSummary, ArchiveError> {
  tokio::task::spawn_blocking(move || zip_directory(&source, &dest))
    .await
    .map_err(|e| ArchiveError::Task(e.to_string()))?
}

/// Recursively adds the contents of `source` to a new zip at `dest`.
///
/// Entry names are relative to `source`. The call returns once the archive has
/// been finished and synced to disk; on failure the partial archive is removed.
pub fn zip_directory(source: &Path, dest: &Path) -> Result<ArchiveSummary, ArchiveError> {
  if !source.is_dir() {
    return Err(ArchiveError::SourceMissing(source.to_path_buf()));
  }

  info!(source = %source.display(), dest = %dest.display(), "packaging build output");

  match write_archive(source, dest) {
    Ok(files) => {
      let bytes = fs::metadata(dest).map_err(|e| io_err(dest, e))?.len();
      let sha256 = hash_file(dest)?;
      info!(path = %dest.display(), files, bytes, "archive written");
      Ok(ArchiveSummary {
        path: dest.to_path_buf(),
        files,
        bytes,
        sha256,
      })
    }
    Err(e) => {
      if dest.exists() {
        if let Err(rm) = fs::remove_file(dest) {
          warn!(path = %dest.display(), error = %rm, "failed to remove partial archive");
        }
      }
      Err(e)
    }
  }
}

fn write_archive(source: &Path, dest: &Path) -> Result<usize, ArchiveError> {
  let file = File::create(dest).map_err(|e| io_err(dest, e))?;
  let mut zip = ZipWriter::new(file);
  let options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .compression_level(Some(COMPRESSION_LEVEL));

  let mut files = 0;
  for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|source_err| ArchiveError::Walk {
      path: source.to_path_buf(),
      source: source_err,
    })?;
    let path = entry.path();
    let name = entry_name(source, path);

    if entry.file_type().is_dir() {
      zip.add_directory(format!("{}/", name), options)?;
      continue;
    }

    debug!(entry = %name, "adding file");
    zip.start_file(name, options)?;
    let mut input = BufReader::new(File::open(path).map_err(|e| io_err(path, e))?);
    io::copy(&mut input, &mut zip).map_err(|e| io_err(path, e))?;
    files += 1;
  }

  let file = zip.finish()?;
  file.sync_all().map_err(|e| io_err(dest, e))?;

  Ok(files)
}

/// Archive entry name: relative to `root`, always `/`-separated.
fn entry_name(root: &Path, path: &Path) -> String {
  let relative = path.strip_prefix(root).unwrap_or(path);
  relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

fn hash_file(path: &Path) -> Result<String, ArchiveError> {
  let mut file = File::open(path).map_err(|e| io_err(path, e))?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
  Ok(hex::encode(hasher.finalize()))
}

fn io_err(path: &Path, source: io::Error) -> ArchiveError {
  ArchiveError::Io {
    path: path.to_path_buf(),
    source,
  }
}
