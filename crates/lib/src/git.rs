//! Release commits and revision lookup through the system `git`.

use std::path::Path;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::version::Version;

#[derive(Debug, Error)]
pub enum GitError {
  #[error("failed to run git {args}: {source}")]
  Spawn {
    args: String,
    #[source]
    source: std::io::Error,
  },

  #[error("git {args} exited with code {code:?}: {stderr}")]
  Failed {
    args: String,
    code: Option<i32>,
    stderr: String,
  },
}

/// Commit message for a release: `v<version> - <message>`.
pub fn commit_message(version: &Version, message: &str) -> String {
  format!("v{} - {}", version, message)
}

/// Stages the whole working tree and commits it.
pub async fn commit_release(project_dir: &Path, version: &Version, message: &str) -> Result<String, GitError> {
  let full_message = commit_message(version, message);
  info!(message = %full_message, "committing release changes");

  git(project_dir, &["add", "."]).await?;
  git(project_dir, &["commit", "-m", &full_message]).await?;

  Ok(full_message)
}

/// Abbreviated hash of `HEAD`.
pub async fn short_revision(project_dir: &Path) -> Result<String, GitError> {
  git(project_dir, &["rev-parse", "--short", "HEAD"]).await
}

async fn git(project_dir: &Path, args: &[&str]) -> Result<String, GitError> {
  let joined = args.join(" ");
  debug!(args = %joined, dir = %project_dir.display(), "running git");

  let output = Command::new("git")
    .args(args)
    .current_dir(project_dir)
    .output()
    .await
    .map_err(|source| GitError::Spawn {
      args: joined.clone(),
      source,
    })?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    return Err(GitError::Failed {
      args: joined,
      code: output.status.code(),
      stderr,
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
