//! Running the project's build command.
//!
//! The command runs through the platform shell in the project directory with
//! the inherited environment plus the release version and environment id.

use std::path::Path;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::consts::{ENV_KEY, VERSION_KEY};
use crate::environment::Environment;
use crate::version::Version;

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("failed to start build command '{cmd}': {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("build command exited with code {code:?}: {cmd}{tail}", tail = stderr_tail(.output))]
  Failed {
    cmd: String,
    code: Option<i32>,
    output: BuildOutput,
  },
}

/// Captured result of a finished build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
  pub command: String,
  pub status: ExitStatus,
  pub stdout: String,
  pub stderr: String,
  pub duration: Duration,
}

impl BuildOutput {
  pub fn success(&self) -> bool {
    self.status.success()
  }
}

/// Lines of build stderr carried in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Last lines of stderr, on their own lines after the error headline.
fn stderr_tail(output: &BuildOutput) -> String {
  let lines: Vec<&str> = output.stderr.trim_end().lines().collect();
  if lines.is_empty() {
    return String::new();
  }
  let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
  let mut tail = String::new();
  for line in &lines[skip..] {
    tail.push_str("\n  ");
    tail.push_str(line);
  }
  tail
}

/// Expands `{script}`, `{env}` and `{version}` in a command template.
pub fn render_command(template: &str, environment: Environment, version: &Version) -> String {
  template
    .replace("{script}", environment.build_script())
    .replace("{env}", environment.id())
    .replace("{version}", &version.to_string())
}

/// Runs the build and waits for it to exit.
///
/// Returns the captured output for any exit status; deciding whether a failed
/// build stops the release is up to the caller.
pub async fn run_build(
  command: &str,
  project_dir: &Path,
  environment: Environment,
  version: &Version,
) -> Result<BuildOutput, BuildError> {
  info!(cmd = %command, env = %environment, version = %version, "starting build");

  let (shell_cmd, shell_args) = get_shell();
  let start = Instant::now();

  let output = Command::new(&shell_cmd)
    .args(&shell_args)
    .arg(command)
    .current_dir(project_dir)
    .env(VERSION_KEY, version.to_string())
    .env(ENV_KEY, environment.id())
    .output()
    .await
    .map_err(|source| BuildError::Spawn {
      cmd: command.to_string(),
      source,
    })?;

  let build = BuildOutput {
    command: command.to_string(),
    status: output.status,
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    duration: start.elapsed(),
  };

  debug!(code = ?build.status.code(), elapsed = ?build.duration, "build finished");
  if !build.stdout.is_empty() {
    debug!(stdout = %build.stdout.trim_end(), "build stdout");
  }

  Ok(build)
}

/// Shell binary and the flag that passes it a command string.
fn get_shell() -> (String, Vec<String>) {
  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn version() -> Version {
    "2.3.4".parse().unwrap()
  }

  #[test]
  fn renders_placeholders() {
    assert_eq!(
      render_command("npm run {script}", Environment::PreProd, &version()),
      "npm run build:preprod"
    );
    assert_eq!(
      render_command("make ENV={env} V={version}", Environment::Prod, &version()),
      "make ENV=prod V=2.3.4"
    );
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn exposes_version_and_env_to_command() {
    let temp = TempDir::new().unwrap();

    let output = run_build(
      "echo \"$REACT_APP_VERSION $REACT_APP_ENV\"",
      temp.path(),
      Environment::Stage,
      &version(),
    )
    .await
    .unwrap();

    assert!(output.success());
    assert_eq!(output.stdout.trim(), "2.3.4 stage");
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn captures_stderr_and_failure_status() {
    let temp = TempDir::new().unwrap();

    let output = run_build("echo boom >&2; exit 3", temp.path(), Environment::Prod, &version())
      .await
      .unwrap();

    assert!(!output.success());
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(output.stderr.trim(), "boom");
  }

  async fn failure(command: &str) -> BuildError {
    let temp = TempDir::new().unwrap();
    let output = run_build(command, temp.path(), Environment::Stage, &version())
      .await
      .unwrap();
    BuildError::Failed {
      cmd: command.to_string(),
      code: output.status.code(),
      output,
    }
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn failure_message_includes_stderr() {
    let err = failure("echo 'Module not found: lodash' >&2; exit 1").await;

    assert_eq!(
      err.to_string(),
      "build command exited with code Some(1): echo 'Module not found: lodash' >&2; exit 1\n  Module not found: lodash"
    );
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn failure_message_keeps_only_the_last_stderr_lines() {
    let err = failure("i=1; while [ $i -le 30 ]; do echo line$i >&2; i=$((i+1)); done; exit 1").await;
    let message = err.to_string();
    let lines: Vec<&str> = message.lines().map(str::trim).collect();

    assert_eq!(lines.len(), 1 + STDERR_TAIL_LINES);
    assert_eq!(lines[1], "line11");
    assert_eq!(lines.last(), Some(&"line30"));
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn silent_failure_has_a_single_line_message() {
    let err = failure("exit 4").await;
    assert_eq!(err.to_string(), "build command exited with code Some(4): exit 4");
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn runs_in_project_directory() {
    let temp = TempDir::new().unwrap();

    run_build("mkdir -p build && touch build/index.html", temp.path(), Environment::Stage, &version())
      .await
      .unwrap();

    assert!(temp.path().join("build/index.html").exists());
  }

  #[tokio::test]
  async fn missing_project_dir_fails_to_spawn() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("gone");

    let err = run_build("echo hi", &missing, Environment::Stage, &version()).await.unwrap_err();
    assert!(matches!(err, BuildError::Spawn { .. }));
  }
}
