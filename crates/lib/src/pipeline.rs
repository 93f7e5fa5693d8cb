//! The release pipeline.
//!
//! Stages run strictly in order, each one awaited before the next starts:
//!
//! 1. read the prior version from the environment's env file
//! 2. propose the next version and ask the operator to confirm it
//! 3. write the agreed version into the metadata files
//! 4. commit, when a commit message was given
//! 5. run the build command
//! 6. zip the build output
//! 7. ask whether to deliver the archive, and deliver it
//!
//! Metadata writes and delivery are best effort. Everything else stops the
//! release with a [`ReleaseError`].

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::archive::{self, ArchiveError, ArchiveSummary};
use crate::build::{self, BuildError, BuildOutput};
use crate::config::ReleaseConfig;
use crate::confirm::Confirm;
use crate::consts::{UNKNOWN_REVISION, VERSION_KEY};
use crate::delivery::{Delivery, SlackClient};
use crate::environment::Environment;
use crate::git::{self, GitError};
use crate::metadata::{self, SyncReport, envfile, json};
use crate::version::{Version, VersionError};

#[derive(Debug, Error)]
pub enum ReleaseError {
  #[error("environment file not found: {0}")]
  EnvFileMissing(PathBuf),

  #[error("failed to read environment file {path}: {source}")]
  EnvFileRead {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{key} is not set in {path}")]
  VersionKeyMissing { key: &'static str, path: PathBuf },

  #[error("invalid version in {path}: {source}")]
  InvalidVersion {
    path: PathBuf,
    #[source]
    source: VersionError,
  },

  #[error("failed to read operator answer: {0}")]
  Prompt(#[source] io::Error),

  #[error("commit failed: {0}")]
  Commit(#[from] GitError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error("packaging failed: {0}")]
  Package(#[from] ArchiveError),
}

/// What the operator asked for on the command line.
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
  pub project_dir: PathBuf,
  pub environment: Environment,
  /// Proposed instead of the computed next version.
  pub version_override: Option<Version>,
  pub commit_message: Option<String>,
}

/// State threaded through one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseContext {
  pub environment: Environment,
  pub prior_version: Version,
  pub proposed_version: Version,
  pub confirmed_version: Version,
  pub commit_message: Option<String>,
  pub revision: Option<String>,
  pub artifact_path: Option<PathBuf>,
}

impl ReleaseContext {
  fn new(environment: Environment, prior: Version, proposed: Version, commit_message: Option<String>) -> Self {
    Self {
      environment,
      confirmed_version: prior.clone(),
      prior_version: prior,
      proposed_version: proposed,
      commit_message,
      revision: None,
      artifact_path: None,
    }
  }

  pub fn version_changed(&self) -> bool {
    self.confirmed_version != self.prior_version
  }
}

#[derive(Debug)]
pub enum DeliveryOutcome {
  /// No Slack credentials were configured.
  NotConfigured,
  Declined,
  Delivered(Delivery),
  /// Delivery was attempted and failed; the archive is still on disk.
  Failed(String),
}

#[derive(Debug)]
pub struct ReleaseOutcome {
  pub context: ReleaseContext,
  pub sync: SyncReport,
  /// Full commit message, when a commit was made.
  pub commit: Option<String>,
  pub build: BuildOutput,
  pub archive: ArchiveSummary,
  pub delivery: DeliveryOutcome,
}

/// Runs one release from version proposal to delivery.
pub async fn run_release<C>(
  options: &ReleaseOptions,
  config: &ReleaseConfig,
  confirm: &mut C,
) -> Result<ReleaseOutcome, ReleaseError>
where
  C: Confirm + ?Sized,
{
  let project_dir = options.project_dir.as_path();
  let environment = options.environment;
  let env_file = environment.env_file_path(project_dir);

  let prior = load_prior_version(&env_file)?;
  let proposed = match &options.version_override {
    Some(version) => version.clone(),
    None => prior.next().map_err(|source| ReleaseError::InvalidVersion {
      path: env_file.clone(),
      source,
    })?,
  };
  let mut ctx = ReleaseContext::new(environment, prior, proposed, options.commit_message.clone());

  let prompt = format!(
    "Current version is {}. Upgrade to {}?",
    ctx.prior_version, ctx.proposed_version
  );
  if confirm.confirm(&prompt).map_err(ReleaseError::Prompt)? {
    ctx.confirmed_version = ctx.proposed_version.clone();
  } else {
    info!(version = %ctx.prior_version, "upgrade declined, keeping current version");
  }

  warn_on_drift(project_dir, &ctx.prior_version);
  let targets = metadata::release_targets(project_dir, environment);
  let sync = metadata::sync_metadata(&targets, &ctx.confirmed_version, environment);
  info!(
    updated = sync.updated(),
    failed = sync.failed(),
    total = sync.files.len(),
    "metadata synchronized"
  );

  let commit = match ctx.commit_message.as_deref() {
    Some(message) => Some(git::commit_release(project_dir, &ctx.confirmed_version, message).await?),
    None => None,
  };

  let command = build::render_command(&config.build_command, environment, &ctx.confirmed_version);
  let build_output = build::run_build(&command, project_dir, environment, &ctx.confirmed_version).await?;
  if !build_output.success() {
    return Err(ReleaseError::Build(BuildError::Failed {
      cmd: command,
      code: build_output.status.code(),
      output: build_output,
    }));
  }
  if !build_output.stderr.trim().is_empty() {
    warn!(stderr = %build_output.stderr.trim_end(), "build wrote to stderr");
  }

  let revision = match git::short_revision(project_dir).await {
    Ok(rev) => rev,
    Err(e) => {
      warn!(error = %e, "could not determine revision, using '{}'", UNKNOWN_REVISION);
      UNKNOWN_REVISION.to_string()
    }
  };
  ctx.revision = Some(revision.clone());

  let archive_name = archive::archive_file_name(environment, &ctx.confirmed_version, &revision);
  let archive_path = project_dir.join(&archive_name);
  let archive = archive::package(project_dir.join(&config.build_dir), archive_path.clone()).await?;
  ctx.artifact_path = Some(archive_path);

  let delivery = deliver(config, confirm, &archive.path, &archive_name).await;

  Ok(ReleaseOutcome {
    context: ctx,
    sync,
    commit,
    build: build_output,
    archive,
    delivery,
  })
}

fn load_prior_version(env_file: &Path) -> Result<Version, ReleaseError> {
  if !env_file.is_file() {
    return Err(ReleaseError::EnvFileMissing(env_file.to_path_buf()));
  }

  let raw = envfile::read_value(env_file, VERSION_KEY)
    .map_err(|source| ReleaseError::EnvFileRead {
      path: env_file.to_path_buf(),
      source,
    })?
    .filter(|v| !v.is_empty())
    .ok_or_else(|| ReleaseError::VersionKeyMissing {
      key: VERSION_KEY,
      path: env_file.to_path_buf(),
    })?;

  raw.parse().map_err(|source| ReleaseError::InvalidVersion {
    path: env_file.to_path_buf(),
    source,
  })
}

/// Logs when the manifest disagrees with the env file before it is overwritten.
fn warn_on_drift(project_dir: &Path, prior: &Version) {
  let manifest = project_dir.join(crate::consts::MANIFEST_PATH);
  let Ok(content) = std::fs::read_to_string(&manifest) else {
    return;
  };
  if let Some(found) = json::find_version(&content) {
    if found != prior.to_string() {
      warn!(
        path = %manifest.display(),
        manifest = %found,
        env = %prior,
        "manifest version differs from env file"
      );
    }
  }
}

async fn deliver<C>(
  config: &ReleaseConfig,
  confirm: &mut C,
  archive_path: &Path,
  archive_name: &str,
) -> DeliveryOutcome
where
  C: Confirm + ?Sized,
{
  let Some(slack) = &config.slack else {
    info!("Slack delivery not configured, skipping");
    return DeliveryOutcome::NotConfigured;
  };

  let prompt = format!("Send {} to Slack?", archive_name);
  match confirm.confirm(&prompt) {
    Ok(true) => {}
    Ok(false) => return DeliveryOutcome::Declined,
    Err(e) => {
      warn!(error = %e, "could not read delivery answer, not sending");
      return DeliveryOutcome::Failed(format!("failed to read operator answer: {}", e));
    }
  }

  let result = match SlackClient::new(slack) {
    Ok(client) => client.deliver(&slack.recipient, archive_path, archive_name).await,
    Err(e) => Err(e),
  };
  match result {
    Ok(delivery) => DeliveryOutcome::Delivered(delivery),
    Err(e) => {
      warn!(error = %e, recipient = %slack.recipient, "failed to deliver archive");
      DeliveryOutcome::Failed(e.to_string())
    }
  }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
  use super::*;
  use crate::config::SlackConfig;
  use crate::confirm::ScriptedConfirm;
  use crate::consts::{MANIFEST_PATH, PACKAGE_JSON_PATH};
  use crate::delivery::testutil::{TOKEN, mock_successful_delivery};
  use crate::git::testutil::{head_message, init_repo};
  use mockito::{Matcher, Server};
  use std::fs;
  use tempfile::TempDir;

  const BUILD_CMD: &str = "mkdir -p build && printf '%s' \"$REACT_APP_VERSION\" > build/version.txt";

  struct Project {
    temp: TempDir,
  }

  impl Project {
    fn new(manifest_version: &str) -> Self {
      let temp = TempDir::new().unwrap();
      let root = temp.path();
      fs::create_dir_all(root.join("public")).unwrap();
      fs::write(
        root.join(MANIFEST_PATH),
        format!("{{\n  \"name\": \"app\",\n  \"version\": \"{}\"\n}}\n", manifest_version),
      )
      .unwrap();
      fs::write(
        root.join(PACKAGE_JSON_PATH),
        "{\n  \"name\": \"app\",\n  \"version\": \"1.4.7\",\n  \"private\": true\n}\n",
      )
      .unwrap();
      fs::write(root.join(".env.development"), "PUBLIC_URL=/\nREACT_APP_VERSION=1.4.7\n").unwrap();
      Self { temp }
    }

    fn path(&self) -> &Path {
      self.temp.path()
    }

    fn read(&self, rel: &str) -> String {
      fs::read_to_string(self.path().join(rel)).unwrap()
    }

    fn options(&self) -> ReleaseOptions {
      ReleaseOptions {
        project_dir: self.path().to_path_buf(),
        environment: Environment::Stage,
        version_override: None,
        commit_message: None,
      }
    }

    fn zips(&self) -> Vec<String> {
      let mut names: Vec<String> = fs::read_dir(self.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".zip"))
        .collect();
      names.sort();
      names
    }
  }

  fn config(build_command: &str) -> ReleaseConfig {
    ReleaseConfig {
      build_command: build_command.to_string(),
      ..ReleaseConfig::default()
    }
  }

  fn slack_config(url: String) -> ReleaseConfig {
    ReleaseConfig {
      slack: Some(SlackConfig {
        token: TOKEN.to_string(),
        recipient: "U0TEST".to_string(),
        api_url: url,
      }),
      ..config(BUILD_CMD)
    }
  }

  #[tokio::test]
  async fn confirmed_release_propagates_version_everywhere() {
    let project = Project::new("1.4.7");
    init_repo(project.path());
    let mut options = project.options();
    options.commit_message = Some("checkout fixes".to_string());
    let mut confirm = ScriptedConfirm::new([true]);

    let outcome = run_release(&options, &config(BUILD_CMD), &mut confirm).await.unwrap();

    let ctx = &outcome.context;
    assert_eq!(ctx.prior_version.to_string(), "1.4.7");
    assert_eq!(ctx.confirmed_version.to_string(), "1.4.8");
    assert!(ctx.version_changed());

    assert!(project.read(MANIFEST_PATH).contains("\"version\": \"1.4.8\""));
    assert!(project.read(PACKAGE_JSON_PATH).contains("\"version\": \"1.4.8\""));
    assert_eq!(
      project.read(".env.development"),
      "PUBLIC_URL=/\nREACT_APP_VERSION=1.4.8\nREACT_APP_ENV=stage\n"
    );

    assert_eq!(outcome.commit.as_deref(), Some("v1.4.8 - checkout fixes"));
    assert_eq!(head_message(project.path()), "v1.4.8 - checkout fixes");

    let revision = ctx.revision.clone().unwrap();
    assert_ne!(revision, UNKNOWN_REVISION);
    let expected = format!("build_stage_1.4.8_{}.zip", revision);
    assert_eq!(project.zips(), vec![expected.clone()]);
    assert_eq!(ctx.artifact_path, Some(project.path().join(&expected)));
    assert_eq!(project.read("build/version.txt"), "1.4.8");
    assert_eq!(outcome.archive.files, 1);
    assert!(matches!(outcome.delivery, DeliveryOutcome::NotConfigured));
  }

  #[tokio::test]
  async fn declined_upgrade_keeps_prior_version_in_every_file() {
    let project = Project::new("1.4.6");
    let mut confirm = ScriptedConfirm::new([false]);

    let outcome = run_release(&project.options(), &config(BUILD_CMD), &mut confirm)
      .await
      .unwrap();

    assert_eq!(outcome.context.proposed_version.to_string(), "1.4.8");
    assert_eq!(outcome.context.confirmed_version.to_string(), "1.4.7");
    assert!(!outcome.context.version_changed());

    for file in [MANIFEST_PATH, PACKAGE_JSON_PATH, ".env.development"] {
      let content = project.read(file);
      assert!(content.contains("1.4.7"), "{} should hold the prior version", file);
      assert!(!content.contains("1.4.8"), "{} must not hold the rejected version", file);
    }
    assert_eq!(project.read("build/version.txt"), "1.4.7");
    assert_eq!(project.zips(), vec!["build_stage_1.4.7_unknown.zip".to_string()]);
  }

  #[tokio::test]
  async fn version_override_replaces_proposal() {
    let project = Project::new("1.4.7");
    let mut options = project.options();
    options.version_override = Some("2.0.0".parse().unwrap());
    let mut confirm = ScriptedConfirm::new([true]);

    let outcome = run_release(&options, &config(BUILD_CMD), &mut confirm).await.unwrap();

    assert_eq!(outcome.context.confirmed_version.to_string(), "2.0.0");
    assert_eq!(confirm.prompts()[0], "Current version is 1.4.7. Upgrade to 2.0.0?");
    assert!(project.read(".env.development").contains("REACT_APP_VERSION=2.0.0"));
  }

  #[tokio::test]
  async fn missing_env_file_stops_before_any_change() {
    let project = Project::new("1.4.7");
    fs::remove_file(project.path().join(".env.development")).unwrap();
    let mut confirm = ScriptedConfirm::new([true]);

    let err = run_release(&project.options(), &config(BUILD_CMD), &mut confirm)
      .await
      .unwrap_err();

    assert!(matches!(err, ReleaseError::EnvFileMissing(_)));
    assert!(confirm.prompts().is_empty());
    assert!(project.read(MANIFEST_PATH).contains("1.4.7"));
    assert!(!project.path().join("build").exists());
  }

  #[tokio::test]
  async fn version_without_successor_is_fatal() {
    let project = Project::new("1.4.7");
    fs::write(
      project.path().join(".env.development"),
      "REACT_APP_VERSION=1.2.4294967295\n",
    )
    .unwrap();
    let mut confirm = ScriptedConfirm::new([true]);

    let err = run_release(&project.options(), &config(BUILD_CMD), &mut confirm)
      .await
      .unwrap_err();

    assert!(matches!(
      err,
      ReleaseError::InvalidVersion { source: VersionError::Overflow(_), .. }
    ));
    assert!(confirm.prompts().is_empty());
  }

  #[tokio::test]
  async fn missing_version_key_is_fatal() {
    let project = Project::new("1.4.7");
    fs::write(project.path().join(".env.development"), "PUBLIC_URL=/\n").unwrap();
    let mut confirm = ScriptedConfirm::new([true]);

    let err = run_release(&project.options(), &config(BUILD_CMD), &mut confirm)
      .await
      .unwrap_err();

    assert!(matches!(err, ReleaseError::VersionKeyMissing { key: VERSION_KEY, .. }));
  }

  #[tokio::test]
  async fn commit_failure_aborts_before_build() {
    let project = Project::new("1.4.7");
    let mut options = project.options();
    options.commit_message = Some("no repo here".to_string());
    let mut confirm = ScriptedConfirm::new([true]);

    let err = run_release(&options, &config(BUILD_CMD), &mut confirm).await.unwrap_err();

    assert!(matches!(err, ReleaseError::Commit(_)));
    assert!(!project.path().join("build").exists());
    assert!(project.zips().is_empty());
  }

  #[tokio::test]
  async fn failed_build_is_not_packaged() {
    let project = Project::new("1.4.7");
    let mut confirm = ScriptedConfirm::new([true]);

    let err = run_release(
      &project.options(),
      &config("mkdir -p build && echo broken >&2 && exit 2"),
      &mut confirm,
    )
    .await
    .unwrap_err();

    assert!(err.to_string().ends_with("\n  broken"));
    match err {
      ReleaseError::Build(BuildError::Failed { code, output, .. }) => {
        assert_eq!(code, Some(2));
        assert_eq!(output.stderr.trim(), "broken");
      }
      other => panic!("unexpected error: {other}"),
    }
    assert!(project.zips().is_empty());
  }

  #[tokio::test]
  async fn packaging_failure_never_reaches_delivery() {
    let project = Project::new("1.4.7");
    let mut server = Server::new_async().await;
    let post = server.mock("POST", Matcher::Any).expect(0).create_async().await;
    let get = server.mock("GET", Matcher::Any).expect(0).create_async().await;
    let mut confirm = ScriptedConfirm::new([true, true]);
    let config = ReleaseConfig {
      build_command: "true".to_string(),
      ..slack_config(server.url())
    };

    let err = run_release(&project.options(), &config, &mut confirm).await.unwrap_err();

    assert!(matches!(err, ReleaseError::Package(ArchiveError::SourceMissing(_))));
    assert_eq!(confirm.prompts().len(), 1);
    post.assert_async().await;
    get.assert_async().await;
  }

  #[tokio::test]
  async fn delivers_archive_when_confirmed() {
    let project = Project::new("1.4.7");
    let mut server = Server::new_async().await;
    let mocks = mock_successful_delivery(&mut server, "build_stage_1.4.8_unknown.zip").await;
    let mut confirm = ScriptedConfirm::new([true, true]);

    let outcome = run_release(&project.options(), &slack_config(server.url()), &mut confirm)
      .await
      .unwrap();

    assert_eq!(confirm.prompts()[1], "Send build_stage_1.4.8_unknown.zip to Slack?");
    match outcome.delivery {
      DeliveryOutcome::Delivered(delivery) => assert_eq!(delivery.channel, "D0DM"),
      other => panic!("unexpected delivery outcome: {:?}", other),
    }
    for mock in mocks {
      mock.assert_async().await;
    }
  }

  #[tokio::test]
  async fn declined_delivery_sends_nothing() {
    let project = Project::new("1.4.7");
    let mut server = Server::new_async().await;
    let any = server.mock("POST", Matcher::Any).expect(0).create_async().await;
    let mut confirm = ScriptedConfirm::new([true, false]);

    let outcome = run_release(&project.options(), &slack_config(server.url()), &mut confirm)
      .await
      .unwrap();

    assert!(matches!(outcome.delivery, DeliveryOutcome::Declined));
    any.assert_async().await;
  }

  /// Accepts the first prompt, then fails to read any further answer.
  struct ClosedAfterFirst {
    asked: usize,
  }

  impl Confirm for ClosedAfterFirst {
    fn confirm(&mut self, _prompt: &str) -> io::Result<bool> {
      self.asked += 1;
      if self.asked == 1 {
        Ok(true)
      } else {
        Err(io::Error::new(io::ErrorKind::InvalidData, "unreadable answer"))
      }
    }
  }

  #[tokio::test]
  async fn unreadable_delivery_answer_keeps_the_release() {
    let project = Project::new("1.4.7");
    let mut server = Server::new_async().await;
    let any = server.mock("POST", Matcher::Any).expect(0).create_async().await;
    let mut confirm = ClosedAfterFirst { asked: 0 };

    let outcome = run_release(&project.options(), &slack_config(server.url()), &mut confirm)
      .await
      .unwrap();

    assert_eq!(confirm.asked, 2);
    match outcome.delivery {
      DeliveryOutcome::Failed(reason) => assert!(reason.contains("unreadable answer")),
      other => panic!("unexpected delivery outcome: {:?}", other),
    }
    assert!(outcome.archive.path.exists());
    any.assert_async().await;
  }

  #[tokio::test]
  async fn delivery_failure_does_not_fail_release() {
    let project = Project::new("1.4.7");
    let mut server = Server::new_async().await;
    let _open = server
      .mock("POST", "/conversations.open")
      .with_status(503)
      .create_async()
      .await;
    let mut confirm = ScriptedConfirm::new([true, true]);

    let outcome = run_release(&project.options(), &slack_config(server.url()), &mut confirm)
      .await
      .unwrap();

    assert!(matches!(outcome.delivery, DeliveryOutcome::Failed(_)));
    assert!(outcome.archive.path.exists());
  }
}
