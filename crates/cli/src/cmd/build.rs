//! Implementation of the `shipwright build` command.
//!
//! Runs the release pipeline for one environment and prints a summary of what
//! changed on disk.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use tracing::debug;

use shipwright_lib::config::ReleaseConfig;
use shipwright_lib::confirm::PromptConfirm;
use shipwright_lib::environment::Environment;
use shipwright_lib::pipeline::{DeliveryOutcome, ReleaseOptions, ReleaseOutcome, run_release};
use shipwright_lib::version::Version;

use crate::output::{
  ARROW, format_elapsed, format_size, print_field, print_note, print_success, print_sync, print_warning, short_digest,
};

/// Execute the build command.
///
/// Reads settings from the environment, runs the pipeline on a
/// single-threaded runtime with prompts on the terminal, and prints the
/// outcome.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the project directory
/// does not exist, or a fatal release stage fails.
pub fn cmd_build(
  environment: Environment,
  version_override: Option<Version>,
  message: Option<String>,
  project_dir: PathBuf,
) -> Result<()> {
  let config = ReleaseConfig::from_env().context("Invalid configuration")?;

  if !project_dir.is_dir() {
    bail!("Project directory not found: {}", project_dir.display());
  }

  let options = ReleaseOptions {
    project_dir,
    environment,
    version_override,
    commit_message: message,
  };

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;

  debug!(
    project = %options.project_dir.display(),
    env = %environment,
    build_command = %config.build_command,
    slack = config.slack.is_some(),
    "starting release"
  );

  let mut confirm = PromptConfirm::stdio();
  let outcome = rt
    .block_on(run_release(&options, &config, &mut confirm))
    .context("Release failed")?;

  print_summary(&outcome);
  Ok(())
}

fn print_summary(outcome: &ReleaseOutcome) {
  let ctx = &outcome.context;

  println!();
  if ctx.version_changed() {
    print_success(format!(
      "Release {} {} {} ({})",
      ctx.prior_version,
      ARROW,
      ctx.confirmed_version.green(),
      ctx.environment
    ));
  } else {
    print_note(format!("Release {} ({}), version unchanged", ctx.confirmed_version, ctx.environment));
  }

  for file in &outcome.sync.files {
    print_sync(file);
  }

  if let Some(commit) = &outcome.commit {
    print_field("Commit", commit);
  }
  print_field("Build", format_elapsed(outcome.build.duration));
  print_field("Archive", outcome.archive.path.display());
  print_field(
    "Size",
    format!("{} ({} files)", format_size(outcome.archive.bytes), outcome.archive.files),
  );
  print_field("SHA-256", short_digest(&outcome.archive.sha256));

  match &outcome.delivery {
    DeliveryOutcome::Delivered(delivery) => print_success(format!("Delivered to Slack: {}", delivery.permalink)),
    DeliveryOutcome::Failed(reason) => print_warning(format!("Slack delivery failed: {}", reason)),
    DeliveryOutcome::Declined => print_note("Slack delivery skipped"),
    DeliveryOutcome::NotConfigured => {}
  }
}
