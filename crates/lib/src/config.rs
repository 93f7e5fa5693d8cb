//! Out-of-band settings read from the process environment.
//!
//! Credentials and recipients are never compiled in; delivery is only enabled
//! when both the Slack token and recipient are provided.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::consts::{DEFAULT_BUILD_COMMAND, DEFAULT_BUILD_DIR, DEFAULT_SLACK_API_URL};

pub const BUILD_COMMAND_VAR: &str = "SHIPWRIGHT_BUILD_COMMAND";
pub const BUILD_DIR_VAR: &str = "SHIPWRIGHT_BUILD_DIR";
pub const SLACK_TOKEN_VAR: &str = "SHIPWRIGHT_SLACK_TOKEN";
pub const SLACK_RECIPIENT_VAR: &str = "SHIPWRIGHT_SLACK_RECIPIENT";
pub const SLACK_API_URL_VAR: &str = "SHIPWRIGHT_SLACK_API_URL";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("{present} is set but {missing} is not; set both to enable delivery")]
  IncompleteSlack {
    present: &'static str,
    missing: &'static str,
  },

  #[error("{var} must not be empty")]
  Empty { var: &'static str },
}

#[derive(Clone, PartialEq, Eq)]
pub struct SlackConfig {
  pub token: String,
  pub recipient: String,
  pub api_url: String,
}

impl fmt::Debug for SlackConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SlackConfig")
      .field("token", &"<redacted>")
      .field("recipient", &self.recipient)
      .field("api_url", &self.api_url)
      .finish()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseConfig {
  /// Build command template. `{script}`, `{env}` and `{version}` are substituted.
  pub build_command: String,
  /// Build output directory, relative to the project directory.
  pub build_dir: PathBuf,
  pub slack: Option<SlackConfig>,
}

impl Default for ReleaseConfig {
  fn default() -> Self {
    Self {
      build_command: DEFAULT_BUILD_COMMAND.to_string(),
      build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
      slack: None,
    }
  }
}

impl ReleaseConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Resolves the config from an arbitrary variable source.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = ReleaseConfig::default();

    if let Some(command) = lookup(BUILD_COMMAND_VAR) {
      if command.trim().is_empty() {
        return Err(ConfigError::Empty { var: BUILD_COMMAND_VAR });
      }
      config.build_command = command;
    }

    if let Some(dir) = lookup(BUILD_DIR_VAR) {
      if dir.trim().is_empty() {
        return Err(ConfigError::Empty { var: BUILD_DIR_VAR });
      }
      config.build_dir = PathBuf::from(dir);
    }

    let token = lookup(SLACK_TOKEN_VAR).filter(|v| !v.is_empty());
    let recipient = lookup(SLACK_RECIPIENT_VAR).filter(|v| !v.is_empty());

    config.slack = match (token, recipient) {
      (Some(token), Some(recipient)) => Some(SlackConfig {
        token,
        recipient,
        api_url: lookup(SLACK_API_URL_VAR)
          .filter(|v| !v.is_empty())
          .unwrap_or_else(|| DEFAULT_SLACK_API_URL.to_string()),
      }),
      (Some(_), None) => {
        return Err(ConfigError::IncompleteSlack {
          present: SLACK_TOKEN_VAR,
          missing: SLACK_RECIPIENT_VAR,
        });
      }
      (None, Some(_)) => {
        return Err(ConfigError::IncompleteSlack {
          present: SLACK_RECIPIENT_VAR,
          missing: SLACK_TOKEN_VAR,
        });
      }
      (None, None) => None,
    };

    Ok(config)
  }
}
