//! Deployment environments.
//!
//! The set is fixed: each environment owns an env file named after its label
//! and an npm build script.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
  Stage,
  PreProd,
  Prod,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown environment '{0}' (expected one of: stage, pre-prod, prod)")]
pub struct UnknownEnvironment(pub String);

impl Environment {
  pub const ALL: [Environment; 3] = [Environment::Stage, Environment::PreProd, Environment::Prod];

  /// Short name used on the command line and in archive names.
  pub fn id(self) -> &'static str {
    match self {
      Environment::Stage => "stage",
      Environment::PreProd => "pre-prod",
      Environment::Prod => "prod",
    }
  }

  /// Long-form label, also the suffix of the env file.
  pub fn label(self) -> &'static str {
    match self {
      Environment::Stage => "development",
      Environment::PreProd => "preproduction",
      Environment::Prod => "production",
    }
  }

  /// npm script name for this environment.
  pub fn build_script(self) -> &'static str {
    match self {
      Environment::Stage => "build:stage",
      Environment::PreProd => "build:preprod",
      Environment::Prod => "build:prod",
    }
  }

  pub fn env_file_name(self) -> String {
    format!(".env.{}", self.label())
  }

  pub fn env_file_path(self, project_dir: &Path) -> PathBuf {
    project_dir.join(self.env_file_name())
  }
}

impl fmt::Display for Environment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.id())
  }
}

impl FromStr for Environment {
  type Err = UnknownEnvironment;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Environment::ALL
      .into_iter()
      .find(|env| env.id() == s)
      .ok_or_else(|| UnknownEnvironment(s.to_string()))
  }
}
