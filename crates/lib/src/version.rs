//! Dotted release versions and the carry increment.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Highest value a component reaches before it rolls over.
const MAX_DIGIT: u32 = 9;

/// A dotted version such as `1.4.7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
  components: Vec<u32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
  #[error("version string is empty")]
  Empty,

  #[error("invalid version component '{component}' in '{input}'")]
  InvalidComponent { input: String, component: String },

  #[error("version {0} has no successor: a component would overflow")]
  Overflow(String),
}

impl Version {
  pub fn new(components: Vec<u32>) -> Result<Self, VersionError> {
    if components.is_empty() {
      return Err(VersionError::Empty);
    }
    Ok(Self { components })
  }

  pub fn components(&self) -> &[u32] {
    &self.components
  }

  /// Returns the next version.
  ///
  /// Components are scanned from least to most significant. A component at 9
  /// resets to 0 and carries; the first other component is incremented and the
  /// scan stops. When every component is 9 the result is all zeros.
  ///
  /// Fails when the component to increment is already `u32::MAX`.
  pub fn next(&self) -> Result<Version, VersionError> {
    let mut components = self.components.clone();
    for component in components.iter_mut().rev() {
      if *component == MAX_DIGIT {
        *component = 0;
      } else {
        *component = component
          .checked_add(1)
          .ok_or_else(|| VersionError::Overflow(self.to_string()))?;
        break;
      }
    }
    Ok(Version { components })
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, component) in self.components.iter().enumerate() {
      if i > 0 {
        f.write_str(".")?;
      }
      write!(f, "{}", component)?;
    }
    Ok(())
  }
}

impl FromStr for Version {
  type Err = VersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let input = s.trim();
    if input.is_empty() {
      return Err(VersionError::Empty);
    }

    let components = input
      .split('.')
      .map(|part| {
        // u32::from_str accepts a leading '+', which is not a version digit.
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
          return Err(VersionError::InvalidComponent {
            input: input.to_string(),
            component: part.to_string(),
          });
        }
        part.parse::<u32>().map_err(|_| VersionError::InvalidComponent {
          input: input.to_string(),
          component: part.to_string(),
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    Version::new(components)
  }
}
