pub const APP_NAME: &str = "shipwright";

/// Env file key holding the application version.
pub const VERSION_KEY: &str = "REACT_APP_VERSION";

/// Env file key holding the environment id the build was made for.
pub const ENV_KEY: &str = "REACT_APP_ENV";

pub const MANIFEST_PATH: &str = "public/manifest.json";
pub const PACKAGE_JSON_PATH: &str = "package.json";

pub const DEFAULT_BUILD_COMMAND: &str = "npm run {script}";
pub const DEFAULT_BUILD_DIR: &str = "build";
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Revision used in archive names when `git rev-parse` is unavailable.
pub const UNKNOWN_REVISION: &str = "unknown";
