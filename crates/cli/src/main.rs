use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shipwright_lib::environment::Environment;
use shipwright_lib::version::Version;
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

/// shipwright - version, build and ship front-end releases
#[derive(Parser)]
#[command(name = "shipwright")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (RUST_LOG takes precedence)
  #[arg(long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Bump the version, build and package a release
  Build {
    /// Target environment: stage, pre-prod or prod
    name: Environment,

    /// Propose this version instead of the next one
    #[arg(short = 'v', long = "version", value_name = "VERSION")]
    version_override: Option<Version>,

    /// Commit the version change with this message
    #[arg(short, long)]
    message: Option<String>,

    /// Project directory (default: current directory)
    #[arg(short = 'C', long, default_value = ".")]
    project_dir: PathBuf,
  },
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let result = match cli.command {
    Commands::Build {
      name,
      version_override,
      message,
      project_dir,
    } => cmd::cmd_build(name, version_override, message, project_dir),
  };

  if let Err(e) = result {
    output::print_error(format!("{:#}", e));
    std::process::exit(1);
  }
}

fn init_logging(verbose: bool) {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .init();
}
