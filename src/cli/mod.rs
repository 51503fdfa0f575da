//! CLI module for Ucible.
//!
//! This module provides the command-line interface: argument parsing,
//! environment loading, and subcommand handling.

pub mod commands;
pub mod fleet_cmd;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Ucible - declarative configuration management for OpenWrt-style devices.
///
/// Desired state lives in YAML/JSON documents; Ucible diffs it against the
/// device's live UCI database and applies the minimal set of changes.
#[derive(Parser, Debug)]
#[command(name = "ucible")]
#[command(author = "Ucible Contributors")]
#[command(version)]
#[command(about = "Diff-driven UCI configuration management", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Preview configuration differences without applying
    Preview(commands::PreviewArgs),

    /// Apply configuration to a device
    Apply(commands::ApplyArgs),

    /// Validate a configuration file without connecting to a device
    Validate(commands::ValidateArgs),

    /// Print all UCI commands from a configuration file as a shell script
    Commands(commands::CommandsArgs),

    /// Import configuration from a device and save as YAML/JSON
    Import(commands::ImportArgs),

    /// Fleet operations across a device inventory
    #[command(subcommand)]
    Fleet(fleet_cmd::FleetCommands),
}

/// Connection flags shared by all single-device commands.
#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Device target: IP, hostname, user@host[:port], or serial port
    #[arg(env = "UCIBLE_TARGET")]
    pub target: String,

    /// SSH/login password
    #[arg(short = 'p', long, env = "UCIBLE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// SSH private key file
    #[arg(short = 'k', long, env = "UCIBLE_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(short = 't', long, default_value = "30", env = "UCIBLE_TIMEOUT")]
    pub timeout: u64,
}

impl ConnectArgs {
    /// Lowers the flags into transport connect options.
    pub fn connect_options(&self) -> crate::connection::ConnectOptions {
        crate::connection::ConnectOptions {
            username: "root".to_string(),
            password: self.password.clone(),
            key_file: self.key_file.clone(),
            timeout: std::time::Duration::from_secs(self.timeout),
        }
    }
}

/// Environment helpers for the CLI entry point.
///
/// The core never reads the environment directly except through the
/// document interpolation operator; loading `.env` is an explicit step
/// performed here at startup.
pub mod env {
    use std::path::Path;
    use tracing::debug;

    /// Loads `KEY=value` pairs from `.env` in the working directory into
    /// the process environment. Existing variables are not overwritten.
    pub fn load_dot_env() {
        load_dot_env_from(Path::new(".env"));
    }

    /// Loads a specific env file, ignoring comments and blank lines.
    pub fn load_dot_env_from(path: &Path) {
        let Ok(content) = std::fs::read_to_string(path) else {
            return;
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if std::env::var_os(key).is_none() {
                std::env::set_var(key, value);
            }
        }
        debug!(path = %path.display(), "Loaded environment file");
    }
}
