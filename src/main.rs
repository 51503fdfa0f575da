//! Ucible - declarative UCI configuration management.
//!
//! This is the main entry point for the Ucible CLI.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ucible::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment files are loaded explicitly, before anything reads a
    // ${oc.env:...} reference.
    cli::env::load_dot_env();

    let cli = Cli::parse_args();

    init_logging(cli.verbosity());

    if cli.no_color {
        colored::control::set_override(false);
    }

    let outcome = match &cli.command {
        Commands::Preview(args) => args.execute(cli.no_color).await,
        Commands::Apply(args) => args.execute(cli.no_color).await,
        Commands::Validate(args) => args.execute(),
        Commands::Commands(args) => args.execute(),
        Commands::Import(args) => args.execute().await,
        Commands::Fleet(fleet) => fleet.execute(cli.no_color).await,
    };

    let exit_code = match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}
