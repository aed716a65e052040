//! logbridge entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use logbridge_cli::cli::Cli;
use logbridge_cli::commands;

fn main() {
    // Load .env if it exists (LOG_LEVEL, LOGBRIDGE_* overrides)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.tracing_level().to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = commands::execute(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
