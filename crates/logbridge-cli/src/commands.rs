//! Command execution.

use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::debug;

use logbridge_core::{BridgeConfig, ProcessLogBridge};

use crate::cli::{expand, Cli, Commands};
use crate::error::{Result, RunnerError};
use crate::manifest::{load_manifest, ProcessSpec};
use crate::runner::{ProcessRunner, RunnerOptions};

/// Runs the parsed command line to completion.
pub fn execute(cli: Cli) -> Result<()> {
    let logs_dir = cli.logs_dir();
    fs::create_dir_all(&logs_dir).map_err(|source| RunnerError::Io {
        path: logs_dir.clone(),
        source,
    })?;

    let specs = match &cli.command {
        Commands::Run {
            name,
            log_file,
            command,
        } => vec![ProcessSpec::from_command(name.clone(), command.clone()).with_log_file(log_file.clone())],
        Commands::Up { manifest } => load_manifest(&expand(manifest))?,
    };

    let bridge = if cli.bridge_enabled() {
        let config = match &cli.config {
            Some(path) => BridgeConfig::from_json_file(&expand(path))?,
            None => BridgeConfig::default(),
        };
        let runner_log = cli.runner_log_path();
        Some(ProcessLogBridge::new(cli.bridge_level(), Some(&runner_log), config)?)
    } else {
        None
    };

    // Handlers only set the flag; supervise() does the killing.
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown)).map_err(RunnerError::Signal)?;
    }

    let mut runner = ProcessRunner::new(RunnerOptions { logs_dir }, bridge);
    for spec in &specs {
        if let Err(e) = runner.start_process(spec) {
            runner.stop_all();
            return Err(e);
        }
    }

    println!("\n{}\n", "=".repeat(50));
    println!("All processes now running.");
    println!("Press Ctrl+C to stop any running processes.");
    println!("\n{}\n", "=".repeat(50));

    runner.supervise(&shutdown)?;
    debug!(processes = runner.len(), "all processes finished");
    Ok(())
}
