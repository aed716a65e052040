//! Command-line interface definition using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use logbridge_core::Level;

/// Build version string with git hash and build date.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    // Format: "0.3.0 (abc1234, 2026-01-29)"
    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// logbridge - run processes and pretty-print their logs
#[derive(Parser, Debug)]
#[command(name = "logbridge")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose runner diagnostics (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory for per-process log files
    #[arg(long, env = "LOGBRIDGE_LOGS_DIR", default_value = "logs", global = true)]
    pub logs_dir: PathBuf,

    /// Minimum level shown on the console (debug, info, warning, error, critical)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Route output through the log bridge
    #[arg(
        long,
        env = "LOGBRIDGE_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new(),
        global = true
    )]
    pub bridge: bool,

    /// Stream raw `name: line` output instead of using the bridge
    #[arg(long, global = true)]
    pub no_bridge: bool,

    /// JSON file with bridge configuration overrides
    #[arg(long, env = "LOGBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Runner log file (default: <logs-dir>/runner.log)
    #[arg(long, global = true)]
    pub runner_log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single command
    Run {
        /// Process name (default: program file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Log file (default: <logs-dir>/<name>.log)
        #[arg(short = 'f', long)]
        log_file: Option<PathBuf>,

        /// Command and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run every process listed in a manifest
    Up {
        /// JSON manifest: [{"name", "command": [..], "log_file"?, "env"?}]
        #[arg(required = true)]
        manifest: PathBuf,
    },
}

impl Cli {
    /// Whether output goes through the log bridge.
    pub fn bridge_enabled(&self) -> bool {
        self.bridge && !self.no_bridge
    }

    /// Console level for bridged output. Unknown names fall back to info.
    pub fn bridge_level(&self) -> Level {
        Level::parse_or_info(&self.log_level)
    }

    /// Logs directory with `~` expanded.
    pub fn logs_dir(&self) -> PathBuf {
        expand(&self.logs_dir)
    }

    /// Runner log path, defaulting to `runner.log` in the logs directory.
    pub fn runner_log_path(&self) -> PathBuf {
        self.runner_log
            .as_ref()
            .map(|p| expand(p))
            .unwrap_or_else(|| self.logs_dir().join("runner.log"))
    }

    /// Returns the runner's own tracing level based on verbosity.
    pub fn tracing_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

/// Expands a leading `~` in a path.
pub fn expand(path: &std::path::Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["logbridge", "run", "--name", "api", "--", "python3", "-u", "server.py"]);
        match cli.command {
            Commands::Run { name, command, log_file } => {
                assert_eq!(name.as_deref(), Some("api"));
                assert_eq!(command, vec!["python3", "-u", "server.py"]);
                assert!(log_file.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_up() {
        let cli = Cli::parse_from(["logbridge", "--logs-dir", "/tmp/l", "up", "procs.json"]);
        match &cli.command {
            Commands::Up { manifest } => assert_eq!(manifest, &PathBuf::from("procs.json")),
            _ => panic!("Expected Up command"),
        }
        assert_eq!(cli.runner_log_path(), PathBuf::from("/tmp/l/runner.log"));
    }

    #[test]
    fn test_bridge_switches() {
        let cli = Cli::parse_from(["logbridge", "up", "m.json", "--no-bridge"]);
        assert!(!cli.bridge_enabled());

        let cli = Cli::parse_from(["logbridge", "--bridge", "false", "up", "m.json"]);
        assert!(!cli.bridge_enabled());

        let cli = Cli::parse_from(["logbridge", "--bridge", "yes", "up", "m.json"]);
        assert!(cli.bridge_enabled());
    }

    #[test]
    fn test_log_level_fallback() {
        let cli = Cli::parse_from(["logbridge", "--log-level", "WARN", "up", "m.json"]);
        assert_eq!(cli.bridge_level(), Level::Warning);

        let cli = Cli::parse_from(["logbridge", "--log-level", "loud", "up", "m.json"]);
        assert_eq!(cli.bridge_level(), Level::Info);
    }

    #[test]
    fn test_cli_verbose() {
        let cli = Cli::parse_from(["logbridge", "-vvv", "up", "m.json"]);
        assert_eq!(cli.verbose, 3);
        assert_eq!(cli.tracing_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_cli_help() {
        Cli::command().debug_assert();
    }
}
