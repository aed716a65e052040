//! Process manifests.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};

/// One process to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Display and logger name.
    pub name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Log file; defaults to `<logs-dir>/<name>.log`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl ProcessSpec {
    /// Creates a spec from a command line, naming it after the program when
    /// no name is given.
    pub fn from_command(name: Option<String>, command: Vec<String>) -> Self {
        let name = name.unwrap_or_else(|| {
            command
                .first()
                .and_then(|program| Path::new(program).file_stem())
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "process".to_string())
        });
        Self {
            name,
            command,
            log_file: None,
            env: BTreeMap::new(),
        }
    }

    /// Sets the log file.
    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    /// Log file for this process under `logs_dir`.
    pub fn log_path(&self, logs_dir: &Path) -> PathBuf {
        match &self.log_file {
            Some(path) => crate::cli::expand(path),
            None => logs_dir.join(format!("{}.log", self.name)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RunnerError::InvalidManifest("process name is empty".into()));
        }
        if self.command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(RunnerError::InvalidManifest(format!(
                "process '{}' has no command",
                self.name
            )));
        }
        Ok(())
    }
}

/// Parses a manifest from JSON text.
pub fn parse_manifest(json: &str, path: &Path) -> Result<Vec<ProcessSpec>> {
    let specs: Vec<ProcessSpec> =
        serde_json::from_str(json).map_err(|source| RunnerError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;

    if specs.is_empty() {
        return Err(RunnerError::InvalidManifest("no processes listed".into()));
    }
    let mut seen = HashSet::new();
    for spec in &specs {
        spec.validate()?;
        if !seen.insert(spec.name.as_str()) {
            return Err(RunnerError::InvalidManifest(format!(
                "duplicate process name '{}'",
                spec.name
            )));
        }
    }
    Ok(specs)
}

/// Loads a manifest file.
pub fn load_manifest(path: &Path) -> Result<Vec<ProcessSpec>> {
    let json = fs::read_to_string(path).map_err(|source| RunnerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&json, path)
}
