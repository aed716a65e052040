//! Bridge configuration.
//!
//! Every field has a default, so an override document only needs the keys
//! it changes:
//!
//! ```json
//! {
//!   "theme": { "logging.time": "#34d399", "logging.level.error": "bold red" },
//!   "time_style_key": "logging.time",
//!   "rich": { "show_time": true, "show_path": false },
//!   "file": { "when": "midnight", "backupCount": 10 }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Default format for the combined rotating log file.
pub const DEFAULT_FILE_FORMAT: &str =
    "%(asctime)s | %(levelname)-8s | %(name)s:%(funcName)s:%(lineno)d - %(message)s";

/// Console display flags.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsoleOptions {
    /// Print a timestamp column.
    pub show_time: bool,
    /// Print the level column.
    pub show_level: bool,
    /// Append the emitting function and line.
    pub show_path: bool,
    /// Blank the timestamp when it equals the previous one.
    pub omit_repeated_times: bool,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            show_time: true,
            show_level: true,
            show_path: false,
            omit_repeated_times: false,
        }
    }
}

/// Settings for the combined rotating log file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    /// Rotation boundary: `S`, `M`, `H`, `D`, `midnight` or `W0`..`W6`.
    pub when: String,
    /// Number of rotated files to keep. A `file` section that omits it
    /// keeps 7; without a `file` section the default is 10.
    #[serde(
        rename = "backupCount",
        alias = "backup_count",
        default = "default_section_backup_count"
    )]
    pub backup_count: usize,
    /// Line format.
    pub fmt: String,
    /// File encoding; only UTF-8 is supported.
    pub encoding: String,
}

fn default_section_backup_count() -> usize {
    7
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            when: "midnight".to_string(),
            backup_count: 10,
            fmt: DEFAULT_FILE_FORMAT.to_string(),
            encoding: "utf-8".to_string(),
        }
    }
}

/// Configuration for the bridge's console and file output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Style overrides by theme key, merged over the built-in theme.
    pub theme: BTreeMap<String, String>,
    /// Theme key used to style the timestamp column.
    pub time_style_key: String,
    /// Console display flags.
    #[serde(alias = "rich")]
    pub console: ConsoleOptions,
    /// Rotating file settings.
    pub file: FileOptions,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut theme = BTreeMap::new();
        theme.insert("logging.time".to_string(), "bright_cyan".to_string());
        theme.insert("logging.level.error".to_string(), "bold red".to_string());
        Self {
            theme,
            time_style_key: "logging.time".to_string(),
            console: ConsoleOptions::default(),
            file: FileOptions::default(),
        }
    }
}

impl BridgeConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an override document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads an override document from disk.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|source| BridgeError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    /// Sets a theme style.
    pub fn with_theme_style(mut self, key: impl Into<String>, style: impl Into<String>) -> Self {
        self.theme.insert(key.into(), style.into());
        self
    }

    /// Sets which theme key styles the timestamp.
    pub fn with_time_style_key(mut self, key: impl Into<String>) -> Self {
        self.time_style_key = key.into();
        self
    }

    /// Sets the console display flags.
    pub fn with_console(mut self, console: ConsoleOptions) -> Self {
        self.console = console;
        self
    }

    /// Sets the rotation boundary.
    pub fn with_rotation(mut self, when: impl Into<String>) -> Self {
        self.file.when = when.into();
        self
    }

    /// Sets the number of rotated files to keep.
    pub fn with_backup_count(mut self, count: usize) -> Self {
        self.file.backup_count = count;
        self
    }

    /// Sets the file line format.
    pub fn with_file_format(mut self, fmt: impl Into<String>) -> Self {
        self.file.fmt = fmt.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();

        assert_eq!(config.time_style_key, "logging.time");
        assert_eq!(config.theme["logging.time"], "bright_cyan");
        assert!(config.console.show_time);
        assert!(!config.console.show_path);
        assert_eq!(config.file.when, "midnight");
        assert_eq!(config.file.backup_count, 10);
        assert_eq!(config.file.encoding, "utf-8");
        assert_eq!(config.file.fmt, DEFAULT_FILE_FORMAT);
    }

    #[test]
    fn test_override_document() {
        let config = BridgeConfig::from_json_str(
            r##"{
                "theme": {"logging.time": "#34d399"},
                "rich": {"show_path": true},
                "file": {"when": "H", "backupCount": 3}
            }"##,
        )
        .unwrap();

        assert_eq!(config.theme.len(), 1);
        assert_eq!(config.theme["logging.time"], "#34d399");
        assert!(config.console.show_path);
        assert!(config.console.show_time);
        assert_eq!(config.file.when, "H");
        assert_eq!(config.file.backup_count, 3);
        assert_eq!(config.file.fmt, DEFAULT_FILE_FORMAT);
        assert_eq!(config.time_style_key, "logging.time");
    }

    #[test]
    fn test_file_section_without_backup_count() {
        let config = BridgeConfig::from_json_str(r#"{"file": {"when": "D"}}"#).unwrap();
        assert_eq!(config.file.backup_count, 7);
        assert_eq!(config.file.when, "D");

        let config = BridgeConfig::from_json_str(r#"{"rich": {"show_time": false}}"#).unwrap();
        assert_eq!(config.file.backup_count, 10);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(BridgeConfig::from_json_str("{}").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_invalid_document() {
        assert!(BridgeConfig::from_json_str("{\"file\": 3}").is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        fs::write(&path, r#"{"time_style_key": "log.time"}"#).unwrap();

        let config = BridgeConfig::from_json_file(&path).unwrap();
        assert_eq!(config.time_style_key, "log.time");

        let missing = BridgeConfig::from_json_file(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(BridgeError::ReadError { .. })));
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfig::new()
            .with_theme_style("logging.level.info", "green")
            .with_time_style_key("logging.level.info")
            .with_rotation("W0")
            .with_backup_count(2)
            .with_file_format("%(message)s");

        assert_eq!(config.theme["logging.level.info"], "green");
        assert_eq!(config.time_style_key, "logging.level.info");
        assert_eq!(config.file.when, "W0");
        assert_eq!(config.file.backup_count, 2);
        assert_eq!(config.file.fmt, "%(message)s");
    }
}
