//! Severity levels and severity inference.
//!
//! Structured records carry their severity in `message_type`; plain text is
//! scanned for a standalone level keyword, then for traceback hints.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    /// Upper-case name as printed in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// Theme key used to style this level on the console.
    pub fn theme_key(&self) -> &'static str {
        match self {
            Level::Debug => "logging.level.debug",
            Level::Info => "logging.level.info",
            Level::Warning => "logging.level.warning",
            Level::Error => "logging.level.error",
            Level::Critical => "logging.level.critical",
        }
    }

    /// Parses a level name, falling back to `Info` for unknown names.
    pub fn parse_or_info(name: &str) -> Self {
        name.parse().unwrap_or(Level::Info)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "critical" | "fatal" => Ok(Level::Critical),
            other => Err(format!("unknown level: {}", other)),
        }
    }
}

/// Maps a `message_type` value to a level.
///
/// Lookup is case-insensitive and ignores surrounding whitespace.
pub fn level_for_message_type(message_type: &str) -> Option<Level> {
    match message_type.trim().to_lowercase().as_str() {
        "trace" | "debug" => Some(Level::Debug),
        "info" | "other" | "success" => Some(Level::Info),
        "warning" | "warn" => Some(Level::Warning),
        "error" => Some(Level::Error),
        "critical" | "fatal" => Some(Level::Critical),
        _ => None,
    }
}

/// Infers the level of a structured record from its `message_type` field.
///
/// Missing or unrecognized values map to `Info`. Non-string values are
/// compared by their JSON text.
pub fn level_from_record(record: &Map<String, Value>) -> Level {
    let message_type = match record.get("message_type") {
        None | Some(Value::Null) => return Level::Info,
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    level_for_message_type(&message_type).unwrap_or(Level::Info)
}

fn level_word() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(DEBUG|INFO|WARNING|ERROR|CRITICAL|FATAL)\b")
            .expect("Invalid regex pattern")
    })
}

/// Infers a level from free text.
///
/// The first standalone level keyword wins (`FATAL` means `Critical`). Without
/// one, text mentioning a traceback is an `Error`; otherwise `default`.
pub fn level_from_text(line: &str, default: Level) -> Level {
    if line.is_empty() {
        return default;
    }
    match level_word().captures(line) {
        Some(caps) => caps[1].parse().unwrap_or(default),
        None if line.to_lowercase().contains("traceback") => Level::Error,
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_message_type_table() {
        let cases = [
            ("trace", Level::Debug),
            ("debug", Level::Debug),
            ("info", Level::Info),
            ("other", Level::Info),
            ("success", Level::Info),
            ("warning", Level::Warning),
            ("warn", Level::Warning),
            ("error", Level::Error),
            ("critical", Level::Critical),
            ("fatal", Level::Critical),
        ];
        for (name, expected) in cases {
            assert_eq!(level_for_message_type(name), Some(expected), "{}", name);
            assert_eq!(
                level_for_message_type(&name.to_uppercase()),
                Some(expected),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_message_type_mixed_case() {
        assert_eq!(level_from_record(&record(json!({"message_type": "warning"}))), Level::Warning);
        assert_eq!(level_from_record(&record(json!({"message_type": "ERROR"}))), Level::Error);
        assert_eq!(level_from_record(&record(json!({"message_type": "Fatal"}))), Level::Critical);
        assert_eq!(level_from_record(&record(json!({"message_type": " Warn "}))), Level::Warning);
    }

    #[test]
    fn test_message_type_unknown_or_missing() {
        assert_eq!(level_from_record(&record(json!({"message_type": "banana"}))), Level::Info);
        assert_eq!(level_from_record(&record(json!({"message": "hi"}))), Level::Info);
        assert_eq!(level_from_record(&record(json!({"message_type": null}))), Level::Info);
        assert_eq!(level_from_record(&record(json!({"message_type": 3}))), Level::Info);
    }

    #[test]
    fn test_text_keyword() {
        assert_eq!(
            level_from_text("Something went WRONG: ERROR occurred", Level::Info),
            Level::Error
        );
        assert_eq!(level_from_text("[warning] disk almost full", Level::Info), Level::Warning);
        assert_eq!(level_from_text("FATAL: out of memory", Level::Info), Level::Critical);
        assert_eq!(level_from_text("debug: tick", Level::Info), Level::Debug);
    }

    #[test]
    fn test_text_first_keyword_wins() {
        assert_eq!(level_from_text("INFO retrying after ERROR", Level::Info), Level::Info);
    }

    #[test]
    fn test_text_keyword_must_be_standalone() {
        assert_eq!(level_from_text("ERRORS were counted", Level::Info), Level::Info);
        assert_eq!(level_from_text("information only", Level::Warning), Level::Warning);
    }

    #[test]
    fn test_text_default_and_traceback() {
        assert_eq!(level_from_text("plain status update", Level::Info), Level::Info);
        assert_eq!(
            level_from_text("Traceback (most recent call last):", Level::Info),
            Level::Error
        );
        assert_eq!(level_from_text("", Level::Warning), Level::Warning);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("INFO".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
        assert!("verbose".parse::<Level>().is_err());
        assert_eq!(Level::parse_or_info("verbose"), Level::Info);
        assert_eq!(Level::parse_or_info("debug"), Level::Debug);
    }

    #[test]
    fn test_level_ordering_and_padding() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Error < Level::Critical);
        assert_eq!(format!("{:<8}|", Level::Info), "INFO    |");
    }
}
