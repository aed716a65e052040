//! Line classification and JSON recovery.
//!
//! Process output mixes plain text, single-line JSON records, JSON records
//! behind a timestamp prefix, and JSON split over several lines. These
//! helpers decide which one a line (or a reassembled block) is.

use std::sync::OnceLock;

use chrono::Local;
use regex::Regex;
use serde_json::{Map, Value};

/// A structured log record.
pub type LogRecord = Map<String, Value>;

/// How a single line should be handled when no block is being collected.
#[derive(Debug, Clone, PartialEq)]
pub enum LineClass {
    /// Nothing to emit; the line is only teed.
    Empty,
    /// The line holds a complete JSON record.
    CompleteJson(LogRecord),
    /// The line opens a JSON block that continues on later lines.
    StartOfBlock,
    /// Opaque text.
    PlainText,
}

/// Classifies one raw line.
pub fn classify_line(line: &str) -> LineClass {
    if line.is_empty() {
        return LineClass::Empty;
    }
    if let Some(record) = parse_json_fragment(line) {
        return LineClass::CompleteJson(record);
    }
    if line.contains('{') {
        LineClass::StartOfBlock
    } else {
        LineClass::PlainText
    }
}

fn into_record(value: Value) -> LogRecord {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("message".to_string(), other);
            map
        }
    }
}

/// Parses `text` as a JSON record.
///
/// Tries the whole text first, then the span from the first `{` to the last
/// `}` so that records behind a timestamp prefix are recovered. Non-object
/// values are wrapped as `{"message": value}`.
pub fn parse_json_fragment(text: &str) -> Option<LogRecord> {
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(into_record(value));
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .map(into_record)
}

fn trailing_comma() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("Invalid regex pattern"))
}

fn excess_newlines() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("Invalid regex pattern"))
}

/// Collapses runs of three or more newlines into two.
pub(crate) fn collapse_blank_lines(text: &str) -> String {
    excess_newlines().replace_all(text, "\n\n").into_owned()
}

/// Leniently parses a JSON document nested inside a string value.
///
/// Only strings that start with `{` or `[` are considered. A strict parse is
/// tried first; failing that, escaped `\r`, `\t` and `\n` are unescaped and
/// trailing commas dropped before a second attempt.
pub fn lenient_inner_json(value: &Value) -> Option<Value> {
    let s = value.as_str()?.trim();
    if !(s.starts_with('{') || s.starts_with('[')) {
        return None;
    }
    if let Ok(parsed) = serde_json::from_str(s) {
        return Some(parsed);
    }

    let cleaned = s
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .replace("\\n", "\n");
    let cleaned = trailing_comma().replace_all(&cleaned, "$1");
    let cleaned = collapse_blank_lines(&cleaned);
    serde_json::from_str(&cleaned).ok()
}

const META_FIELDS: [&str; 5] = ["user_id", "Timestamp", "source", "message_type", "request_id"];

fn request_reporting_inner() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)Request reporting:\s*\{(?P<inner>.*?)\}\s*","#)
            .expect("Invalid regex pattern")
    })
}

fn meta_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        META_FIELDS
            .iter()
            .map(|field| {
                let pattern = format!(r#"(?i)"{}"\s*:\s*"(?P<val>[^"]*)""#, field);
                (*field, Regex::new(&pattern).expect("Invalid regex pattern"))
            })
            .collect()
    })
}

/// Rebuilds a request-reporting block into a record.
///
/// The agent server logs requests as a quoted sentence,
/// `"Request reporting: {...}",`, which embeds a JSON object that cannot be
/// parsed as part of the outer text. The inner object becomes `message`
/// (kept as text if it does not parse) and the metadata fields are pulled
/// out of the surrounding text.
pub fn rebuild_request_reporting(block: &str) -> Option<LogRecord> {
    let caps = request_reporting_inner().captures(block)?;
    let inner_src = format!("{{{}}}", caps["inner"].trim());
    let inner = serde_json::from_str::<Value>(&inner_src).unwrap_or(Value::String(inner_src));

    let mut record = Map::new();
    record.insert("message".to_string(), inner);
    for (field, pattern) in meta_patterns() {
        if let Some(m) = pattern.captures(block) {
            record.insert((*field).to_string(), Value::String(m["val"].to_string()));
        }
    }
    record
        .entry("Timestamp")
        .or_insert_with(|| Value::String(Local::now().to_rfc3339()));
    record
        .entry("source")
        .or_insert_with(|| Value::String("HttpServer".to_string()));
    record
        .entry("message_type")
        .or_insert_with(|| Value::String("Other".to_string()));
    Some(record)
}

/// Joins the non-blank lines of a block with single spaces.
pub fn flatten_block(block: &str) -> String {
    block
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
