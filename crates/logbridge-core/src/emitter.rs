//! Rendering of classified output into log events.

use serde_json::Value;

use crate::classify::{flatten_block, lenient_inner_json, parse_json_fragment, rebuild_request_reporting, LogRecord};
use crate::context::ProcessLogger;
use crate::level::{level_from_record, level_from_text, Level};
use crate::origin;
use crate::traceback::{looks_like_traceback, normalize_traceback};

/// Header for a record: `name:source`, or just `name` without a source.
///
/// Non-string sources are rendered as JSON text.
fn header(name: &str, record: &LogRecord) -> String {
    let source = match record.get("source") {
        None | Some(Value::Null) => return name.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    };
    if source.is_empty() {
        name.to_string()
    } else {
        format!("{}:{}", name, source)
    }
}

/// Pretty-prints a record, expanding a `message` that holds serialized JSON.
fn render_record(record: &LogRecord) -> String {
    let mut display = record.clone();
    if let Some(inner) = record.get("message").and_then(lenient_inner_json) {
        display.insert("message".to_string(), inner);
    }
    let value = Value::Object(display);
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

/// Logs a structured record.
///
/// The record is pretty-printed under its header at the level its
/// `message_type` maps to. A `message` carrying a traceback is logged a
/// second time with the reflowed traceback attached.
pub fn emit_json_block(logger: &ProcessLogger, record: &LogRecord) {
    let level = level_from_record(record);
    let header = header(logger.name(), record);
    let body = render_record(record);
    logger.log(
        level,
        format!("{}\n{}", header, body),
        origin!("emit_json_block"),
    );

    if let Some(Value::String(message)) = record.get("message") {
        let normalized = normalize_traceback(message);
        if looks_like_traceback(&normalized) {
            logger.log_traceback(
                level,
                format!("{} (traceback)", header),
                normalized,
                origin!("emit_json_block"),
            );
        }
    }
}

/// Logs a line of plain text as `name - line`.
pub fn emit_text_line(logger: &ProcessLogger, line: &str) {
    let level = level_from_text(line, Level::Info);
    logger.log(
        level,
        format!("{} - {}", logger.name(), line),
        origin!("emit_text_line"),
    );
}

/// Logs a reassembled block.
///
/// Tries a JSON parse, then the request-reporting rebuild, and finally logs
/// the block flattened onto one line.
pub fn emit_collected(logger: &ProcessLogger, block: &str) {
    if let Some(record) = parse_json_fragment(block).or_else(|| rebuild_request_reporting(block)) {
        emit_json_block(logger, &record);
        return;
    }
    let flat = flatten_block(block);
    if !flat.is_empty() {
        emit_text_line(logger, &flat);
    }
}
