//! Output sinks for bridged log events.
//!
//! A sink receives every event at or above its minimum level. Sinks never
//! fail the caller: write errors are counted and dropped.

pub mod console;
pub mod file;
pub mod memory;

use chrono::{DateTime, Local};

use crate::level::Level;

pub use console::ConsoleSink;
pub use file::{LineFormat, Rotation, RotatingFileSink};
pub use memory::MemorySink;

/// Where an event was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    /// Emitting function.
    pub function: &'static str,
    /// Source file.
    pub file: &'static str,
    /// Source line.
    pub line: u32,
}

impl Origin {
    /// Base name of the source file.
    pub fn file_name(&self) -> &'static str {
        self.file
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(self.file)
    }
}

/// Captures the current function name, file and line as an [`Origin`].
#[macro_export]
macro_rules! origin {
    ($function:expr) => {
        $crate::sink::Origin {
            function: $function,
            file: file!(),
            line: line!(),
        }
    };
}

/// A single log event as delivered to sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// When the event was emitted.
    pub timestamp: DateTime<Local>,
    /// Severity.
    pub level: Level,
    /// Logger name (the process name for bridged output).
    pub logger: String,
    /// Rendered message, possibly spanning several lines.
    pub message: String,
    /// Emitting location.
    pub origin: Origin,
    /// Normalized traceback text to display after the message.
    pub traceback: Option<String>,
}

/// A destination for log events.
pub trait LogSink: Send + Sync {
    /// Events below this level are not delivered.
    fn min_level(&self) -> Level;

    /// Writes one event. Must not panic or block indefinitely.
    fn emit(&self, event: &LogEvent);

    /// Flushes buffered output.
    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_macro() {
        let origin = origin!("test_origin_macro");
        assert_eq!(origin.function, "test_origin_macro");
        assert_eq!(origin.file_name(), "mod.rs");
        assert!(origin.line > 0);
    }
}
