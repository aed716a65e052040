//! Explicit logging context.
//!
//! The bridge does not touch any process-wide logger. Callers build a
//! `LogContext` with the sinks they want, and every `ProcessLogger` handed
//! out by it writes only to those sinks.

use std::fmt;
use std::sync::Arc;

use chrono::Local;

use crate::level::Level;
use crate::sink::{LogEvent, LogSink, Origin};

/// An immutable set of sinks shared by all loggers created from it.
#[derive(Clone)]
pub struct LogContext {
    sinks: Arc<[Arc<dyn LogSink>]>,
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogContext")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl LogContext {
    /// Creates a context over the given sinks.
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self {
            sinks: sinks.into(),
        }
    }

    /// Returns a copy of this context with one more sink.
    pub fn with_sink(&self, sink: Arc<dyn LogSink>) -> Self {
        let mut sinks: Vec<Arc<dyn LogSink>> = self.sinks.iter().cloned().collect();
        sinks.push(sink);
        Self::new(sinks)
    }

    /// Number of sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// A logger that tags its events with `name`.
    pub fn logger(&self, name: impl Into<String>) -> ProcessLogger {
        let name: String = name.into();
        ProcessLogger {
            name: Arc::from(name),
            context: self.clone(),
        }
    }

    /// Delivers an event to every sink that accepts its level.
    pub fn dispatch(&self, event: &LogEvent) {
        for sink in self.sinks.iter() {
            if event.level >= sink.min_level() {
                sink.emit(event);
            }
        }
    }

    /// Flushes all sinks.
    pub fn flush(&self) {
        for sink in self.sinks.iter() {
            sink.flush();
        }
    }
}

/// A named logger bound to a [`LogContext`].
///
/// Cheap to clone; the stdout and stderr streams of one process share one.
#[derive(Clone, Debug)]
pub struct ProcessLogger {
    name: Arc<str>,
    context: LogContext,
}

impl ProcessLogger {
    /// Logger name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logs a message.
    pub fn log(&self, level: Level, message: impl Into<String>, origin: Origin) {
        self.dispatch(level, message.into(), origin, None);
    }

    /// Logs a message followed by traceback text for highlighted display.
    pub fn log_traceback(
        &self,
        level: Level,
        message: impl Into<String>,
        traceback: impl Into<String>,
        origin: Origin,
    ) {
        self.dispatch(level, message.into(), origin, Some(traceback.into()));
    }

    fn dispatch(&self, level: Level, message: String, origin: Origin, traceback: Option<String>) {
        self.context.dispatch(&LogEvent {
            timestamp: Local::now(),
            level,
            logger: self.name.to_string(),
            message,
            origin,
            traceback,
        });
    }
}
