//! In-memory sink.

use std::sync::Mutex;

use crate::level::Level;
use crate::sink::{LogEvent, LogSink};

/// Records events in memory, for tests and for embedding the bridge.
#[derive(Debug)]
pub struct MemorySink {
    level: Level,
    events: Mutex<Vec<LogEvent>>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(Level::Debug)
    }
}

impl MemorySink {
    /// Creates a sink accepting events at or above `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded events for one logger.
    pub fn events_for(&self, logger: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.logger == logger)
            .collect()
    }

    /// Removes all recorded events.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl LogSink for MemorySink {
    fn min_level(&self) -> Level {
        self.level
    }

    fn emit(&self, event: &LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
