//! Per-stream state: tee file, reassembler and logger.

use std::fmt;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::bridge::BridgeStats;
use crate::classify::{classify_line, LineClass};
use crate::context::ProcessLogger;
use crate::emitter::{emit_collected, emit_json_block, emit_text_line};
use crate::reassembler::Reassembler;

/// Which output stream of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamTag {
    Stdout,
    Stderr,
}

impl StreamTag {
    /// Upper-case label used in registry keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamTag::Stdout => "STDOUT",
            StreamTag::Stderr => "STDERR",
        }
    }

    /// Lower-case suffix used in thread names.
    pub fn suffix(&self) -> &'static str {
        match self {
            StreamTag::Stdout => "stdout",
            StreamTag::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State owned by one drainer thread.
pub struct StreamState {
    tag: StreamTag,
    tee: Option<LineWriter<File>>,
    reassembler: Reassembler,
    logger: ProcessLogger,
    stats: Arc<BridgeStats>,
}

impl StreamState {
    pub fn new(
        tag: StreamTag,
        tee: File,
        logger: ProcessLogger,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            tag,
            tee: Some(LineWriter::new(tee)),
            reassembler: Reassembler::new(),
            logger,
            stats,
        }
    }

    /// Stream this state belongs to.
    pub fn tag(&self) -> StreamTag {
        self.tag
    }

    /// Whether a multi-line block is being collected.
    pub fn is_collecting(&self) -> bool {
        self.reassembler.is_collecting()
    }

    /// Processes one line with its trailing newline already removed.
    pub fn handle_line(&mut self, line: &str) {
        self.tee_line(line);
        self.stats.lines_processed.fetch_add(1, Ordering::Relaxed);

        if line.is_empty() {
            return;
        }

        if self.reassembler.is_collecting() {
            self.reassembler.add(line);
            if self.reassembler.should_flush(line) {
                let block = self.reassembler.flush();
                emit_collected(&self.logger, &block);
            }
            return;
        }

        match classify_line(line) {
            LineClass::Empty => {}
            LineClass::CompleteJson(record) => emit_json_block(&self.logger, &record),
            LineClass::StartOfBlock => {
                self.reassembler.start_if_jsonish(line);
                if self.reassembler.balance() <= 0 {
                    let block = self.reassembler.flush();
                    emit_collected(&self.logger, &block);
                }
            }
            LineClass::PlainText => emit_text_line(&self.logger, line),
        }
    }

    /// Emits any partial block, then flushes and closes the tee.
    pub fn finish(&mut self) {
        if let Some(block) = self.reassembler.take_partial() {
            debug!(
                process = self.logger.name(),
                stream = %self.tag,
                "flushing partial block at end of stream"
            );
            emit_collected(&self.logger, &block);
        }

        if let Some(tee) = self.tee.take() {
            match tee.into_inner() {
                Ok(file) => {
                    if let Err(e) = file.sync_all() {
                        trace!(error = %e, "tee sync failed");
                    }
                }
                Err(e) => {
                    self.stats.tee_close_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        process = self.logger.name(),
                        stream = %self.tag,
                        error = %e.error(),
                        "failed to close tee file"
                    );
                }
            }
        }
    }

    fn tee_line(&mut self, line: &str) {
        let Some(tee) = self.tee.as_mut() else {
            return;
        };
        if let Err(e) = tee.write_all(line.as_bytes()).and_then(|_| tee.write_all(b"\n")) {
            self.stats.tee_write_failures.fetch_add(1, Ordering::Relaxed);
            trace!(
                process = self.logger.name(),
                stream = %self.tag,
                error = %e,
                "tee write failed"
            );
        }
    }
}

impl Drop for StreamState {
    fn drop(&mut self) {
        if self.tee.is_some() {
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LogContext;
    use crate::level::Level;
    use crate::sink::MemorySink;
    use std::fs;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> (StreamState, Arc<MemorySink>, Arc<BridgeStats>, std::path::PathBuf) {
        let path = dir.path().join("svc.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        let sink = Arc::new(MemorySink::default());
        let logger = LogContext::default().with_sink(sink.clone()).logger("svc");
        let stats = Arc::new(BridgeStats::default());
        (
            StreamState::new(StreamTag::Stdout, file, logger, stats.clone()),
            sink,
            stats,
            path,
        )
    }

    #[test]
    fn test_tag_labels() {
        assert_eq!(StreamTag::Stdout.to_string(), "STDOUT");
        assert_eq!(StreamTag::Stderr.suffix(), "stderr");
    }

    #[test]
    fn test_every_line_is_teed() {
        let dir = TempDir::new().unwrap();
        let (mut st, sink, stats, path) = state(&dir);

        st.handle_line("hello");
        st.handle_line("");
        st.handle_line("  indented");
        st.finish();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n\n  indented\n");
        assert_eq!(sink.events().len(), 2);
        assert_eq!(stats.lines_processed(), 3);
    }

    #[test]
    fn test_multiline_block() {
        let dir = TempDir::new().unwrap();
        let (mut st, sink, _, _) = state(&dir);

        st.handle_line("{\"a\": 1,");
        assert!(st.is_collecting());
        assert!(sink.events().is_empty());
        st.handle_line("");
        st.handle_line("\"message_type\": \"warning\"}");
        assert!(!st.is_collecting());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::Warning);
        assert!(events[0].message.contains("\"a\": 1"));
    }

    #[test]
    fn test_lines_inside_block_are_not_classified() {
        let dir = TempDir::new().unwrap();
        let (mut st, sink, _, _) = state(&dir);

        st.handle_line("{");
        st.handle_line("{\"inner\": true}");
        assert!(st.is_collecting());
        st.handle_line("}");

        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_self_closing_start_flushes_immediately() {
        let dir = TempDir::new().unwrap();
        let (mut st, sink, _, _) = state(&dir);

        st.handle_line("payload {not json} ERROR");
        assert!(!st.is_collecting());

        let events = sink.events();
        assert_eq!(events[0].message, "svc - payload {not json} ERROR");
        assert_eq!(events[0].level, Level::Error);
    }

    #[test]
    fn test_finish_flushes_partial_block() {
        let dir = TempDir::new().unwrap();
        let (mut st, sink, _, _) = state(&dir);

        st.handle_line("{\"unterminated\": [");
        st.handle_line("  1, 2");
        st.finish();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "svc - {\"unterminated\": [ 1, 2");
    }

    #[test]
    fn test_drop_finishes_once() {
        let dir = TempDir::new().unwrap();
        let (mut st, sink, _, path) = state(&dir);

        st.handle_line("{\"open\":");
        drop(st);

        assert_eq!(sink.events().len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"open\":\n");
    }
}
