//! Stream drainer threads.

use std::io::{BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use crate::error::{BridgeError, Result};
use crate::stream::StreamState;

/// Reads `reader` line by line into `state` until end of stream.
///
/// `\n` and `\r\n` both end a line. Bytes are decoded lossily so that
/// binary output never stops the drain.
/// A read error ends the drain the same way EOF does.
pub fn drain<R: Read>(reader: R, state: &mut StreamState) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(1024);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf);
                state.handle_line(&line);
            }
            Err(e) => {
                trace!(stream = %state.tag(), error = %e, "read failed, treating as end of stream");
                break;
            }
        }
    }

    state.finish();
}

/// Spawns a detached thread named `logbridge-<process>-<stream>` that drains
/// `reader` into `state`.
pub fn spawn_drainer<R>(process: &str, reader: R, mut state: StreamState) -> Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let name = format!("logbridge-{}-{}", process, state.tag().suffix());
    let process = process.to_string();
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            debug!(process = %process, stream = %state.tag(), "drainer started");
            drain(reader, &mut state);
            debug!(process = %process, stream = %state.tag(), "drainer stopped");
        })
        .map_err(BridgeError::Spawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeStats;
    use crate::context::LogContext;
    use crate::sink::MemorySink;
    use crate::stream::StreamTag;
    use std::fs;
    use std::io::{self, Cursor};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn state(dir: &TempDir, sink: Arc<MemorySink>) -> StreamState {
        let file = fs::File::create(dir.path().join("out.log")).unwrap();
        let logger = LogContext::default().with_sink(sink).logger("proc");
        StreamState::new(StreamTag::Stdout, file, logger, Arc::new(BridgeStats::default()))
    }

    #[test]
    fn test_drain_strips_line_terminators_only() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::default());
        let mut st = state(&dir, sink.clone());

        drain(
            Cursor::new(b"  spaced  \r\ninner\rcr\nlast without newline".to_vec()),
            &mut st,
        );

        let events = sink.events();
        assert_eq!(events[0].message, "proc -   spaced  ");
        assert_eq!(events[1].message, "proc - inner\rcr");
        assert_eq!(events[2].message, "proc - last without newline");
        assert_eq!(
            fs::read_to_string(dir.path().join("out.log")).unwrap(),
            "  spaced  \ninner\rcr\nlast without newline\n"
        );
    }

    #[test]
    fn test_crlf_json_block() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::default());
        let mut st = state(&dir, sink.clone());

        drain(Cursor::new(b"{\"a\": 1,\r\n\"b\": 2}\r\n".to_vec()), &mut st);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "proc\n{\n  \"a\": 1,\n  \"b\": 2\n}");
    }

    #[test]
    fn test_drain_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::default());
        let mut st = state(&dir, sink.clone());

        drain(Cursor::new(vec![0xff, 0xfe, b'o', b'k', b'\n']), &mut st);

        assert_eq!(sink.events()[0].message, "proc - \u{fffd}\u{fffd}ok");
    }

    #[test]
    fn test_read_error_ends_drain() {
        struct Failing(bool);
        impl Read for Failing {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0 {
                    return Err(io::Error::new(io::ErrorKind::Other, "pipe broke"));
                }
                self.0 = true;
                let data = b"{\"partial\": 1,\n";
                buf[..data.len()].copy_from_slice(data);
                Ok(data.len())
            }
        }

        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::default());
        let mut st = state(&dir, sink.clone());

        drain(Failing(false), &mut st);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "proc - {\"partial\": 1,");
    }

    #[test]
    fn test_spawned_thread_name() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::default());
        let st = state(&dir, sink.clone());

        let handle = spawn_drainer("api", Cursor::new(b"hi\n".to_vec()), st).unwrap();
        assert_eq!(handle.thread().name(), Some("logbridge-api-stdout"));
        handle.join().unwrap();

        assert_eq!(sink.events()[0].message, "proc - hi");
    }
}
