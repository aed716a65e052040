//! Subprocess log bridge.
//!
//! This crate drains the stdout and stderr of child processes and turns
//! their output into readable log events:
//! - `ProcessLogBridge` - attaches drainer threads to a process
//! - `LogContext` - the set of sinks events are delivered to
//! - `ConsoleSink`, `RotatingFileSink`, `MemorySink` - built-in sinks
//!
//! Every line is copied verbatim into a per-process log file. In parallel
//! the line is classified: single-line JSON records are pretty-printed,
//! JSON split over several lines is reassembled first, and anything else is
//! logged as plain text. Severity comes from a record's `message_type` or
//! from level keywords in the text.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::process::{Command, Stdio};
//!
//! use logbridge_core::{BridgeConfig, Level, ProcessLogBridge};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = ProcessLogBridge::new(
//!         Level::Info,
//!         Some(Path::new("logs/runner.log")),
//!         BridgeConfig::default(),
//!     )?;
//!
//!     let mut child = Command::new("python3")
//!         .arg("server.py")
//!         .stdout(Stdio::piped())
//!         .stderr(Stdio::piped())
//!         .spawn()?;
//!
//!     let handle = bridge.attach_process_logger(&mut child, "server", Path::new("logs/server.log"))?;
//!     child.wait()?;
//!     handle.join();
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod classify;
pub mod config;
pub mod context;
pub mod drain;
pub mod emitter;
pub mod error;
pub mod level;
pub mod reassembler;
pub mod sink;
pub mod stream;
pub mod theme;
pub mod traceback;

pub use bridge::{AttachHandle, AttachedStream, BridgeStats, ProcessLogBridge, BRIDGE_LOGGER};
pub use classify::{classify_line, LineClass, LogRecord};
pub use config::{BridgeConfig, ConsoleOptions, FileOptions};
pub use context::{LogContext, ProcessLogger};
pub use error::{BridgeError, Result};
pub use level::Level;
pub use reassembler::{count_braces_outside_quotes, Reassembler};
pub use sink::{ConsoleSink, LogEvent, LogSink, MemorySink, Origin, RotatingFileSink};
pub use stream::StreamTag;
