//! The process log bridge.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::context::LogContext;
use crate::drain::spawn_drainer;
use crate::error::{BridgeError, Result};
use crate::level::Level;
use crate::origin;
use crate::sink::{ConsoleSink, LogSink, RotatingFileSink};
use crate::stream::{StreamState, StreamTag};

/// Name of the logger the bridge reports its own messages under.
pub const BRIDGE_LOGGER: &str = "ProcessLogBridge";

/// Counters shared by all drainers of a bridge.
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub(crate) lines_processed: AtomicU64,
    pub(crate) tee_write_failures: AtomicU64,
    pub(crate) tee_close_failures: AtomicU64,
}

impl BridgeStats {
    /// Lines read from all streams.
    pub fn lines_processed(&self) -> u64 {
        self.lines_processed.load(Ordering::Relaxed)
    }

    /// Failed writes to tee files.
    pub fn tee_write_failures(&self) -> u64 {
        self.tee_write_failures.load(Ordering::Relaxed)
    }

    /// Tee files that could not be flushed on close.
    pub fn tee_close_failures(&self) -> u64 {
        self.tee_close_failures.load(Ordering::Relaxed)
    }
}

/// A registered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedStream {
    /// Process name.
    pub name: String,
    /// Which stream.
    pub tag: StreamTag,
    /// File the stream is teed into.
    pub log_file: PathBuf,
}

/// Drainer threads of one attached process.
///
/// Dropping the handle detaches the threads; they keep running until the
/// process closes its streams.
#[derive(Debug)]
pub struct AttachHandle {
    name: String,
    stdout: JoinHandle<()>,
    stderr: JoinHandle<()>,
}

impl AttachHandle {
    /// Process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether both drainers have exited.
    pub fn is_finished(&self) -> bool {
        self.stdout.is_finished() && self.stderr.is_finished()
    }

    /// Waits for both drainers to reach end of stream.
    pub fn join(self) {
        for handle in [self.stdout, self.stderr] {
            if handle.join().is_err() {
                debug!(process = %self.name, "drainer thread panicked");
            }
        }
    }
}

/// Routes subprocess output to a tee file and to the log sinks.
///
/// Each attached process gets one drainer thread per stream. Lines are
/// copied verbatim into the process log file and, in parallel, parsed:
/// JSON records (including ones split over several lines) are
/// pretty-printed at the severity their `message_type` names, other text
/// is logged as `name - line` at the severity its keywords suggest.
pub struct ProcessLogBridge {
    context: LogContext,
    config: BridgeConfig,
    registry: Mutex<HashMap<(String, StreamTag), PathBuf>>,
    stats: Arc<BridgeStats>,
}

impl fmt::Debug for ProcessLogBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessLogBridge")
            .field("context", &self.context)
            .field("stats", &self.stats)
            .finish()
    }
}

impl ProcessLogBridge {
    /// Creates a bridge logging to the console at `level` and, when given,
    /// to a rotating runner log file.
    pub fn new(
        level: Level,
        runner_log_file: Option<&Path>,
        config: BridgeConfig,
    ) -> Result<Self> {
        let mut sinks: Vec<Arc<dyn LogSink>> =
            vec![Arc::new(ConsoleSink::stdout(level, &config))];
        if let Some(path) = runner_log_file {
            sinks.push(Arc::new(RotatingFileSink::new(path, &config.file)?));
        }

        let bridge = Self::with_context(LogContext::new(sinks), config);
        bridge.context.logger(BRIDGE_LOGGER).log(
            Level::Info,
            "Runner logging initialized (console enabled)",
            origin!("new"),
        );
        Ok(bridge)
    }

    /// Creates a bridge over a prebuilt logging context.
    pub fn with_context(context: LogContext, config: BridgeConfig) -> Self {
        Self {
            context,
            config,
            registry: Mutex::new(HashMap::new()),
            stats: Arc::new(BridgeStats::default()),
        }
    }

    /// The logging context events are delivered to.
    pub fn context(&self) -> &LogContext {
        &self.context
    }

    /// The configuration the bridge was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<BridgeStats> {
        Arc::clone(&self.stats)
    }

    /// Attaches to the piped stdout and stderr of a spawned child.
    ///
    /// The child must have been spawned with both streams piped.
    pub fn attach_process_logger(
        &self,
        child: &mut Child,
        name: &str,
        log_file: &Path,
    ) -> Result<AttachHandle> {
        let stdout = child.stdout.take().ok_or(BridgeError::MissingStream("stdout"))?;
        let stderr = child.stderr.take().ok_or(BridgeError::MissingStream("stderr"))?;
        debug!(process = name, pid = child.id(), "attaching to child");
        self.attach_streams(stdout, stderr, name, log_file)
    }

    /// Attaches to an arbitrary pair of output streams.
    pub fn attach_streams<O, E>(
        &self,
        stdout: O,
        stderr: E,
        name: &str,
        log_file: &Path,
    ) -> Result<AttachHandle>
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| BridgeError::DirectoryError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let out_tee = open_tee(log_file)?;
        let err_tee = open_tee(log_file)?;

        {
            let mut registry = self
                .registry
                .lock()
                .map_err(|e| BridgeError::LockPoisoned(e.to_string()))?;
            for tag in [StreamTag::Stdout, StreamTag::Stderr] {
                registry.insert((name.to_string(), tag), log_file.to_path_buf());
            }
        }

        let logger = self.context.logger(name);
        let stdout = spawn_drainer(
            name,
            stdout,
            StreamState::new(StreamTag::Stdout, out_tee, logger.clone(), self.stats()),
        )?;
        let stderr = spawn_drainer(
            name,
            stderr,
            StreamState::new(StreamTag::Stderr, err_tee, logger, self.stats()),
        )?;

        info!(process = name, log_file = %log_file.display(), "process logger attached");
        Ok(AttachHandle {
            name: name.to_string(),
            stdout,
            stderr,
        })
    }

    /// Registered streams, ordered by process name then stream.
    pub fn attached(&self) -> Vec<AttachedStream> {
        let Ok(registry) = self.registry.lock() else {
            return Vec::new();
        };
        let mut streams: Vec<AttachedStream> = registry
            .iter()
            .map(|((name, tag), log_file)| AttachedStream {
                name: name.clone(),
                tag: *tag,
                log_file: log_file.clone(),
            })
            .collect();
        streams.sort_by(|a, b| a.name.cmp(&b.name).then(a.tag.cmp(&b.tag)));
        streams
    }
}

fn open_tee(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| BridgeError::OpenError {
            path: path.to_path_buf(),
            source,
        })
}
