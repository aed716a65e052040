//! Process runner: starts children, routes their output, supervises them.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use logbridge_core::{AttachHandle, ProcessLogBridge};

use crate::error::{Result, RunnerError};
use crate::manifest::ProcessSpec;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runner settings resolved from the command line.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Directory for per-process log files.
    pub logs_dir: PathBuf,
}

/// How a child's output is being drained.
enum Output {
    Bridged(AttachHandle),
    Plain(Vec<JoinHandle<()>>),
}

/// A started child process.
struct ManagedProcess {
    name: String,
    child: Child,
    output: Option<Output>,
    exited: bool,
}

impl Output {
    fn is_finished(&self) -> bool {
        match self {
            Output::Bridged(handle) => handle.is_finished(),
            Output::Plain(handles) => handles.iter().all(JoinHandle::is_finished),
        }
    }

    fn join(self) {
        match self {
            Output::Bridged(handle) => handle.join(),
            Output::Plain(handles) => {
                for handle in handles {
                    let _ = handle.join();
                }
            }
        }
    }
}

impl ManagedProcess {
    /// Joins the drainers once they have reached end of stream. Never blocks:
    /// a grandchild holding the pipes open keeps them running.
    fn reap_output(&mut self) {
        if self.output.as_ref().is_some_and(Output::is_finished) {
            if let Some(output) = self.output.take() {
                output.join();
            }
        }
    }

    /// Exited and fully drained.
    fn is_done(&self) -> bool {
        self.exited && self.output.is_none()
    }
}

/// Starts and supervises a set of processes.
pub struct ProcessRunner {
    options: RunnerOptions,
    bridge: Option<ProcessLogBridge>,
    processes: Vec<ManagedProcess>,
}

impl ProcessRunner {
    /// Creates a runner. Without a bridge, output is streamed as plain
    /// `name: line` text.
    pub fn new(options: RunnerOptions, bridge: Option<ProcessLogBridge>) -> Self {
        Self {
            options,
            bridge,
            processes: Vec::new(),
        }
    }

    /// The bridge, if enabled.
    pub fn bridge(&self) -> Option<&ProcessLogBridge> {
        self.bridge.as_ref()
    }

    /// Number of processes started.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Whether no process has been started.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Starts one process and attaches its output. Returns the PID.
    ///
    /// The log file is truncated and begins with `Starting <name>...`.
    pub fn start_process(&mut self, spec: &ProcessSpec) -> Result<u32> {
        let log_file = spec.log_path(&self.options.logs_dir);
        if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RunnerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&log_file, format!("Starting {}...\n", spec.name)).map_err(|source| {
            RunnerError::Io {
                path: log_file.clone(),
                source,
            }
        })?;

        let (program, args) = spec
            .command
            .split_first()
            .ok_or_else(|| RunnerError::InvalidManifest(format!("process '{}' has no command", spec.name)))?;
        let program = resolve_program(program)?;

        let mut command = Command::new(&program);
        command
            .args(args)
            .envs(&spec.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            name: spec.name.clone(),
            source,
        })?;
        let pid = child.id();
        println!("Started {} with PID {}", spec.name, pid);
        debug!(process = %spec.name, pid, program = %program.display(), "process spawned");

        let attached = match &self.bridge {
            Some(bridge) => bridge
                .attach_process_logger(&mut child, &spec.name, &log_file)
                .map(Output::Bridged)
                .map_err(RunnerError::from),
            None => stream_plain(&mut child, &spec.name, &log_file).map(Output::Plain),
        };
        let output = match attached {
            Ok(output) => output,
            Err(e) => {
                kill_process_group(&mut child);
                let _ = child.wait();
                return Err(e);
            }
        };

        self.processes.push(ManagedProcess {
            name: spec.name.clone(),
            child,
            output: Some(output),
            exited: false,
        });
        Ok(pid)
    }

    /// Waits until every process has exited and its output is drained, or
    /// until `shutdown` is set, in which case all processes are killed.
    pub fn supervise(&mut self, shutdown: &AtomicBool) -> Result<()> {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                println!("\nTermination signal received. Stopping all processes...");
                self.stop_all();
                return Ok(());
            }

            for process in self.processes.iter_mut() {
                if !process.exited {
                    match process.child.try_wait() {
                        Ok(Some(status)) => {
                            info!(process = %process.name, %status, "process exited");
                            process.exited = true;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(process = %process.name, error = %e, "failed to poll process");
                            process.exited = true;
                        }
                    }
                }
                process.reap_output();
            }

            if self.processes.iter().all(ManagedProcess::is_done) {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Kills every process group that is still running or still holds its
    /// output pipes open. Drainers left running are detached.
    pub fn stop_all(&mut self) {
        for process in self.processes.iter_mut().filter(|p| !p.is_done()) {
            println!("Stopping {} (PID {})...", process.name, process.child.id());
            kill_process_group(&mut process.child);
            if !process.exited {
                if let Err(e) = process.child.wait() {
                    debug!(process = %process.name, error = %e, "wait after kill failed");
                }
                process.exited = true;
            }
            process.output = None;
        }
    }
}

/// Resolves a bare program name on `PATH`; paths are used as given.
fn resolve_program(program: &str) -> Result<PathBuf> {
    let expanded = shellexpand::tilde(program).into_owned();
    if expanded.contains(std::path::MAIN_SEPARATOR) || expanded.contains('/') {
        return Ok(PathBuf::from(expanded));
    }
    which::which(&expanded).map_err(|_| RunnerError::CommandNotFound(expanded))
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // Children are spawned as group leaders, so the PID is the PGID.
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        debug!(pgid = %pgid, error = %e, "killpg failed");
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

/// Drains both streams of `child` as `name: <trimmed line>` to the console
/// and the log file.
fn stream_plain(child: &mut Child, name: &str, log_file: &Path) -> Result<Vec<JoinHandle<()>>> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut handles = Vec::new();

    for (suffix, reader) in [
        ("stdout", stdout.map(|s| Box::new(s) as Box<dyn Read + Send>)),
        ("stderr", stderr.map(|s| Box::new(s) as Box<dyn Read + Send>)),
    ] {
        let Some(reader) = reader else { continue };
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|source| RunnerError::Io {
                path: log_file.to_path_buf(),
                source,
            })?;
        let prefix = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("stream-{}-{}", name, suffix))
            .spawn(move || {
                if let Err(e) = stream_output(reader, log, &prefix) {
                    debug!(process = %prefix, error = %e, "plain stream ended with error");
                }
            })
            .map_err(|source| RunnerError::Spawn {
                name: name.to_string(),
                source,
            })?;
        handles.push(handle);
    }
    Ok(handles)
}

fn stream_output<R: Read, W: Write>(reader: R, mut log: W, prefix: &str) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = format!("{}: {}", prefix, String::from_utf8_lossy(&buf).trim());
        println!("{}", line);
        writeln!(log, "{}", line)?;
    }
    log.flush()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use logbridge_core::{BridgeConfig, LogContext, MemorySink};
    use std::os::unix::process::CommandExt;
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::TempDir;

    fn spec(name: &str, script: &str) -> ProcessSpec {
        ProcessSpec::from_command(
            Some(name.to_string()),
            vec!["sh".into(), "-c".into(), script.into()],
        )
    }

    fn options(dir: &TempDir) -> RunnerOptions {
        RunnerOptions {
            logs_dir: dir.path().join("logs"),
        }
    }

    #[test]
    fn test_plain_streaming() {
        let dir = TempDir::new().unwrap();
        let mut runner = ProcessRunner::new(options(&dir), None);

        runner.start_process(&spec("echoer", "echo '  hi  '")).unwrap();
        runner.supervise(&AtomicBool::new(false)).unwrap();

        let log = fs::read_to_string(dir.path().join("logs/echoer.log")).unwrap();
        assert_eq!(log, "Starting echoer...\nechoer: hi\n");
    }

    #[test]
    fn test_bridged_process() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::default());
        let bridge = ProcessLogBridge::with_context(
            LogContext::default().with_sink(sink.clone()),
            BridgeConfig::default(),
        );
        let mut runner = ProcessRunner::new(options(&dir), Some(bridge));

        runner
            .start_process(&spec("api", "echo '{\"message_type\": \"warning\", \"message\": \"slow\"}'"))
            .unwrap();
        runner.supervise(&AtomicBool::new(false)).unwrap();

        let log = fs::read_to_string(dir.path().join("logs/api.log")).unwrap();
        assert_eq!(
            log,
            "Starting api...\n{\"message_type\": \"warning\", \"message\": \"slow\"}\n"
        );
        let events = sink.events_for("api");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, logbridge_core::Level::Warning);
        assert_eq!(runner.bridge().map(|b| b.attached().len()), Some(2));
    }

    #[test]
    fn test_env_is_passed() {
        let dir = TempDir::new().unwrap();
        let mut runner = ProcessRunner::new(options(&dir), None);
        let mut with_env = spec("env", "echo $GREETING");
        with_env.env.insert("GREETING".into(), "hello".into());

        runner.start_process(&with_env).unwrap();
        runner.supervise(&AtomicBool::new(false)).unwrap();

        let log = fs::read_to_string(dir.path().join("logs/env.log")).unwrap();
        assert!(log.ends_with("env: hello\n"));
    }

    #[test]
    fn test_shutdown_kills_group() {
        let dir = TempDir::new().unwrap();
        let mut runner = ProcessRunner::new(options(&dir), None);
        runner.start_process(&spec("sleeper", "sleep 30 & sleep 30")).unwrap();

        let started = Instant::now();
        runner.supervise(&AtomicBool::new(true)).unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(runner.len(), 1);
    }

    #[test]
    fn test_kill_process_group_reaps_leader() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 30"])
            .process_group(0)
            .spawn()
            .unwrap();

        let started = Instant::now();
        kill_process_group(&mut child);
        let status = child.wait().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!status.success());
    }

    #[test]
    fn test_shutdown_while_grandchild_holds_pipe() {
        let dir = TempDir::new().unwrap();
        let mut runner = ProcessRunner::new(options(&dir), None);
        runner.start_process(&spec("forker", "sleep 20 & echo hi")).unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(500));
            flag.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        runner.supervise(&shutdown).unwrap();
        setter.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        let log = fs::read_to_string(dir.path().join("logs/forker.log")).unwrap();
        assert!(log.contains("forker: hi\n"));
    }

    #[test]
    fn test_unknown_program() {
        let dir = TempDir::new().unwrap();
        let mut runner = ProcessRunner::new(options(&dir), None);
        let missing = ProcessSpec::from_command(None, vec!["definitely-not-a-real-binary-xyz".into()]);

        let err = runner.start_process(&missing).unwrap_err();
        assert!(matches!(err, RunnerError::CommandNotFound(_)));
        assert!(runner.is_empty());
    }
}
