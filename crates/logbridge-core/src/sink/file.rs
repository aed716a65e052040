//! Time-rotated log file sink.
//!
//! The active file is renamed to `<name>.<suffix>` when its interval ends,
//! where the suffix is the start of the finished interval (for example
//! `runner.log.2026-01-01` for daily rotation). Only the newest
//! `backup_count` rotated files are kept; zero keeps them all.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Datelike, Duration, Local};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::FileOptions;
use crate::error::{BridgeError, Result};
use crate::level::Level;
use crate::sink::{LogEvent, LogSink};

const ASCTIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %:z";

/// Rotation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Seconds,
    Minutes,
    Hours,
    Days,
    Midnight,
    /// At midnight starting the given weekday (0 = Monday).
    Weekday(u32),
}

impl Rotation {
    /// Parses `S`, `M`, `H`, `D`, `midnight` or `W0`..`W6`, case-insensitively.
    pub fn parse(when: &str) -> Result<Self> {
        let upper = when.trim().to_uppercase();
        let rotation = match upper.as_str() {
            "S" => Rotation::Seconds,
            "M" => Rotation::Minutes,
            "H" => Rotation::Hours,
            "D" => Rotation::Days,
            "MIDNIGHT" => Rotation::Midnight,
            w if w.len() == 2 && w.starts_with('W') => {
                let day = w[1..]
                    .parse::<u32>()
                    .ok()
                    .filter(|d| *d <= 6)
                    .ok_or_else(|| BridgeError::Config(format!("invalid weekday rotation: {}", when)))?;
                Rotation::Weekday(day)
            }
            _ => return Err(BridgeError::Config(format!("invalid rotation: {}", when))),
        };
        Ok(rotation)
    }

    fn interval(&self) -> Duration {
        match self {
            Rotation::Seconds => Duration::seconds(1),
            Rotation::Minutes => Duration::minutes(1),
            Rotation::Hours => Duration::hours(1),
            Rotation::Days | Rotation::Midnight => Duration::days(1),
            Rotation::Weekday(_) => Duration::days(7),
        }
    }

    fn suffix_format(&self) -> &'static str {
        match self {
            Rotation::Seconds => "%Y-%m-%d_%H-%M-%S",
            Rotation::Minutes => "%Y-%m-%d_%H-%M",
            Rotation::Hours => "%Y-%m-%d_%H",
            _ => "%Y-%m-%d",
        }
    }

    fn suffix_pattern(&self) -> &'static Regex {
        static SECONDS: OnceLock<Regex> = OnceLock::new();
        static MINUTES: OnceLock<Regex> = OnceLock::new();
        static HOURS: OnceLock<Regex> = OnceLock::new();
        static DAYS: OnceLock<Regex> = OnceLock::new();
        let (cell, pattern) = match self {
            Rotation::Seconds => (&SECONDS, r"^\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}$"),
            Rotation::Minutes => (&MINUTES, r"^\d{4}-\d{2}-\d{2}_\d{2}-\d{2}$"),
            Rotation::Hours => (&HOURS, r"^\d{4}-\d{2}-\d{2}_\d{2}$"),
            _ => (&DAYS, r"^\d{4}-\d{2}-\d{2}$"),
        };
        cell.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern"))
    }

    /// First rollover instant after `t`.
    pub fn next_rollover(&self, t: DateTime<Local>) -> DateTime<Local> {
        let days_ahead = match self {
            Rotation::Midnight => 1,
            Rotation::Weekday(day) => {
                let today = t.weekday().num_days_from_monday();
                match (day + 7 - today) % 7 {
                    0 => 7,
                    n => n,
                }
            }
            _ => return t + self.interval(),
        };
        (t.date_naive() + Duration::days(i64::from(days_ahead)))
            .and_hms_opt(0, 0, 0)
            .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
            .unwrap_or_else(|| t + self.interval())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field {
        name: FieldName,
        width: Option<usize>,
        left: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldName {
    AscTime,
    Created,
    LevelName,
    Name,
    FuncName,
    FileName,
    LineNo,
    Message,
}

fn format_field() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"%%|%\((\w+)\)(-?)(\d*)[sd]").expect("Invalid regex pattern")
    })
}

/// A `%(field)s`-style line template.
///
/// Supported fields: `asctime`, `created`, `levelname`, `name`, `funcName`,
/// `filename`, `lineno`, `message`, each with an optional width and `-` for
/// left alignment. `%%` is a literal percent sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFormat {
    segments: Vec<Segment>,
}

impl LineFormat {
    /// Parses a template, rejecting unknown fields.
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in format_field().captures_iter(template) {
            let Some(m) = caps.get(0) else { continue };
            let mut literal = template[last..m.start()].to_string();
            last = m.end();

            let Some(field) = caps.get(1) else {
                literal.push('%');
                push_literal(&mut segments, literal);
                continue;
            };
            push_literal(&mut segments, literal);

            let name = match field.as_str() {
                "asctime" => FieldName::AscTime,
                "created" => FieldName::Created,
                "levelname" => FieldName::LevelName,
                "name" => FieldName::Name,
                "funcName" => FieldName::FuncName,
                "filename" => FieldName::FileName,
                "lineno" => FieldName::LineNo,
                "message" => FieldName::Message,
                other => {
                    return Err(BridgeError::Config(format!(
                        "unsupported format field: {}",
                        other
                    )))
                }
            };
            segments.push(Segment::Field {
                name,
                width: caps[3].parse().ok(),
                left: &caps[2] == "-",
            });
        }
        push_literal(&mut segments, template[last..].to_string());

        Ok(Self { segments })
    }

    /// Formats one event.
    pub fn format(&self, event: &LogEvent) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { name, width, left } => {
                    let value = match name {
                        FieldName::AscTime => event.timestamp.format(ASCTIME_FORMAT).to_string(),
                        FieldName::Created => event.timestamp.timestamp().to_string(),
                        FieldName::LevelName => event.level.as_str().to_string(),
                        FieldName::Name => event.logger.clone(),
                        FieldName::FuncName => event.origin.function.to_string(),
                        FieldName::FileName => event.origin.file_name().to_string(),
                        FieldName::LineNo => event.origin.line.to_string(),
                        FieldName::Message => event.message.clone(),
                    };
                    match (width, left) {
                        (Some(w), true) => out.push_str(&format!("{:<w$}", value, w = w)),
                        (Some(w), false) => out.push_str(&format!("{:>w$}", value, w = w)),
                        (None, _) => out.push_str(&value),
                    }
                }
            }
        }
        out
    }
}

fn push_literal(segments: &mut Vec<Segment>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Literal(prev)) = segments.last_mut() {
        prev.push_str(&text);
    } else {
        segments.push(Segment::Literal(text));
    }
}

struct FileState {
    file: Option<File>,
    rollover_at: DateTime<Local>,
}

/// Appends every event to a file that rotates on a time boundary.
pub struct RotatingFileSink {
    path: PathBuf,
    rotation: Rotation,
    backup_count: usize,
    format: LineFormat,
    state: Mutex<FileState>,
    write_failures: AtomicU64,
}

impl RotatingFileSink {
    /// Opens (creating parents) the log file at `path`.
    pub fn new(path: impl Into<PathBuf>, options: &FileOptions) -> Result<Self> {
        let path = path.into();
        let encoding = options.encoding.to_lowercase().replace('_', "-");
        if encoding != "utf-8" && encoding != "utf8" {
            return Err(BridgeError::Config(format!(
                "unsupported encoding: {}",
                options.encoding
            )));
        }
        let rotation = Rotation::parse(&options.when)?;
        let format = LineFormat::parse(&options.fmt)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| BridgeError::DirectoryError {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // An existing file resumes the interval it was last written in.
        let start = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|_| Local::now());
        let file = open_append(&path)?;

        debug!(path = %path.display(), ?rotation, "rotating log file opened");

        Ok(Self {
            path,
            rotation,
            backup_count: options.backup_count,
            format,
            state: Mutex::new(FileState {
                file: Some(file),
                rollover_at: rotation.next_rollover(start),
            }),
            write_failures: AtomicU64::new(0),
        })
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of failed writes or rotations.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    fn rotate(&self, state: &mut FileState, now: DateTime<Local>) -> std::io::Result<()> {
        state.file = None;

        let interval_start = state.rollover_at - self.rotation.interval();
        let rotated = rotated_path(&self.path, &interval_start.format(self.rotation.suffix_format()).to_string());
        if rotated.exists() {
            fs::remove_file(&rotated)?;
        }
        if self.path.exists() {
            fs::rename(&self.path, &rotated)?;
        }
        debug!(from = %self.path.display(), to = %rotated.display(), "rotated log file");

        for old in self.expired_backups()? {
            if let Err(e) = fs::remove_file(&old) {
                warn!(path = %old.display(), error = %e, "failed to remove old log file");
            }
        }

        let mut next = state.rollover_at;
        while next <= now {
            next = self.rotation.next_rollover(next);
        }
        state.rollover_at = next;
        state.file = Some(append_file(&self.path)?);
        Ok(())
    }

    /// Rotated files beyond `backup_count`, oldest first.
    fn expired_backups(&self) -> std::io::Result<Vec<PathBuf>> {
        if self.backup_count == 0 {
            return Ok(Vec::new());
        }
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };
        let prefix = match self.path.file_name() {
            Some(name) => format!("{}.", name.to_string_lossy()),
            None => return Ok(Vec::new()),
        };

        let pattern = self.rotation.suffix_pattern();
        let mut backups: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_prefix(&prefix)
                    .map(|suffix| pattern.is_match(suffix))
                    .unwrap_or(false)
            })
            .map(|entry| entry.path())
            .collect();
        backups.sort();

        let excess = backups.len().saturating_sub(self.backup_count);
        backups.truncate(excess);
        Ok(backups)
    }
}

fn rotated_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn append_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn open_append(path: &Path) -> Result<File> {
    append_file(path).map_err(|source| BridgeError::OpenError {
            path: path.to_path_buf(),
            source,
        })
}

impl LogSink for RotatingFileSink {
    fn min_level(&self) -> Level {
        Level::Debug
    }

    fn emit(&self, event: &LogEvent) {
        let Ok(mut state) = self.state.lock() else {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if event.timestamp >= state.rollover_at {
            if let Err(e) = self.rotate(&mut state, event.timestamp) {
                warn!(path = %self.path.display(), error = %e, "log rotation failed");
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                if state.file.is_none() {
                    state.file = append_file(&self.path).ok();
                }
            }
        }

        let mut line = self.format.format(event);
        line.push('\n');
        if let Some(traceback) = &event.traceback {
            line.push_str(traceback);
            line.push('\n');
        }

        let written = match state.file.as_mut() {
            Some(file) => file.write_all(line.as_bytes()).is_ok(),
            None => false,
        };
        if !written {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(file) = state.file.as_mut() {
                let _ = file.flush();
            }
        }
    }
}
