//! Styled terminal sink.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::config::{BridgeConfig, ConsoleOptions};
use crate::level::Level;
use crate::sink::{LogEvent, LogSink};
use crate::theme::Theme;
use crate::traceback::{tokenize, TracebackLine};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %:z";
const LEVEL_WIDTH: usize = 8;

struct ConsoleState {
    writer: Box<dyn Write + Send>,
    last_time: Option<String>,
}

/// Writes events as aligned, coloured lines:
///
/// ```text
/// [2026-01-02 10:00:00 +01:00] ERROR    server:HttpServer
///                                       { "message": "boom" }
/// ```
///
/// Continuation lines of multi-line messages are indented under the message
/// column. Tracebacks are highlighted below the event.
pub struct ConsoleSink {
    level: Level,
    theme: Theme,
    time_style_key: String,
    options: ConsoleOptions,
    color: bool,
    state: Mutex<ConsoleState>,
    write_failures: AtomicU64,
}

impl ConsoleSink {
    /// Creates a sink on stdout, coloured when stdout is a terminal.
    pub fn stdout(level: Level, config: &BridgeConfig) -> Self {
        let color = io::stdout().is_terminal();
        Self::with_writer(level, config, Box::new(io::stdout()), color)
    }

    /// Creates a sink on an arbitrary writer.
    pub fn with_writer(
        level: Level,
        config: &BridgeConfig,
        writer: Box<dyn Write + Send>,
        color: bool,
    ) -> Self {
        Self {
            level,
            theme: Theme::new(&config.theme),
            time_style_key: config.time_style_key.clone(),
            options: config.console.clone(),
            color,
            state: Mutex::new(ConsoleState {
                writer,
                last_time: None,
            }),
            write_failures: AtomicU64::new(0),
        }
    }

    /// Number of failed writes.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    fn paint(&self, key: &str, text: &str) -> String {
        if self.color {
            self.theme.paint(key, text)
        } else {
            text.to_string()
        }
    }

    /// Renders the event line(s) without a trailing newline.
    fn render(&self, event: &LogEvent, last_time: &mut Option<String>) -> String {
        let mut prefix = String::new();
        let mut prefix_width = 0;

        if self.options.show_time {
            let stamp = format!("[{}]", event.timestamp.format(TIME_FORMAT));
            let width = stamp.chars().count();
            if self.options.omit_repeated_times && last_time.as_deref() == Some(stamp.as_str()) {
                prefix.push_str(&" ".repeat(width));
            } else {
                prefix.push_str(&self.paint(&self.time_style_key, &stamp));
            }
            prefix.push(' ');
            prefix_width += width + 1;
            *last_time = Some(stamp);
        }

        if self.options.show_level {
            let level = format!("{:<width$}", event.level, width = LEVEL_WIDTH);
            prefix.push_str(&self.paint(event.level.theme_key(), &level));
            prefix.push(' ');
            prefix_width += LEVEL_WIDTH + 1;
        }

        let indent = " ".repeat(prefix_width);
        let mut out = prefix;
        for (i, line) in event.message.split('\n').enumerate() {
            if i > 0 {
                out.push('\n');
                out.push_str(&indent);
            }
            out.push_str(line);
        }

        if self.options.show_path {
            let path = format!("{}:{}", event.origin.file_name(), event.origin.line);
            out.push_str("  ");
            out.push_str(&self.paint("log.path", &path));
        }

        out
    }

    /// Renders traceback text with per-line highlighting.
    fn render_traceback(&self, text: &str) -> String {
        tokenize(text)
            .into_iter()
            .map(|line| match line {
                TracebackLine::Banner(banner) => self.paint("traceback.title", &banner),
                TracebackLine::Frame {
                    indent,
                    path,
                    line,
                    func,
                } => {
                    let mut out = format!(
                        "{}File \"{}\", line {}",
                        indent,
                        self.paint("traceback.path", &path),
                        self.paint("traceback.lineno", &line)
                    );
                    if let Some(func) = func {
                        out.push_str(", in ");
                        out.push_str(&self.paint("traceback.func", &func));
                    }
                    out
                }
                TracebackLine::Exception { kind, message } => {
                    let mut out = self.paint("traceback.exc_type", &kind);
                    if !message.is_empty() {
                        out.push_str(": ");
                        out.push_str(&self.paint("traceback.exc_value", &message));
                    }
                    out
                }
                TracebackLine::Code(code) => self.paint("traceback.code", &code),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl LogSink for ConsoleSink {
    fn min_level(&self) -> Level {
        self.level
    }

    fn emit(&self, event: &LogEvent) {
        let Ok(mut state) = self.state.lock() else {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let ConsoleState { writer, last_time } = &mut *state;

        let mut text = self.render(event, last_time);
        text.push('\n');
        if let Some(traceback) = &event.traceback {
            text.push_str(&self.render_traceback(traceback));
            text.push('\n');
        }

        if writer
            .write_all(text.as_bytes())
            .and_then(|_| writer.flush())
            .is_err()
        {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self) {
        if let Ok(mut state) = self.state.lock() {
            let _ = state.writer.flush();
        }
    }
}
