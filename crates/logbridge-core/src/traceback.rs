//! Traceback detection, reflow and tokenizing for highlighted display.

use std::sync::OnceLock;

use regex::Regex;

use crate::classify::collapse_blank_lines;

/// First line of a Python traceback.
pub const TRACEBACK_START: &str = "Traceback (most recent call last):";
/// Banner between an exception and one raised while handling it.
pub const CHAIN_DURING: &str =
    "During handling of the above exception, another exception occurred:";
/// Banner between an exception and the one it caused.
pub const CHAIN_CAUSE: &str =
    "The above exception was the direct cause of the following exception:";

fn frame_hint() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"File ".*?", line \d+(?:, in .*)?"#).expect("Invalid regex pattern")
    })
}

fn markers() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let banners = [TRACEBACK_START, CHAIN_DURING, CHAIN_CAUSE]
            .iter()
            .map(|b| regex::escape(b))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(
            r#"(?P<banner>{})|[ \t]*File "|\b[\w.]*(?:Error|Exception):"#,
            banners
        ))
        .expect("Invalid regex pattern")
    })
}

/// Whether `text` resembles a Python traceback.
pub fn looks_like_traceback(text: &str) -> bool {
    text.contains(TRACEBACK_START) || frame_hint().is_match(text)
}

/// Reflows traceback text that arrived escaped or flattened onto one line.
///
/// Escaped `\r`, `\t`, `\n` and `\"` are unescaped, banners get a line of
/// their own, frames and exception lines start on a new line, and runs of
/// blank lines collapse to one.
pub fn normalize_traceback(message: &str) -> String {
    let text = message
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .replace("\\n", "\n")
        .replace("\\\"", "\"");

    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;
    for caps in markers().captures_iter(&text) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&text[last..m.start()]);
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(m.as_str());
        if caps.name("banner").is_some() {
            out.push('\n');
        }
        last = m.end();
    }
    out.push_str(&text[last..]);

    collapse_blank_lines(&out).trim().to_string()
}

/// One line of a traceback, split for highlighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracebackLine {
    /// `Traceback (most recent call last):` or a chained-exception banner.
    Banner(String),
    /// `File "path", line N, in func`.
    Frame {
        indent: String,
        path: String,
        line: String,
        func: Option<String>,
    },
    /// `SomeError: message`.
    Exception { kind: String, message: String },
    /// Source excerpt or anything else.
    Code(String),
}

fn frame_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^(\s*)File "(.*?)", line (\d+)(?:, in (.*))?$"#)
            .expect("Invalid regex pattern")
    })
}

fn exception_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([\w.]*(?:Error|Exception|Exit|Interrupt)):?\s?(.*)$")
            .expect("Invalid regex pattern")
    })
}

/// Splits normalized traceback text into highlightable lines.
pub fn tokenize(text: &str) -> Vec<TracebackLine> {
    text.lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed == TRACEBACK_START || trimmed == CHAIN_DURING || trimmed == CHAIN_CAUSE {
                return TracebackLine::Banner(trimmed.to_string());
            }
            if let Some(caps) = frame_line().captures(line) {
                return TracebackLine::Frame {
                    indent: caps[1].to_string(),
                    path: caps[2].to_string(),
                    line: caps[3].to_string(),
                    func: caps.get(4).map(|m| m.as_str().to_string()),
                };
            }
            if let Some(caps) = exception_line().captures(line) {
                return TracebackLine::Exception {
                    kind: caps[1].to_string(),
                    message: caps[2].to_string(),
                };
            }
            TracebackLine::Code(line.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_traceback() {
        assert!(looks_like_traceback("Traceback (most recent call last):\n  ..."));
        assert!(looks_like_traceback(r#"  File "app.py", line 12, in main"#));
        assert!(looks_like_traceback(r#"File "app.py", line 3"#));
        assert!(!looks_like_traceback("File not found"));
        assert!(!looks_like_traceback(""));
    }

    #[test]
    fn test_normalize_escaped() {
        let raw = r#"Traceback (most recent call last):\n  File \"app.py\", line 3, in <module>\n    main()\nValueError: bad value"#;
        let text = normalize_traceback(raw);
        assert_eq!(
            text,
            "Traceback (most recent call last):\n\n  File \"app.py\", line 3, in <module>\n    main()\nValueError: bad value"
        );
    }

    #[test]
    fn test_normalize_flattened() {
        let raw = r#"boom Traceback (most recent call last): File "a.py", line 1, in f ValueError: nope"#;
        let text = normalize_traceback(raw);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "boom ");
        assert_eq!(lines[1], TRACEBACK_START);
        assert!(lines.iter().any(|l| l.trim_start().starts_with("File \"a.py\"")));
        assert_eq!(*lines.last().unwrap(), "ValueError: nope");
    }

    #[test]
    fn test_normalize_keeps_qualified_exception_whole() {
        let text = normalize_traceback("x requests.exceptions.ConnectionError: refused");
        assert_eq!(text, "x \nrequests.exceptions.ConnectionError: refused");
    }

    #[test]
    fn test_normalize_chain_banner() {
        let raw = format!("KeyError: 'a'{}TypeError: b", CHAIN_CAUSE);
        let text = normalize_traceback(&raw);
        assert_eq!(text, format!("KeyError: 'a'\n{}\nTypeError: b", CHAIN_CAUSE));
    }

    #[test]
    fn test_normalize_collapses_blank_lines() {
        assert_eq!(normalize_traceback("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_tokenize() {
        let text = "Traceback (most recent call last):\n  File \"app.py\", line 3, in <module>\n    main()\nValueError: bad value";
        let lines = tokenize(text);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], TracebackLine::Banner(TRACEBACK_START.to_string()));
        assert_eq!(
            lines[1],
            TracebackLine::Frame {
                indent: "  ".to_string(),
                path: "app.py".to_string(),
                line: "3".to_string(),
                func: Some("<module>".to_string()),
            }
        );
        assert_eq!(lines[2], TracebackLine::Code("    main()".to_string()));
        assert_eq!(
            lines[3],
            TracebackLine::Exception {
                kind: "ValueError".to_string(),
                message: "bad value".to_string(),
            }
        );
    }
}
