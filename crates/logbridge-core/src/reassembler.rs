//! Multi-line JSON reassembly.
//!
//! Processes often print one JSON object across several lines. The
//! reassembler buffers those lines and tracks the brace balance outside of
//! string literals until the block looks closed.

/// Net `{` minus `}` in `s`, ignoring braces inside double-quoted strings.
///
/// A backslash escapes the character after it, so `\"` never toggles the
/// string state.
pub fn count_braces_outside_quotes(s: &str) -> i64 {
    let mut depth = 0;
    let mut in_str = false;
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_str = !in_str,
            _ if in_str => {}
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
    }

    depth
}

/// Per-stream buffer for one multi-line JSON block.
///
/// `balance` is always the sum of the brace deltas of `buffer`, and
/// `collecting` is true exactly while `buffer` holds unflushed lines.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Vec<String>,
    balance: i64,
    collecting: bool,
}

impl Reassembler {
    /// Creates an idle reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a block is being collected.
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Current brace balance of the buffered lines.
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Number of buffered lines.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Starts a block if `line` contains an opening brace.
    ///
    /// Returns `true` if collection began. Any previously buffered lines are
    /// replaced.
    pub fn start_if_jsonish(&mut self, line: &str) -> bool {
        if !line.contains('{') {
            return false;
        }
        self.buffer.clear();
        self.buffer.push(line.to_string());
        self.balance = count_braces_outside_quotes(line);
        self.collecting = true;
        true
    }

    /// Appends a line to the current block.
    pub fn add(&mut self, line: &str) {
        self.buffer.push(line.to_string());
        self.balance += count_braces_outside_quotes(line);
        self.collecting = true;
    }

    /// Whether the block should be flushed after `line` was added.
    ///
    /// A block is done when its braces balance. Request-reporting payloads
    /// embed escaped JSON that under-counts closing braces, so a line that
    /// carries `"request_id"` and ends with `}` also closes the block.
    pub fn should_flush(&self, line: &str) -> bool {
        if self.balance <= 0 {
            return true;
        }
        line.contains("\"request_id\"") && line.trim_end().ends_with('}')
    }

    /// Joins the buffered lines and resets to idle.
    pub fn flush(&mut self) -> String {
        let text = self.buffer.join("\n").trim().to_string();
        self.buffer.clear();
        self.balance = 0;
        self.collecting = false;
        text
    }

    /// Flushes whatever is buffered, or `None` when idle.
    pub fn take_partial(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            self.collecting = false;
            return None;
        }
        Some(self.flush())
    }
}
