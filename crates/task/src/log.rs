//! Per-task output capture.
//!
//! Two independent line readers (one per standard stream) feed a single
//! chronologically ordered sequence. Because the streams are read
//! independently, arrival order across streams does not match timestamp
//! order, so insertion searches for the correct position instead of blindly
//! appending.

use chrono::{DateTime, Utc};
use dagrun_core::{Line, StreamKind};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

// Matches ANSI/VT control and escape sequences so captured lines render
// cleanly in any consumer.
const ANSI_PATTERN: &str = "[\u{1b}\u{9b}][\\[\\]()#;?]*(?:(?:(?:[a-zA-Z\\d]*(?:;[a-zA-Z\\d]*)*)?\u{7})|(?:(?:\\d{1,4}(?:;\\d{0,4})*)?[\\dA-PRZcf-ntqry=><~]))";

static ANSI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(ANSI_PATTERN).unwrap_or_else(|e| panic!("invalid ANSI pattern: {e}"))
});

/// Strip control sequences and trailing whitespace from one raw segment
pub fn sanitize(raw: &str) -> String {
    ANSI_RE
        .replace_all(raw, "")
        .trim_end_matches(&[' ', '\t', '\r', '\n'][..])
        .to_string()
}

/// Split a raw line on carriage returns and sanitize each segment.
/// Progress-bar style output rewrites the same line with `\r`; each rewrite
/// is kept as its own entry. A plain CRLF terminator does not produce an
/// extra empty entry, but a genuinely blank line is preserved.
pub fn sanitize_segments(raw: &str) -> Vec<String> {
    let segments: Vec<String> = raw.split('\r').map(sanitize).collect();
    if segments.len() == 1 {
        return segments;
    }
    let filtered: Vec<String> = segments.into_iter().filter(|s| !s.is_empty()).collect();
    if filtered.is_empty() {
        vec![String::new()]
    } else {
        filtered
    }
}

/// Thread-safe, chronologically ordered, append-only store of captured
/// output lines for one task.
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: Mutex<Vec<Line>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one already-sanitized line at its chronological position.
    /// A byte-identical duplicate at the same instant is dropped.
    pub fn push(&self, stream: StreamKind, text: String, time: DateTime<Utc>) {
        let line = Line { time, stream, text };
        let mut lines = self.lines.lock();
        let at = lines.partition_point(|l| l.time <= line.time);
        let mut probe = at;
        while probe > 0 && lines[probe - 1].time == line.time {
            if lines[probe - 1] == line {
                return;
            }
            probe -= 1;
        }
        lines.insert(at, line);
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// A window of `count` lines starting at `from`, clamped to the buffer
    pub fn window(&self, from: usize, count: usize) -> Vec<Line> {
        let lines = self.lines.lock();
        let from = from.min(lines.len());
        let count = count.min(lines.len() - from);
        lines[from..from + count].to_vec()
    }

    /// The first `count` lines, clamped to the buffer
    pub fn head(&self, count: usize) -> Vec<Line> {
        let lines = self.lines.lock();
        let count = count.min(lines.len());
        lines[..count].to_vec()
    }

    /// The last `count` lines, clamped to the buffer
    pub fn tail(&self, count: usize) -> Vec<Line> {
        let lines = self.lines.lock();
        let count = count.min(lines.len());
        lines[lines.len() - count..].to_vec()
    }

    /// Drop all captured lines (used by retry)
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}
