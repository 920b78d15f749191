//! Human-readable activity lines emitted by the agent

use std::io::{stdout, Write};

use chrono::Local;

// ANSI escape codes
const CLEAR_LINE: &str = "\x1b[2K\r";
const MAGENTA: &str = "\x1b[95m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Receives activity lines; advisory only, never affects agent behaviour
pub trait OutputSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Prints activity lines to stdout
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink {
    show_timestamps: bool,
}

impl ConsoleSink {
    pub fn new(show_timestamps: bool) -> Self {
        Self { show_timestamps }
    }
}

impl OutputSink for ConsoleSink {
    fn emit(&self, line: &str) {
        let mut out = stdout().lock();
        if self.show_timestamps {
            let _ = writeln!(
                out,
                "{}{}{} {}[agent]{} {}",
                CLEAR_LINE,
                DIM,
                Local::now().format("%H:%M:%S"),
                MAGENTA,
                RESET,
                line
            );
        } else {
            let _ = writeln!(out, "{}{}[agent]{} {}", CLEAR_LINE, MAGENTA, RESET, line);
        }
        let _ = out.flush();
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn emit(&self, _line: &str) {}
}

/// Keeps every line in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

#[cfg(test)]
impl OutputSink for RecordingSink {
    fn emit(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
