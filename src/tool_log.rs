/// Tool output log shown in the launcher's expandable panel
use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// Oldest entries are dropped past this many lines
pub const LOG_CAPACITY: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    /// Tool the line belongs to, `None` for launcher messages
    pub tool: Option<String>,
    pub text: String,
    pub severity: Severity,
}

impl LogEntry {
    /// `[HH:MM:SS] [tool] text`
    pub fn format_line(&self) -> String {
        let time = self.timestamp.format("%H:%M:%S");
        match &self.tool {
            Some(tool) => format!("[{}] [{}] {}", time, tool, self.text),
            None => format!("[{}] {}", time, self.text),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[derive(Debug, Clone)]
pub struct ToolLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for ToolLog {
    fn default() -> Self {
        ToolLog::with_capacity(LOG_CAPACITY)
    }
}

impl ToolLog {
    pub fn with_capacity(capacity: usize) -> Self {
        ToolLog {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, tool: Option<&str>, text: impl Into<String>, severity: Severity) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            tool: tool.map(str::to_string),
            text: text.into(),
            severity,
        });
    }

    pub fn info(&mut self, tool: Option<&str>, text: impl Into<String>) {
        self.push(tool, text, Severity::Info);
    }

    pub fn error(&mut self, tool: Option<&str>, text: impl Into<String>) {
        self.push(tool, text, Severity::Error);
    }

    /// Separator line written before each launch
    pub fn separator(&mut self, tool: &str) {
        self.info(Some(tool), "=".repeat(50));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// The newest `count` entries, oldest first
    pub fn tail(&self, count: usize) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().skip(self.entries.len().saturating_sub(count))
    }
}
