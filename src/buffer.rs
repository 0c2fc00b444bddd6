use crate::format::format_message;
use crate::record::{LogArgs, LogRow, Severity};
use std::collections::HashSet;

/// Records captured for one in-flight request.
///
/// Holds the rows in arrival order and the set of call sites whose
/// backtrace has already been reported. Both are only ever reset
/// together, through [`RequestLogBuffer::clear`] or
/// [`RequestLogBuffer::take_rows`].
#[derive(Debug, Default)]
pub struct RequestLogBuffer {
    rows: Vec<LogRow>,
    seen: HashSet<String>,
}

/// `file:line` identifier used to deduplicate backtraces.
pub fn backtrace_key(file: &str, line: u32) -> String {
    format!("{}:{}", file, line)
}

impl RequestLogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format a record and append it. The backtrace is only attached the
    /// first time a given call site logs within this buffer's lifetime.
    pub fn record(
        &mut self,
        severity: Severity,
        template: &str,
        args: LogArgs,
        file: &str,
        line: u32,
    ) {
        let entry = format_message(template, args);
        let key = backtrace_key(file, line);
        let backtrace = if self.seen.contains(&key) {
            None
        } else {
            self.seen.insert(key.clone());
            Some(key)
        };

        self.rows.push(LogRow {
            entry,
            backtrace,
            label: severity.label(),
        });
    }

    pub fn rows(&self) -> &[LogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop all rows and forget every reported call site.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.seen.clear();
    }

    /// Move the rows out, leaving the buffer cleared.
    pub fn take_rows(&mut self) -> Vec<LogRow> {
        self.seen.clear();
        std::mem::take(&mut self.rows)
    }
}
