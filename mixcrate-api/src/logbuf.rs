//! In-memory log ring buffer
//!
//! A fixed-size circular buffer of scheduler log lines with a monotonic
//! sequence number, consumed by the operator dashboard. Single writer (the
//! scheduler), readers copy bounded snapshots; the lock is never held across
//! I/O.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MIN_CAPACITY: usize = 10;
pub const MAX_CAPACITY: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Monotonic over the buffer's lifetime, survives eviction
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl LogEntry {
    pub fn format(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.level.as_str(),
            self.message
        )
    }
}

struct Inner {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_seq: u64,
}

pub struct LogBuffer {
    inner: Mutex<Inner>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                capacity: capacity.clamp(MIN_CAPACITY, MAX_CAPACITY),
                next_seq: 0,
            }),
        }
    }

    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.lock().expect("log buffer poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.entries.len() == inner.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(LogEntry {
            seq,
            timestamp: Utc::now(),
            level,
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    /// Most recent entries, oldest first, at most `count`
    pub fn snapshot(&self, count: Option<usize>) -> Vec<LogEntry> {
        let inner = self.inner.lock().expect("log buffer poisoned");
        let take = count.unwrap_or(inner.entries.len()).min(inner.entries.len());
        inner
            .entries
            .iter()
            .skip(inner.entries.len() - take)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("log buffer poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().expect("log buffer poisoned").entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_keeps_sequence_monotonic() {
        let buffer = LogBuffer::new(10);
        for i in 0..25 {
            buffer.info(format!("line {i}"));
        }
        let snapshot = buffer.snapshot(None);
        assert_eq!(snapshot.len(), 10);
        assert_eq!(snapshot.first().unwrap().seq, 15);
        assert_eq!(snapshot.last().unwrap().seq, 24);
        assert!(snapshot.windows(2).all(|w| w[1].seq == w[0].seq + 1));
    }

    #[test]
    fn snapshot_is_bounded() {
        let buffer = LogBuffer::new(100);
        for i in 0..50 {
            buffer.info(format!("line {i}"));
        }
        let tail = buffer.snapshot(Some(5));
        assert_eq!(tail.len(), 5);
        assert_eq!(tail.last().unwrap().message, "line 49");
    }

    #[test]
    fn capacity_is_clamped() {
        let tiny = LogBuffer::new(1);
        for i in 0..20 {
            tiny.info(format!("{i}"));
        }
        assert_eq!(tiny.len(), MIN_CAPACITY);
    }
}
