use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for structured execution events.
///
/// Implementations must never fail the caller; a log line that cannot be
/// written is dropped.
pub trait ExecutionLogger {
    fn log(&self, level: LogLevel, event: &str, message: &str);

    fn info(&self, event: &str, message: &str) {
        self.log(LogLevel::Info, event, message);
    }

    fn warn(&self, event: &str, message: &str) {
        self.log(LogLevel::Warn, event, message);
    }

    fn error(&self, event: &str, message: &str) {
        self.log(LogLevel::Error, event, message);
    }
}

pub fn execution_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/tfsandbox.log")
}

/// Appends one JSON object per event to `<state_root>/logs/tfsandbox.log`.
#[derive(Debug, Clone)]
pub struct FileExecutionLog {
    path: PathBuf,
    reservation: String,
}

impl FileExecutionLog {
    pub fn new(state_root: &Path, reservation: impl Into<String>) -> Self {
        Self {
            path: execution_log_path(state_root),
            reservation: reservation.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExecutionLogger for FileExecutionLog {
    fn log(&self, level: LogLevel, event: &str, message: &str) {
        let payload = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": level.as_str(),
            "event": event,
            "reservation": self.reservation,
            "message": message,
        });
        let Ok(line) = serde_json::to_string(&payload) else {
            return;
        };
        if let Some(parent) = self.path.parent() {
            if fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let Ok(mut file) = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        else {
            return;
        };
        let _ = writeln!(file, "{line}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub event: String,
    pub message: String,
}

/// Keeps events in memory; handy for asserting on what a component reported.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.event).collect()
    }

    pub fn contains_event(&self, event: &str) -> bool {
        self.entries().iter().any(|e| e.event == event)
    }
}

impl ExecutionLogger for MemoryLogger {
    fn log(&self, level: LogLevel, event: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                level,
                event: event.to_string(),
                message: message.to_string(),
            });
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl ExecutionLogger for NullLogger {
    fn log(&self, _level: LogLevel, _event: &str, _message: &str) {}
}
