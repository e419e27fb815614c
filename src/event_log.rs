use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::utility::{get_system_time_ms, get_timestamp_string};

#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct LogEntry {
    // Time in milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    pub message: String,
}

/// Event log of a device. Only the latest event is published and a bounded
/// history is kept for the export.
pub struct EventLog {
    _latest: String,
    _history: VecDeque<LogEntry>,
    _capacity: usize,
}

impl EventLog {
    /// Create a new event log.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries in the history.
    ///
    /// # Returns
    /// New instance of the event log.
    pub fn new(capacity: usize) -> Self {
        Self {
            _latest: String::new(),
            _history: VecDeque::with_capacity(capacity),
            _capacity: capacity,
        }
    }

    /// Add an event. The oldest entry is dropped if the history is full.
    ///
    /// # Arguments
    /// * `message` - Event message.
    pub fn add_event(&mut self, message: &str) {
        self._latest = String::from(message);

        if self._capacity == 0 {
            return;
        }

        if self._history.len() >= self._capacity {
            self._history.pop_front();
        }
        self._history.push_back(LogEntry {
            timestamp_ms: get_system_time_ms(),
            message: String::from(message),
        });
    }

    /// Get the latest event.
    pub fn latest(&self) -> &str {
        &self._latest
    }

    /// Get the history.
    pub fn history(&self) -> Vec<LogEntry> {
        self._history.iter().cloned().collect()
    }

    /// Export the history to a timestamped JSON file.
    ///
    /// # Arguments
    /// * `dir` - Directory of the exported file.
    /// * `prefix` - Prefix of the file name.
    ///
    /// # Returns
    /// Path of the exported file.
    ///
    /// # Errors
    /// If the directory can not be created or the file can not be written.
    pub fn export(&self, dir: &Path, prefix: &str) -> io::Result<PathBuf> {
        write_timestamped_json(
            dir,
            prefix,
            &json!({"count": self._history.len(), "logs": self.history()}),
        )
    }
}

/// Write the value to a timestamped JSON file:
/// `<dir>/<prefix>_YYYYMMDD_HHMMSS.json`.
///
/// # Arguments
/// * `dir` - Directory of the file.
/// * `prefix` - Prefix of the file name.
/// * `value` - Value to write.
///
/// # Returns
/// Path of the file.
///
/// # Errors
/// If the directory can not be created or the file can not be written.
pub fn write_timestamped_json<T: Serialize>(
    dir: &Path,
    prefix: &str,
    value: &T,
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let filepath = dir.join(format!("{prefix}_{}.json", get_timestamp_string()));
    let content = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    fs::write(&filepath, content)?;

    Ok(filepath)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn test_add_event() {
        let mut event_log = EventLog::new(2);

        assert_eq!(event_log.latest(), "");

        event_log.add_event("a");
        event_log.add_event("b");
        event_log.add_event("c");

        assert_eq!(event_log.latest(), "c");

        let history = event_log.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "b");
        assert_eq!(history[1].message, "c");
    }

    #[test]
    fn test_add_event_zero_capacity() {
        let mut event_log = EventLog::new(0);

        event_log.add_event("a");

        assert_eq!(event_log.latest(), "a");
        assert!(event_log.history().is_empty());
    }

    #[test]
    fn test_export() {
        let dir = tempdir().unwrap();
        let mut event_log = EventLog::new(10);
        event_log.add_event("brake engaged");

        let filepath = event_log
            .export(&dir.path().join("logs"), "reflection_logs")
            .unwrap();

        let name = filepath.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("reflection_logs_"));
        assert!(name.ends_with(".json"));

        let content: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&filepath).unwrap()).unwrap();
        assert_eq!(content["count"], 1);
        assert_eq!(content["logs"][0]["message"], "brake engaged");
    }
}
