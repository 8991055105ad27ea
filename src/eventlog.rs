use chrono::Local;
use parking_lot::Mutex;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only, human-readable activity log. One `timestamp | action` line
/// per event, with an optional ` | details` column.
///
/// Recording never surfaces errors to the caller: a log that cannot be
/// written must not block arming or cancelling a power action.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// One parsed line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub action: String,
    pub details: Option<String>,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    warn!(?err, path = %parent.display(), "Failed to create log directory");
                }
            }
        }
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn record(&self, action: &str, details: Option<&str>) {
        let mut line = format!("{} | {}", Local::now().format(TIME_FORMAT), action);
        if let Some(details) = details {
            line.push_str(" | ");
            line.push_str(details);
        }
        line.push('\n');

        let _guard = self.write_lock.lock();
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = result {
            warn!(?err, path = %self.path.display(), "Failed to append event");
        }
    }

    /// Returns up to `limit` entries, newest first. Lines that do not follow
    /// the `timestamp | action` shape are skipped rather than failing the read.
    pub fn read_recent(&self, limit: usize) -> Vec<LogEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(?err, path = %self.path.display(), "Failed to read event log");
                return Vec::new();
            }
        };
        content
            .lines()
            .rev()
            .filter_map(parse_line)
            .take(limit)
            .collect()
    }
}

fn parse_line(line: &str) -> Option<LogEntry> {
    let mut parts = line.splitn(3, " | ");
    let timestamp = parts.next()?.trim();
    let action = parts.next()?.trim();
    if timestamp.is_empty() || action.is_empty() {
        return None;
    }
    Some(LogEntry {
        timestamp: timestamp.to_string(),
        action: action.to_string(),
        details: parts.next().map(|d| d.trim().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_in_tempdir() -> (tempfile::TempDir, EventLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.log"));
        (dir, log)
    }

    #[test]
    fn record_appends_parseable_lines() {
        let (_dir, log) = log_in_tempdir();
        log.record("Set shutdown timer", Some("Duration: 90 seconds"));
        log.record("Cancelled shutdown timer", None);

        let entries = log.read_recent(10);
        assert_eq!(entries.len(), 2);
        // Newest first.
        assert_eq!(entries[0].action, "Cancelled shutdown timer");
        assert_eq!(entries[0].details, None);
        assert_eq!(entries[1].action, "Set shutdown timer");
        assert_eq!(entries[1].details.as_deref(), Some("Duration: 90 seconds"));
    }

    #[test]
    fn read_recent_honors_limit() {
        let (_dir, log) = log_in_tempdir();
        for i in 0..5 {
            log.record(&format!("event {i}"), None);
        }
        let entries = log.read_recent(2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "event 4");
        assert_eq!(entries[1].action, "event 3");
    }

    #[test]
    fn missing_file_reads_empty() {
        let (_dir, log) = log_in_tempdir();
        assert!(log.read_recent(10).is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (_dir, log) = log_in_tempdir();
        log.record("good event", None);
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"no separator here\n\n")
            .unwrap();

        let entries = log.read_recent(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "good event");
    }

    #[test]
    fn creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("nested").join("events.log"));
        log.record("first", None);
        assert_eq!(log.read_recent(1).len(), 1);
    }
}
