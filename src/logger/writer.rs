//! Log writer module
//!
//! Provides thread-safe log writing to files, stdout/stderr, or any other sink.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Log output target
pub enum LogTarget {
    /// Write to stdout
    Stdout,
    /// Write to stderr
    Stderr,
    /// Write to file
    File(File),
    /// Write to an arbitrary sink
    Sink(Box<dyn Write + Send>),
}

impl LogTarget {
    /// File target when a path is given, otherwise the fallback
    fn open_or(path: Option<&str>, fallback: Self) -> io::Result<Self> {
        match path {
            Some(p) => Ok(Self::File(open_log_file(p)?)),
            None => Ok(fallback),
        }
    }

    fn write_line(&mut self, message: &str) {
        // Write errors are dropped
        let _ = match self {
            Self::Stdout => writeln!(io::stdout().lock(), "{message}"),
            Self::Stderr => writeln!(io::stderr().lock(), "{message}"),
            Self::File(f) => writeln!(f, "{message}"),
            Self::Sink(w) => writeln!(w, "{message}"),
        };
    }
}

/// Thread-safe log writer
pub struct LogWriter {
    /// Lifecycle messages, kept out of the access log
    info: Mutex<LogTarget>,
    /// Access log target
    access: Mutex<LogTarget>,
    /// Error log target
    error: Mutex<LogTarget>,
}

impl LogWriter {
    /// Create a log writer with optional file paths
    pub fn open(access_log_file: Option<&str>, error_log_file: Option<&str>) -> io::Result<Self> {
        Ok(Self::new(
            LogTarget::Stdout,
            LogTarget::open_or(access_log_file, LogTarget::Stdout)?,
            LogTarget::open_or(error_log_file, LogTarget::Stderr)?,
        ))
    }

    pub fn new(info: LogTarget, access: LogTarget, error: LogTarget) -> Self {
        Self {
            info: Mutex::new(info),
            access: Mutex::new(access),
            error: Mutex::new(error),
        }
    }

    /// Write info message
    pub fn write_info(&self, message: &str) {
        self.info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_line(message);
    }

    /// Write to access log
    pub fn write_access(&self, message: &str) {
        self.access
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_line(message);
    }

    /// Write to error log
    pub fn write_error(&self, message: &str) {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_line(message);
    }
}

/// Open or create a log file for appending
fn open_log_file(path: &str) -> io::Result<File> {
    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_targets_append() {
        let dir = tempfile::tempdir().unwrap();
        let access = dir.path().join("logs/access.log");
        let access = access.to_str().unwrap();

        let writer = LogWriter::open(Some(access), None).unwrap();
        writer.write_access("first");
        writer.write_access("second");
        drop(writer);

        let writer = LogWriter::open(Some(access), None).unwrap();
        writer.write_access("third");
        drop(writer);

        let content = std::fs::read_to_string(access).unwrap();
        assert_eq!(content, "first\nsecond\nthird\n");
    }

    #[test]
    fn test_info_stays_out_of_access_file() {
        let dir = tempfile::tempdir().unwrap();
        let access = dir.path().join("access.log");
        let access = access.to_str().unwrap();

        let writer = LogWriter::open(Some(access), None).unwrap();
        writer.write_info("[INFO] Listening on: http://127.0.0.1:8000");
        writer.write_access("request line");
        drop(writer);

        let content = std::fs::read_to_string(access).unwrap();
        assert_eq!(content, "request line\n");
    }
}
