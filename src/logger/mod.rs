//! Logger module
//!
//! Provides logging utilities for the HTTP server including:
//! - Server lifecycle logging
//! - Access logging with multiple formats, timestamped in a configured timezone
//! - Error and warning logging
//! - File-based logging support
//!
//! A single [`Logger`] is built at startup and shared through `AppState`.

mod clock;
mod format;
pub mod writer;

pub use clock::Timezone;
pub use format::AccessLogEntry;
pub use writer::LogWriter;

use crate::config::{Config, LoggingConfig};
use chrono::{DateTime, FixedOffset};
use std::net::SocketAddr;

pub struct Logger {
    writer: LogWriter,
    timezone: Timezone,
    access_log_format: String,
}

impl Logger {
    /// Open the configured log targets
    pub fn from_config(config: &LoggingConfig) -> std::io::Result<Self> {
        let writer = LogWriter::open(
            config.access_log_file.as_deref(),
            config.error_log_file.as_deref(),
        )?;
        Ok(Self::new(writer, config.timezone, &config.access_log_format))
    }

    pub fn new(writer: LogWriter, timezone: Timezone, access_log_format: &str) -> Self {
        Self {
            writer,
            timezone,
            access_log_format: access_log_format.to_string(),
        }
    }

    /// Current time in the configured timezone
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.timezone.now()
    }

    pub fn info(&self, message: &str) {
        self.writer.write_info(&format!("[INFO] {message}"));
    }

    pub fn warn(&self, message: &str) {
        self.writer.write_error(&format!("[WARN] {message}"));
    }

    pub fn error(&self, message: &str) {
        self.writer.write_error(&format!("[ERROR] {message}"));
    }

    /// Log formatted access log entry
    pub fn access(&self, entry: &AccessLogEntry) {
        self.writer
            .write_access(&entry.format(&self.access_log_format));
    }

    pub fn log_server_start(&self, addr: &SocketAddr, config: &Config) {
        self.info("======================================");
        self.info(&format!("Listening on: http://{addr}"));
        self.info(&format!("Public directory: {}", config.static_files.public_dir));
        self.info(&format!("Log timezone: {}", config.logging.timezone));
        if let Some(workers) = config.server.workers {
            self.info(&format!("Worker threads: {workers}"));
        }
        let origins = config.http.allowed_origins();
        if origins.is_empty() {
            self.info("CORS: disabled");
        } else {
            self.info(&format!("CORS origins: {}", origins.join(", ")));
        }
        if let Some(header) = config.http.trusted_proxy_header() {
            self.info(&format!("Client IP from header: {header}"));
        }
        if let Some(ref path) = config.logging.access_log_file {
            self.info(&format!("Access log: {path}"));
        }
        if let Some(ref path) = config.logging.error_log_file {
            self.info(&format!("Error log: {path}"));
        }
        self.info("======================================");
    }

    pub fn log_connection_error(&self, err: &impl std::fmt::Debug) {
        self.error(&format!("Failed to serve connection: {err:?}"));
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{capture, capture_all};
    use super::*;

    #[test]
    fn test_levels_route_to_targets() {
        let (logger, info, access, error) = capture_all(Timezone::default());
        logger.info("started");
        logger.warn("slow");
        logger.error("broken");
        assert_eq!(info.lines(), vec!["[INFO] started"]);
        assert!(access.lines().is_empty());
        assert_eq!(error.lines(), vec!["[WARN] slow", "[ERROR] broken"]);
    }

    #[test]
    fn test_access_uses_configured_format() {
        let (logger, access, _) = capture(Timezone::Named(chrono_tz::UTC));
        let entry = AccessLogEntry::new(
            "10.0.0.1".to_string(),
            "GET".to_string(),
            "/".to_string(),
            logger.now(),
        );
        logger.access(&entry);
        let lines = access.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] - 10.0.0.1 - 200 GET / -"));
    }
}
