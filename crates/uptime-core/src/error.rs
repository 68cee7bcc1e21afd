use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the uptime monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The TCP connection could not be established or timed out.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The server answered with a truncated or malformed response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The uptime log could not be read, written or rewritten.
    #[error("Log file error at {path}: {source}")]
    LogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single uptime log line did not match the line grammar.
    #[error("Malformed log line ({reason}): {line}")]
    LogParse { line: String, reason: String },

    /// A target address string could not be turned into a host and port.
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    /// A timestamp string did not match `YYYY-MM-DD HH:MM:SS`.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Wrap an I/O error that happened while touching the uptime log.
    pub fn log_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LogIo {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the monitor crates.
pub type Result<T> = std::result::Result<T, MonitorError>;
