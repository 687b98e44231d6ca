//! Crate-level error type.
//!
//! The detection core itself never fails: a detector that misbehaves is
//! contained at the evaluation boundary inside the engine. Errors here come
//! from the edges: settings loading, the engine handle and the transport.

use std::path::PathBuf;

/// Every fallible operation in this crate returns this error.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The settings file could not be read.
    #[error("failed to read settings file {}: {source}", .path.display())]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`crate::settings::Settings`].
    #[error("invalid settings file {}: {source}", .path.display())]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A request body could not be decoded.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine task has exited; no further commands are accepted.
    #[error("detection engine is not running")]
    EngineStopped,

    /// Socket-level failure in the HTTP / WebSocket transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP request could not be parsed.
    #[error("malformed HTTP request: {0}")]
    Http(String),
}

/// Shorthand used across the crate.
pub type Result<T> = std::result::Result<T, MonitorError>;
