//! Error types for the Stillwater monitor.
//!
//! Only setup can fail. Once a session is running, source faults and handler
//! faults are logged and absorbed; they never surface as errors here.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while setting up or starting a watch session.
///
/// # Examples
///
/// ```ignore
/// use stillwater_monitor::error::MonitorError;
///
/// fn start() -> Result<(), MonitorError> {
///     let config = Config::from_env()?;
///     config.validate()?;
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The native watch mechanism could not be set up.
    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    /// The session was already stopped and cannot be started again.
    #[error("watch session already stopped")]
    SessionClosed,
}

/// Invalid configuration, reported before watching begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A setting has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The file-name filter is malformed.
    #[error("invalid filter '{pattern}': {reason}")]
    InvalidFilter { pattern: String, reason: String },

    /// The root path does not exist.
    #[error("watch directory does not exist: {0}")]
    RootNotFound(PathBuf),

    /// The root path exists but is not a directory.
    #[error("watch path is not a directory: {0}")]
    RootNotDirectory(PathBuf),
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
