//! Configuration module for the Stillwater monitor.
//!
//! This module handles parsing configuration from environment variables. The
//! command-line shell layers its own arguments on top.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `STILLWATER_ROOT` | No | current directory | Directory to watch |
//! | `STILLWATER_FILTER` | No | `*` | File-name glob, e.g. `*.log` |
//! | `STILLWATER_TICK_MS` | No | 10000 | Flush tick interval (must be > 0) |
//! | `STILLWATER_QUIESCENCE_MS` | No | 50 | Quiet time before a file counts as settled |
//! | `STILLWATER_RECURSIVE` | No | `true` | Watch subdirectories too |
//!
//! # Example
//!
//! ```no_run
//! use stillwater_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! println!("Watching: {}", config.root.display());
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::aggregator::DEFAULT_QUIESCENCE_MS;
use crate::error::ConfigError;
use crate::filter::ExtensionFilter;
use crate::scheduler::DEFAULT_TICK_MS;

/// Configuration for a watch session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory to watch.
    pub root: PathBuf,

    /// File-name filter applied to every raw event.
    pub filter: ExtensionFilter,

    /// How often pending paths are re-evaluated.
    pub tick_interval: Duration,

    /// Minimum quiet time before a path is reported.
    pub quiescence_window: Duration,

    /// Whether subdirectories are watched.
    pub recursive: bool,
}

impl Config {
    /// Creates a configuration with default timings.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, filter: ExtensionFilter) -> Self {
        Self {
            root: root.into(),
            filter,
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            quiescence_window: Duration::from_millis(DEFAULT_QUIESCENCE_MS),
            recursive: true,
        }
    }

    /// Creates a new `Config` by parsing environment variables.
    ///
    /// Does not touch the file system; call [`Config::validate`] before use.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `STILLWATER_FILTER` is not a valid single-glob pattern
    /// - `STILLWATER_TICK_MS` or `STILLWATER_QUIESCENCE_MS` is not an integer
    /// - `STILLWATER_RECURSIVE` is not a recognised boolean
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: STILLWATER_ROOT (default: current directory)
        let root = env::var("STILLWATER_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        // Optional: STILLWATER_FILTER (default: all files)
        let filter = match env::var("STILLWATER_FILTER") {
            Ok(val) => ExtensionFilter::parse(&val)?,
            Err(_) => ExtensionFilter::match_all(),
        };

        let tick_interval = parse_millis("STILLWATER_TICK_MS", DEFAULT_TICK_MS)?;
        let quiescence_window = parse_millis("STILLWATER_QUIESCENCE_MS", DEFAULT_QUIESCENCE_MS)?;

        // Optional: STILLWATER_RECURSIVE (default: true)
        let recursive = match env::var("STILLWATER_RECURSIVE") {
            Ok(val) => parse_bool(&val).ok_or_else(|| ConfigError::InvalidValue {
                key: "STILLWATER_RECURSIVE".to_string(),
                message: format!("expected true/false, got '{val}'"),
            })?,
            Err(_) => true,
        };

        Ok(Self {
            root,
            filter,
            tick_interval,
            quiescence_window,
            recursive,
        })
    }

    /// Checks the settings that can only be judged against the file system
    /// or against each other.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the root does not exist or is not a
    /// directory, or if the tick interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "tick_interval".to_string(),
                message: "tick interval must be greater than 0".to_string(),
            });
        }

        let metadata = std::fs::metadata(&self.root)
            .map_err(|_| ConfigError::RootNotFound(self.root.clone()))?;
        if !metadata.is_dir() {
            return Err(ConfigError::RootNotDirectory(self.root.clone()));
        }

        Ok(())
    }
}

/// Reads a millisecond duration from `key`, falling back to `default`.
fn parse_millis(key: &str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected non-negative integer, got '{val}'"),
            }),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all STILLWATER_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("STILLWATER_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, _) in env::vars().filter(|(k, _)| k.starts_with("STILLWATER_")) {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_defaults() {
        with_clean_env(|| {
            let config = Config::from_env().expect("should parse empty environment");

            assert_eq!(config.root, PathBuf::from("."));
            assert_eq!(config.filter.pattern(), "*");
            assert_eq!(config.tick_interval, Duration::from_secs(10));
            assert_eq!(config.quiescence_window, Duration::from_millis(50));
            assert!(config.recursive);
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("STILLWATER_ROOT", "/srv/data");
            env::set_var("STILLWATER_FILTER", "*.csv");
            env::set_var("STILLWATER_TICK_MS", "250");
            env::set_var("STILLWATER_QUIESCENCE_MS", "75");
            env::set_var("STILLWATER_RECURSIVE", "no");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.root, PathBuf::from("/srv/data"));
            assert_eq!(config.filter.pattern(), "*.csv");
            assert_eq!(config.tick_interval, Duration::from_millis(250));
            assert_eq!(config.quiescence_window, Duration::from_millis(75));
            assert!(!config.recursive);
        });
    }

    #[test]
    #[serial]
    fn test_invalid_tick() {
        with_clean_env(|| {
            env::set_var("STILLWATER_TICK_MS", "soon");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "STILLWATER_TICK_MS"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_invalid_filter() {
        with_clean_env(|| {
            env::set_var("STILLWATER_FILTER", "*.[");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidFilter { .. }));
        });
    }

    #[test]
    #[serial]
    fn test_invalid_recursive() {
        with_clean_env(|| {
            env::set_var("STILLWATER_RECURSIVE", "sometimes");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "STILLWATER_RECURSIVE" && message.contains("sometimes")
            ));
        });
    }

    #[test]
    fn test_validate_accepts_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path(), ExtensionFilter::match_all());

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let config = Config::new("/nonexistent/stillwater", ExtensionFilter::match_all());

        assert!(matches!(
            config.validate(),
            Err(ConfigError::RootNotFound(_))
        ));
    }

    #[test]
    fn test_validate_rejects_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();

        let config = Config::new(&file, ExtensionFilter::match_all());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RootNotDirectory(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(dir.path(), ExtensionFilter::match_all());
        config.tick_interval = Duration::ZERO;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
