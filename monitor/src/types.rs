//! Event types for the Stillwater monitor.
//!
//! A [`RawEvent`] is what a notification source hands to the aggregator: one
//! unprocessed observation about a path. A [`SettledEvent`] is what the
//! caller eventually receives once that path has stopped changing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// The kind of change a raw notification describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEventKind {
    /// A file appeared at the event path.
    Created,

    /// The contents or metadata of the file at the event path changed.
    Changed,

    /// The file previously at `from` now lives at the event path.
    Renamed {
        /// Path the file was renamed away from.
        from: PathBuf,
    },

    /// The file at the event path was removed.
    Deleted,
}

/// A single unprocessed notification from a notification source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Path the event applies to (the rename target for renames).
    pub path: PathBuf,

    /// What happened to the path.
    pub kind: RawEventKind,

    /// When the source observed the event.
    pub observed_at: Instant,
}

impl RawEvent {
    /// Creates an event with an explicit observation time.
    #[must_use]
    pub fn at(kind: RawEventKind, path: impl Into<PathBuf>, observed_at: Instant) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at,
        }
    }

    /// A `Created` event observed now.
    #[must_use]
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::at(RawEventKind::Created, path, Instant::now())
    }

    /// A `Changed` event observed now.
    #[must_use]
    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self::at(RawEventKind::Changed, path, Instant::now())
    }

    /// A `Renamed` event (`from` -> `to`) observed now.
    #[must_use]
    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::at(
            RawEventKind::Renamed { from: from.into() },
            to,
            Instant::now(),
        )
    }

    /// A `Deleted` event observed now.
    #[must_use]
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::at(RawEventKind::Deleted, path, Instant::now())
    }
}

/// A path that has stopped changing for at least the quiescence window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettledEvent {
    /// The settled path.
    pub path: PathBuf,

    /// Wall-clock time the settlement was detected.
    pub settled_at: DateTime<Utc>,
}

impl SettledEvent {
    /// Creates a settlement for `path` stamped with the current time.
    #[must_use]
    pub fn now(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            settled_at: Utc::now(),
        }
    }
}
