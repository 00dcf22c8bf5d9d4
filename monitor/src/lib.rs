//! Stillwater Monitor - reports files once they stop changing.
//!
//! This crate watches a directory tree and turns the noisy stream of raw
//! file system notifications into one "settled" notification per file, sent
//! once the file has been quiet for a short quiescence window.
//!
//! # Overview
//!
//! ```text
//! NotificationSource ──RawEvent──▶ DebounceAggregator ◀──flush── FlushScheduler
//!                                                                    │
//!                                                   SettlementHandler ◀┘
//! ```
//!
//! A file that is created and deleted again before it settles is never
//! reported. A rename moves any pending activity to the new name.
//!
//! # Modules
//!
//! - [`types`]: Raw and settled event types
//! - [`aggregator`]: Pending set and settlement detection
//! - [`scheduler`]: Periodic flush task
//! - [`session`]: Start/stop orchestration
//! - [`source`]: Notification source seam and the native `notify` source
//! - [`handler`]: Settlement handler seam and fault isolation
//! - [`filter`]: File-name glob filter
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations

pub mod aggregator;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod types;

pub use aggregator::{Activation, DebounceAggregator, FlushOutcome, DEFAULT_QUIESCENCE_MS};
pub use config::Config;
pub use error::{ConfigError, MonitorError, Result};
pub use filter::ExtensionFilter;
pub use handler::{dispatch, SettlementHandler};
pub use scheduler::{FlushScheduler, DEFAULT_TICK_MS};
pub use session::{SessionOptions, SessionState, WatchSession};
pub use source::{NotificationSource, NotifySource, SourceSink};
pub use types::{RawEvent, RawEventKind, SettledEvent};
