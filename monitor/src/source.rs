//! Raw notification sources.
//!
//! A [`NotificationSource`] observes a directory tree and pushes
//! [`RawEvent`]s (and non-fatal faults) into a [`SourceSink`]. The sink
//! feeds the [`DebounceAggregator`] and wakes the flush scheduler when the
//! aggregator asks for it.
//!
//! [`NotifySource`] is the native implementation built on the [`notify`]
//! crate. Its callback runs on notify's own thread and is kept lightweight:
//! it translates, filters and ingests, and never touches the file system.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::aggregator::{Activation, DebounceAggregator};
use crate::config::Config;
use crate::error::Result;
use crate::filter::ExtensionFilter;
use crate::types::{RawEvent, RawEventKind};

/// Something that observes a directory tree and reports raw changes.
pub trait NotificationSource: Send {
    /// Starts delivering events into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying watch cannot be established.
    fn subscribe(&mut self, sink: SourceSink) -> Result<()>;

    /// Stops delivering events and releases the underlying watch.
    ///
    /// Must be idempotent and safe to call without a prior `subscribe`.
    fn unsubscribe(&mut self);
}

/// The receiving end handed to a [`NotificationSource`].
///
/// Cheap to clone; may be used from any thread.
#[derive(Clone)]
pub struct SourceSink {
    aggregator: Arc<DebounceAggregator>,
    wake: Arc<Notify>,
}

impl SourceSink {
    pub(crate) fn new(aggregator: Arc<DebounceAggregator>, wake: Arc<Notify>) -> Self {
        Self { aggregator, wake }
    }

    /// Ingests one raw event, waking the scheduler if it was idle.
    pub fn event(&self, event: RawEvent) {
        if self.aggregator.ingest(event) == Activation::Started {
            self.wake.notify_one();
        }
    }

    /// Reports a non-fatal source fault. Ingestion continues.
    pub fn fault(&self, message: impl fmt::Display) {
        warn!(error = %message, "Notification source fault");
    }
}

impl fmt::Debug for SourceSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSink")
            .field("pending", &self.aggregator.pending_count())
            .finish_non_exhaustive()
    }
}

/// Notification source backed by the platform's native watcher.
#[derive(Debug)]
pub struct NotifySource {
    root: PathBuf,
    filter: ExtensionFilter,
    recursive: bool,

    /// Kept alive to maintain the watch subscription. Dropping it stops
    /// the OS watch.
    watcher: Option<RecommendedWatcher>,
}

impl NotifySource {
    /// Creates an unsubscribed source for `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, filter: ExtensionFilter, recursive: bool) -> Self {
        Self {
            root: root.into(),
            filter,
            recursive,
            watcher: None,
        }
    }

    /// Creates a source from a validated configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.root.clone(), config.filter.clone(), config.recursive)
    }

    /// The watched directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a native watch is currently held.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.watcher.is_some()
    }
}

impl NotificationSource for NotifySource {
    fn subscribe(&mut self, sink: SourceSink) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }

        let filter = self.filter.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                handle_notify_event(res, &filter, &sink);
            },
            notify::Config::default(),
        )?;

        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&self.root, mode)?;

        info!(
            root = %self.root.display(),
            filter = %self.filter,
            recursive = self.recursive,
            "Started file watch"
        );

        self.watcher = Some(watcher);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if self.watcher.take().is_some() {
            info!(root = %self.root.display(), "Stopped file watch");
        }
    }
}

/// Handles one callback from the notify crate.
fn handle_notify_event(
    res: notify::Result<Event>,
    filter: &ExtensionFilter,
    sink: &SourceSink,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            sink.fault(e);
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    let now = Instant::now();
    for raw in translate(&event, now) {
        if let Some(raw) = apply_filter(raw, filter) {
            sink.event(raw);
        }
    }
}

/// Maps a notify event to zero or more raw events.
fn translate(event: &Event, now: Instant) -> Vec<RawEvent> {
    let per_path = |kind: RawEventKind| -> Vec<RawEvent> {
        event
            .paths
            .iter()
            .map(|path| RawEvent::at(kind.clone(), path.clone(), now))
            .collect()
    };

    match event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
            Vec::new()
        }
        EventKind::Create(_) => per_path(RawEventKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![RawEvent::at(
                RawEventKind::Renamed { from: from.clone() },
                to.clone(),
                now,
            )],
            _ => {
                debug!(paths = ?event.paths, "Rename without a path pair, treating as change");
                per_path(RawEventKind::Changed)
            }
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => per_path(RawEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => per_path(RawEventKind::Created),
        EventKind::Modify(_) => per_path(RawEventKind::Changed),
        EventKind::Remove(_) => per_path(RawEventKind::Deleted),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Drops events for paths outside the filter.
///
/// A rename that moves a matching file to a non-matching name is reported as
/// the deletion of the old name.
fn apply_filter(event: RawEvent, filter: &ExtensionFilter) -> Option<RawEvent> {
    match event.kind {
        RawEventKind::Renamed { ref from } if !filter.matches(&event.path) => {
            if filter.matches(from) {
                Some(RawEvent::at(
                    RawEventKind::Deleted,
                    from.clone(),
                    event.observed_at,
                ))
            } else {
                None
            }
        }
        _ if filter.matches(&event.path) => Some(event),
        _ => None,
    }
}
