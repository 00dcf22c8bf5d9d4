//! Debounce aggregator for coalescing raw file events.
//!
//! The aggregator turns a bursty stream of [`RawEvent`]s into one settlement
//! per path. It keeps a pending set mapping each path with unsettled activity
//! to the time that activity was last seen.
//!
//! # Architecture
//!
//! Rather than arming one timer per path, a single periodic scan (driven by
//! the [`FlushScheduler`](crate::scheduler::FlushScheduler)) calls
//! [`DebounceAggregator::flush`] and collects every path whose last activity
//! is at least the quiescence window old. Worst-case settlement latency is
//! therefore `tick interval + quiescence window`.
//!
//! The pending set and the "scheduler is active" flag live behind one mutex.
//! Every decision to start or stop the scheduler is made in the same critical
//! section as the mutation that caused it, so "last entry removed" and
//! "scheduler stopped" can never be observed apart.
//!
//! A `Deleted` event drops the pending entry without emitting anything: a file
//! created and removed before it settles (editor temp files, atomic-save
//! scratch files) produces no output at all.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::types::{RawEvent, RawEventKind};

/// Default quiescence window in milliseconds.
pub const DEFAULT_QUIESCENCE_MS: u64 = 50;

/// What an `ingest` call did to the scheduler-active flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The flag flipped from inactive to active; the scheduler must be woken.
    Started,
    /// The scheduler was already active.
    AlreadyActive,
    /// Nothing became pending (deletes, ingests after shutdown).
    Idle,
}

/// Result of one flush pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Paths that settled in this pass, in no particular order.
    pub settled: Vec<PathBuf>,
    /// `true` if the pending set is empty after this pass and the scheduler
    /// flag was cleared in the same critical section.
    pub idle: bool,
}

#[derive(Debug, Default)]
struct PendingState {
    pending: HashMap<PathBuf, Instant>,
    scheduler_active: bool,
    closed: bool,
}

impl PendingState {
    /// Marks the scheduler active if needed and reports the transition.
    fn activate(&mut self) -> Activation {
        if self.scheduler_active {
            Activation::AlreadyActive
        } else {
            self.scheduler_active = true;
            Activation::Started
        }
    }
}

/// Coalesces raw events into per-path settlements.
///
/// # Thread Safety
///
/// `ingest` is called from notification-source threads and `flush` from the
/// scheduler task; both only hold the internal lock for a hash map operation
/// or a single scan, never across caller code.
#[derive(Debug)]
pub struct DebounceAggregator {
    state: Mutex<PendingState>,
    quiescence: Duration,
}

impl DebounceAggregator {
    /// Creates an aggregator with the given quiescence window.
    #[must_use]
    pub fn new(quiescence: Duration) -> Self {
        Self {
            state: Mutex::new(PendingState::default()),
            quiescence,
        }
    }

    /// Creates an aggregator with the default 50 ms quiescence window.
    #[must_use]
    pub fn with_default_quiescence() -> Self {
        Self::new(Duration::from_millis(DEFAULT_QUIESCENCE_MS))
    }

    /// Returns the configured quiescence window.
    #[must_use]
    pub fn quiescence(&self) -> Duration {
        self.quiescence
    }

    /// Records one raw event.
    ///
    /// - `Created`/`Changed` refresh the path's last-seen time.
    /// - `Renamed` moves the entry from the old path to the new one in a
    ///   single step, refreshing it.
    /// - `Deleted` drops the entry, if any, without a settlement.
    ///
    /// Never invokes caller code. The returned [`Activation`] tells the caller
    /// whether the scheduler has to be woken.
    pub fn ingest(&self, event: RawEvent) -> Activation {
        let mut state = self.state.lock();

        if state.closed {
            trace!(path = %event.path.display(), "Aggregator closed, dropping event");
            return Activation::Idle;
        }

        match event.kind {
            RawEventKind::Created | RawEventKind::Changed => {
                trace!(path = %event.path.display(), kind = ?event.kind, "Refreshing pending entry");
                state.pending.insert(event.path, event.observed_at);
                state.activate()
            }
            RawEventKind::Renamed { from } => {
                trace!(
                    from = %from.display(),
                    to = %event.path.display(),
                    "Moving pending entry"
                );
                state.pending.remove(&from);
                state.pending.insert(event.path, event.observed_at);
                state.activate()
            }
            RawEventKind::Deleted => {
                // The flag stays set: the scheduler is still ticking and only
                // `flush` may mark it idle.
                if state.pending.remove(&event.path).is_some() {
                    debug!(path = %event.path.display(), "Deleted before settling, discarded");
                }
                Activation::Idle
            }
        }
    }

    /// Removes and returns every path that has been quiet for at least the
    /// quiescence window as of `now`.
    ///
    /// When the pass leaves the pending set empty the scheduler flag is
    /// cleared before the lock is released.
    pub fn flush(&self, now: Instant) -> FlushOutcome {
        let mut state = self.state.lock();
        let quiescence = self.quiescence;

        let mut settled = Vec::new();
        state.pending.retain(|path, last_seen| {
            if now.saturating_duration_since(*last_seen) >= quiescence {
                settled.push(path.clone());
                false
            } else {
                true
            }
        });

        let idle = state.pending.is_empty();
        if idle {
            state.scheduler_active = false;
        }

        trace!(
            settled = settled.len(),
            remaining = state.pending.len(),
            idle,
            "Flush pass complete"
        );

        FlushOutcome { settled, idle }
    }

    /// Empties the pending set, clears the scheduler flag and refuses any
    /// further events.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        state.scheduler_active = false;
        state.closed = true;

        if dropped > 0 {
            debug!(dropped, "Cleared unsettled entries");
        }
    }

    /// Number of paths with unsettled activity.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether `path` currently has unsettled activity.
    #[must_use]
    pub fn is_pending(&self, path: &std::path::Path) -> bool {
        self.state.lock().pending.contains_key(path)
    }

    /// Whether the scheduler is flagged as active.
    #[must_use]
    pub fn is_scheduler_active(&self) -> bool {
        self.state.lock().scheduler_active
    }
}

impl Default for DebounceAggregator {
    fn default() -> Self {
        Self::with_default_quiescence()
    }
}
