//! Periodic flush scheduler.
//!
//! The scheduler is a single background task that asks the
//! [`DebounceAggregator`] to flush once per tick while there is pending
//! activity, and parks otherwise.
//!
//! # States
//!
//! - **Idle**: parked on a [`Notify`]; no timer exists.
//! - **Running**: drives a [`tokio::time::Interval`]; every tick flushes the
//!   aggregator and dispatches settled paths to the handler.
//!
//! The aggregator decides the transitions. `ingest` reports
//! [`Activation::Started`](crate::aggregator::Activation::Started) when it
//! flips the active flag, and the caller then calls [`FlushScheduler::wake`].
//! A flush that leaves the pending set empty clears the flag under the same
//! lock and the task drops its interval and parks again. `Notify` keeps a
//! permit when nobody is waiting, so a wake that races with the task parking
//! is never lost.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::aggregator::DebounceAggregator;
use crate::handler::{dispatch, SettlementHandler};

/// Default tick interval in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 10_000;

/// Handle to the background flush task.
#[derive(Debug)]
pub struct FlushScheduler {
    wake: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    /// Spawns the scheduler task in the Idle state.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(
        aggregator: Arc<DebounceAggregator>,
        handler: Arc<dyn SettlementHandler>,
        tick: Duration,
    ) -> Self {
        let wake = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_scheduler_loop(
            aggregator,
            handler,
            tick,
            Arc::clone(&wake),
            shutdown_rx,
        ));

        Self {
            wake,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Moves the scheduler from Idle to Running.
    ///
    /// Waking an already running scheduler is harmless.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Returns a cloneable handle that can wake the scheduler from any thread.
    #[must_use]
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Requests shutdown without waiting for the task to finish.
    ///
    /// No handler call starts after the task observes the request.
    pub fn signal_shutdown(&self) {
        // Err only means the task already exited.
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the task and waits for it to exit.
    ///
    /// Safe to call any number of times, concurrently too: every caller
    /// returns only after the task has exited.
    pub async fn shutdown(&self) {
        self.signal_shutdown();

        let mut task = self.task.lock().await;
        if let Some(task) = task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Flush scheduler task ended abnormally");
            }
            debug!("Flush scheduler stopped");
        }
    }

    /// Whether the background task is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        // Locked only while a shutdown is in progress.
        self.task
            .try_lock()
            .map_or(true, |task| task.as_ref().is_some_and(|t| !t.is_finished()))
    }
}

/// Alternates between parking and ticking until shutdown.
async fn run_scheduler_loop(
    aggregator: Arc<DebounceAggregator>,
    handler: Arc<dyn SettlementHandler>,
    tick: Duration,
    wake: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(
        tick_ms = tick.as_millis(),
        quiescence_ms = aggregator.quiescence().as_millis(),
        "Starting flush scheduler"
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            () = wake.notified() => {}
        }

        debug!("Flush scheduler running");
        if !tick_until_idle(&aggregator, handler.as_ref(), tick, &mut shutdown_rx).await {
            break;
        }
        debug!("Flush scheduler idle");
    }

    debug!("Flush scheduler loop terminated");
}

/// Ticks until a flush leaves nothing pending.
///
/// Returns `false` if shutdown was requested meanwhile.
async fn tick_until_idle(
    aggregator: &DebounceAggregator,
    handler: &dyn SettlementHandler,
    tick: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => return false,
            _ = ticker.tick() => {}
        }

        let outcome = match catch_unwind(AssertUnwindSafe(|| aggregator.flush(Instant::now()))) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Flush pass panicked, retrying on next tick");
                continue;
            }
        };

        if !outcome.settled.is_empty() {
            debug!(settled = outcome.settled.len(), "Paths settled");
        }

        for path in &outcome.settled {
            if *shutdown_rx.borrow() {
                return false;
            }
            dispatch(handler, path);
        }

        if outcome.idle {
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Activation;
    use crate::types::RawEvent;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use tokio::time::sleep;

    type Seen = Arc<Mutex<Vec<PathBuf>>>;

    fn recording_handler() -> (Arc<dyn SettlementHandler>, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn SettlementHandler> = Arc::new(move |path: &Path| -> anyhow::Result<()> {
            sink.lock().push(path.to_path_buf());
            Ok(())
        });
        (handler, seen)
    }

    fn ingest(agg: &DebounceAggregator, scheduler: &FlushScheduler, event: RawEvent) {
        if agg.ingest(event) == Activation::Started {
            scheduler.wake();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_on_first_tick_after_quiescence() {
        let agg = Arc::new(DebounceAggregator::with_default_quiescence());
        let (handler, seen) = recording_handler();
        let scheduler =
            FlushScheduler::spawn(Arc::clone(&agg), handler, Duration::from_millis(DEFAULT_TICK_MS));

        ingest(&agg, &scheduler, RawEvent::changed("/w/a.log"));
        sleep(Duration::from_millis(10)).await;
        ingest(&agg, &scheduler, RawEvent::changed("/w/a.log"));

        sleep(Duration::from_secs(9)).await;
        assert!(seen.lock().is_empty(), "No flush before the first tick");

        sleep(Duration::from_secs(2)).await;
        assert_eq!(*seen.lock(), vec![PathBuf::from("/w/a.log")]);
        assert!(!agg.is_scheduler_active());
        assert_eq!(agg.pending_count(), 0);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_spurious_settlements_after_idle() {
        let agg = Arc::new(DebounceAggregator::with_default_quiescence());
        let (handler, seen) = recording_handler();
        let scheduler = FlushScheduler::spawn(Arc::clone(&agg), handler, Duration::from_secs(1));

        ingest(&agg, &scheduler, RawEvent::created("/w/a.log"));
        sleep(Duration::from_secs(30)).await;

        assert_eq!(seen.lock().len(), 1);
        assert!(scheduler.is_alive());

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_idle() {
        let agg = Arc::new(DebounceAggregator::with_default_quiescence());
        let (handler, seen) = recording_handler();
        let scheduler = FlushScheduler::spawn(Arc::clone(&agg), handler, Duration::from_secs(1));

        ingest(&agg, &scheduler, RawEvent::created("/w/a.log"));
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(seen.lock().len(), 1);
        assert!(!agg.is_scheduler_active());

        ingest(&agg, &scheduler, RawEvent::changed("/w/a.log"));
        assert!(agg.is_scheduler_active());
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(seen.lock().len(), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_then_create_while_ticking() {
        let agg = Arc::new(DebounceAggregator::with_default_quiescence());
        let (handler, seen) = recording_handler();
        let scheduler = FlushScheduler::spawn(Arc::clone(&agg), handler, Duration::from_secs(1));

        ingest(&agg, &scheduler, RawEvent::created("/w/a.tmp"));
        sleep(Duration::from_millis(100)).await;
        ingest(&agg, &scheduler, RawEvent::deleted("/w/a.tmp"));
        ingest(&agg, &scheduler, RawEvent::created("/w/b.log"));

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(*seen.lock(), vec![PathBuf::from("/w/b.log")]);
        assert!(!agg.is_scheduler_active());
        assert_eq!(agg.pending_count(), 0);

        // Parked with no stale wake-up: nothing becomes active on its own.
        sleep(Duration::from_secs(5)).await;
        assert!(!agg.is_scheduler_active());
        assert_eq!(seen.lock().len(), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_activity_waits_for_next_tick() {
        let agg = Arc::new(DebounceAggregator::new(Duration::from_millis(500)));
        let (handler, seen) = recording_handler();
        let scheduler = FlushScheduler::spawn(Arc::clone(&agg), handler, Duration::from_secs(1));

        ingest(&agg, &scheduler, RawEvent::created("/w/a.log"));
        sleep(Duration::from_millis(800)).await;
        ingest(&agg, &scheduler, RawEvent::changed("/w/a.log"));

        // Tick at 1s sees activity 200ms old
        sleep(Duration::from_millis(400)).await;
        assert!(seen.lock().is_empty());
        assert!(agg.is_scheduler_active());

        // Tick at 2s settles it
        sleep(Duration::from_secs(1)).await;
        assert_eq!(seen.lock().len(), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_handler_does_not_block_other_paths() {
        let agg = Arc::new(DebounceAggregator::with_default_quiescence());
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = move |path: &Path| -> anyhow::Result<()> {
            if path.ends_with("bad.log") {
                panic!("bad handler");
            }
            sink.lock().push(path.to_path_buf());
            Ok(())
        };
        let scheduler = FlushScheduler::spawn(Arc::clone(&agg), Arc::new(handler), Duration::from_secs(1));

        for name in ["/w/a.log", "/w/bad.log", "/w/c.log"] {
            ingest(&agg, &scheduler, RawEvent::changed(name));
        }
        sleep(Duration::from_secs(2)).await;

        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec![PathBuf::from("/w/a.log"), PathBuf::from("/w/c.log")]);
        assert!(scheduler.is_alive(), "Scheduler survives handler panics");

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent_and_final() {
        let agg = Arc::new(DebounceAggregator::with_default_quiescence());
        let (handler, seen) = recording_handler();
        let scheduler = FlushScheduler::spawn(Arc::clone(&agg), handler, Duration::from_secs(1));

        ingest(&agg, &scheduler, RawEvent::changed("/w/a.log"));
        scheduler.shutdown().await;
        scheduler.shutdown().await;
        assert!(!scheduler.is_alive());

        sleep(Duration::from_secs(5)).await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_while_idle() {
        let agg = Arc::new(DebounceAggregator::with_default_quiescence());
        let (handler, _seen) = recording_handler();
        let scheduler = FlushScheduler::spawn(agg, handler, Duration::from_secs(10));

        tokio::time::timeout(Duration::from_secs(1), scheduler.shutdown())
            .await
            .expect("shutdown should not hang");
    }
}
