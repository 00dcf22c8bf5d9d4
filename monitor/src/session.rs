//! Watch session lifecycle.
//!
//! A [`WatchSession`] owns one [`DebounceAggregator`], one
//! [`FlushScheduler`] and one [`NotificationSource`], and ties them to the
//! caller's [`SettlementHandler`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use stillwater_monitor::{Config, ExtensionFilter, WatchSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("/var/log/app", ExtensionFilter::parse("*.log")?);
//!     let session = WatchSession::from_config(&config, |path: &Path| -> anyhow::Result<()> {
//!         println!("settled: {}", path.display());
//!         Ok(())
//!     })?;
//!
//!     session.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     session.stop().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::aggregator::{DebounceAggregator, DEFAULT_QUIESCENCE_MS};
use crate::config::Config;
use crate::error::{MonitorError, Result};
use crate::handler::SettlementHandler;
use crate::scheduler::{FlushScheduler, DEFAULT_TICK_MS};
use crate::source::{NotificationSource, NotifySource, SourceSink};

/// Timing parameters for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// How often pending paths are re-evaluated.
    pub tick_interval: Duration,
    /// Minimum quiet time before a path settles.
    pub quiescence_window: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            quiescence_window: Duration::from_millis(DEFAULT_QUIESCENCE_MS),
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval,
            quiescence_window: config.quiescence_window,
        }
    }
}

/// Lifecycle state of a [`WatchSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet started.
    Created,
    /// Receiving events.
    Running,
    /// Stopped for good.
    Stopped,
}

/// One watch session: source, aggregator, scheduler and handler.
///
/// # Thread Safety
///
/// All methods take `&self`; a session can be shared in an `Arc` and stopped
/// from any task or thread.
pub struct WatchSession<S: NotificationSource = NotifySource> {
    source: Mutex<S>,
    aggregator: Arc<DebounceAggregator>,
    handler: Arc<dyn SettlementHandler>,
    options: SessionOptions,
    scheduler: Mutex<Option<Arc<FlushScheduler>>>,
    state: Mutex<SessionState>,
}

impl WatchSession<NotifySource> {
    /// Validates `config` and builds a session over the native watcher.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Config`] if the configuration is invalid.
    pub fn from_config<H>(config: &Config, handler: H) -> Result<Self>
    where
        H: SettlementHandler + 'static,
    {
        config.validate()?;
        Ok(Self::new(
            NotifySource::from_config(config),
            handler,
            SessionOptions::from(config),
        ))
    }
}

impl<S: NotificationSource> WatchSession<S> {
    /// Creates a session in the [`SessionState::Created`] state.
    #[must_use]
    pub fn new<H>(source: S, handler: H, options: SessionOptions) -> Self
    where
        H: SettlementHandler + 'static,
    {
        Self {
            source: Mutex::new(source),
            aggregator: Arc::new(DebounceAggregator::new(options.quiescence_window)),
            handler: Arc::new(handler),
            options,
            scheduler: Mutex::new(None),
            state: Mutex::new(SessionState::Created),
        }
    }

    /// Starts the scheduler and subscribes to the source.
    ///
    /// Must be called from within a Tokio runtime. Calling it on a running
    /// session does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::SessionClosed`] after [`stop`](Self::stop), or
    /// the source's error if subscribing fails (the session then stays in
    /// [`SessionState::Created`]).
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Running => return Ok(()),
            SessionState::Stopped => return Err(MonitorError::SessionClosed),
            SessionState::Created => {}
        }

        let scheduler = Arc::new(FlushScheduler::spawn(
            Arc::clone(&self.aggregator),
            Arc::clone(&self.handler),
            self.options.tick_interval,
        ));
        let sink = SourceSink::new(Arc::clone(&self.aggregator), scheduler.waker());

        if let Err(e) = self.source.lock().subscribe(sink) {
            scheduler.signal_shutdown();
            return Err(e);
        }

        *self.scheduler.lock() = Some(scheduler);
        *state = SessionState::Running;

        info!(
            tick_ms = self.options.tick_interval.as_millis(),
            quiescence_ms = self.options.quiescence_window.as_millis(),
            "Watch session started"
        );
        Ok(())
    }

    /// Stops the session.
    ///
    /// In order: stops the scheduler and waits for it, clears pending paths,
    /// releases the source. Once this returns no handler call is running or
    /// will start. Idempotent, and safe on a session that never started.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), SessionState::Stopped);

        let scheduler = self.scheduler.lock().clone();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }

        self.aggregator.clear();
        self.source.lock().unsubscribe();

        if previous == SessionState::Stopped {
            debug!("Watch session already stopped");
        } else {
            info!("Watch session stopped");
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the session is running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Number of paths with unsettled activity.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.aggregator.pending_count()
    }

    /// Whether the flush scheduler is currently flagged active.
    #[must_use]
    pub fn is_scheduler_active(&self) -> bool {
        self.aggregator.is_scheduler_active()
    }

    /// The timing parameters in use.
    #[must_use]
    pub fn options(&self) -> SessionOptions {
        self.options
    }
}

impl<S: NotificationSource> Drop for WatchSession<S> {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.get_mut().take() {
            scheduler.signal_shutdown();
        }
        self.aggregator.clear();
        self.source.get_mut().unsubscribe();
    }
}

impl<S: NotificationSource> std::fmt::Debug for WatchSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("state", &self.state())
            .field("options", &self.options)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
