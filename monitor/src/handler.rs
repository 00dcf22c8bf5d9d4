//! Settlement handlers.
//!
//! A [`SettlementHandler`] receives one call per settled path. Handlers are
//! always invoked outside the aggregator lock, from the scheduler task, and
//! each call is isolated by [`dispatch`]: an error or a panic is logged and
//! the remaining paths of the same flush pass are still delivered.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use tokio::sync::mpsc;
use tracing::{error, trace, warn};

use crate::types::SettledEvent;

/// Receives settled paths.
pub trait SettlementHandler: Send + Sync {
    /// Called once per settlement episode of `path`.
    ///
    /// Implementations should return quickly; they run on the scheduler task
    /// and delay the next tick while they execute.
    ///
    /// # Errors
    ///
    /// Any error is logged by the caller and otherwise ignored.
    fn on_settled(&self, path: &Path) -> anyhow::Result<()>;
}

impl<F> SettlementHandler for F
where
    F: Fn(&Path) -> anyhow::Result<()> + Send + Sync,
{
    fn on_settled(&self, path: &Path) -> anyhow::Result<()> {
        self(path)
    }
}

/// Forwards settlements into a channel without blocking.
///
/// A full or closed channel is reported as a handler error.
impl SettlementHandler for mpsc::Sender<SettledEvent> {
    fn on_settled(&self, path: &Path) -> anyhow::Result<()> {
        self.try_send(SettledEvent::now(path))
            .map_err(|e| anyhow::anyhow!("failed to forward settlement: {e}"))
    }
}

/// Invokes `handler` for `path`, containing any failure.
///
/// Returns `true` if the handler completed successfully.
pub fn dispatch(handler: &dyn SettlementHandler, path: &Path) -> bool {
    trace!(path = %path.display(), "Dispatching settlement");

    match catch_unwind(AssertUnwindSafe(|| handler.on_settled(path))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Settlement handler failed");
            false
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(path = %path.display(), panic = %message, "Settlement handler panicked");
            false
        }
    }
}
