//! Repeating timer owned by the reporter.
//!
//! [`arm`] spawns a background loop that fires `tick` once per period,
//! starting one period after arming. Each tick runs as its own task so a
//! slow or failing tick never delays the schedule or escapes the loop.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Handle to an armed timer. Dropping it without [`TickerHandle::disarm`]
/// leaves the loop running.
#[derive(Debug)]
pub struct TickerHandle {
    /// Background loop task.
    handle: JoinHandle<()>,
    /// Shutdown signal for the loop.
    shutdown_tx: watch::Sender<bool>,
}

impl TickerHandle {
    /// Stop future ticks. Ticks already fired keep running to completion.
    pub fn disarm(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
        debug!("ticker disarmed");
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Fire `tick` every `period` until the returned handle is disarmed.
pub fn arm<F, Fut>(period: Duration, tick: F) -> TickerHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tokio::spawn(tick());
                }
                _ = shutdown.changed() => {
                    debug!("ticker loop shutting down");
                    break;
                }
            }
        }
    });

    debug!(period_ms = period.as_millis() as u64, "ticker armed");
    TickerHandle {
        handle,
        shutdown_tx,
    }
}
