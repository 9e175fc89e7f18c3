//! Reconciliation scheduler
//!
//! Drives the reconciler on a fixed period and on change notifications
//! from the target watcher. Cycles never overlap: the loop awaits each
//! cycle before selecting the next trigger, and extra triggers coalesce
//! into a single pending slot (a depth-1 channel), preserving the
//! single-writer invariant.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handle for requesting an out-of-band reconciliation cycle
///
/// Notifications are coalesced: while one cycle runs, at most one more is
/// queued; further notifications are dropped because the queued cycle will
/// observe their cause anyway.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Requests a cycle as soon as the current one (if any) finishes
    pub fn notify(&self) {
        // Full queue means a cycle is already pending
        let _ = self.tx.try_send(());
    }
}

/// Periodic, coalescing, cancellable reconciliation loop
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    period: Duration,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    /// Creates the scheduler plus the handle watchers use to request cycles
    pub fn new(
        reconciler: Arc<Reconciler>,
        period: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, TriggerHandle) {
        let (tx, trigger_rx) = mpsc::channel(1);
        (
            Self { reconciler, period, trigger_rx, shutdown_rx },
            TriggerHandle { tx },
        )
    }

    /// Runs until shutdown is signalled or a fatal error surfaces.
    ///
    /// Transient cycle errors (discovery outage, conflict exhaustion) are
    /// logged and absorbed; the target is left as-is until the next trigger.
    /// The shutdown signal also aborts an in-flight cycle: an interrupted
    /// cycle has either completed its write or never issued it.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Starting sync loop with period {:?}", self.period);

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Periodic trigger");
                }
                notified = self.trigger_rx.recv() => {
                    if notified.is_none() {
                        // All trigger handles dropped; periodic sync continues
                        debug!("Trigger channel closed");
                        continue;
                    }
                    debug!("Change-notification trigger");
                    // Fold the next periodic tick into this cycle
                    ticker.reset();
                }
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping sync loop");
                    return Ok(());
                }
            }

            let cycle = self.reconciler.reconcile_once();
            tokio::select! {
                result = cycle => match result {
                    Ok(outcome) => debug!("Cycle finished: {:?}", outcome),
                    Err(e) if e.is_fatal() => {
                        return Err(e);
                    }
                    Err(e) => {
                        warn!("Cycle failed (will retry on next trigger): {}", e);
                    }
                },
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received during cycle, aborting");
                    return Ok(());
                }
            }
        }
    }
}
