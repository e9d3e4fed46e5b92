//! Sync scheduler - turns triggers into sync rounds
//!
//! The [`SyncScheduler`] owns the background loop that decides when the
//! [`SyncOrchestrator`] runs.
//!
//! ## Triggers
//!
//! ```text
//! connectivity → Online ──┐
//! periodic interval ──────┼──→ SyncScheduler ──→ SyncOrchestrator::sync()
//! request_sync() ─────────┘
//! ```
//!
//! Triggers that arrive while a round is running are not lost: an explicit
//! request is remembered and served after the round, and the orchestrator's
//! single-flight guard keeps overlapping callers out. Cancellation is only
//! observed between rounds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tether_core::domain::ConnectivityStatus;

use crate::connectivity::ConnectivityMonitor;
use crate::orchestrator::{SyncOrchestrator, SyncOutcome};

/// Cloneable handle for requesting a sync from anywhere
#[derive(Clone)]
pub struct SchedulerHandle {
    requests: Arc<Notify>,
}

impl SchedulerHandle {
    /// Ask for a sync round as soon as possible
    pub fn request_sync(&self) {
        debug!("Sync requested");
        self.requests.notify_one();
    }
}

/// Background loop running sync rounds on connectivity, timer and request
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    connectivity: watch::Receiver<ConnectivityStatus>,
    requests: Arc<Notify>,
    poll_interval: Duration,
}

impl SyncScheduler {
    /// Create a scheduler and the handle used to request syncs
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        connectivity: &ConnectivityMonitor,
        poll_interval: Duration,
    ) -> (Self, SchedulerHandle) {
        let requests = Arc::new(Notify::new());
        info!(
            poll_secs = poll_interval.as_secs(),
            "Creating sync scheduler"
        );

        let scheduler = Self {
            orchestrator,
            connectivity: connectivity.watch(),
            requests: Arc::clone(&requests),
            poll_interval,
        };
        (scheduler, SchedulerHandle { requests })
    }

    /// Main loop; returns when `cancel` fires, after any running round
    ///
    /// The first interval tick fires immediately, so a scheduler started
    /// online syncs right away.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Sync scheduler starting");

        let mut poll_timer = tokio::time::interval(self.poll_interval);
        poll_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                changed = self.connectivity.changed() => {
                    if changed.is_err() {
                        info!("Connectivity monitor dropped, scheduler shutting down");
                        break;
                    }
                    let status = *self.connectivity.borrow_and_update();
                    if !status.is_online() {
                        continue;
                    }
                    "connectivity"
                }

                _ = poll_timer.tick() => "interval",

                _ = self.requests.notified() => "request",
            };

            debug!(trigger, "Sync triggered");
            // A round is never dropped halfway: the server may already hold
            // a write whose outbox item is not yet removed.
            if let SyncOutcome::Completed(report) = self.orchestrator.sync().await {
                debug!(trigger, pushed = report.pushed, pulled = report.pulled, "Scheduled sync finished");
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        info!("Sync scheduler stopped");
    }
}
