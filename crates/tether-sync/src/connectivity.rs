//! Connectivity monitor
//!
//! Holds the current reachability status and publishes transitions. Status
//! updates come from the platform (via [`ConnectivityMonitor::set_status`])
//! or from a periodic probe ([`ConnectivityMonitor::run_probe`]).
//!
//! Consecutive identical statuses are swallowed: listeners and watchers
//! only see real transitions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tether_core::domain::ConnectivityStatus;
use tether_core::ports::IConnectivityProbe;

use crate::observers::{Observers, Subscription};

/// Publishes deduplicated connectivity transitions
pub struct ConnectivityMonitor {
    status: watch::Sender<ConnectivityStatus>,
    listeners: Observers<ConnectivityStatus>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityStatus) -> Self {
        let (status, _) = watch::channel(initial);
        Self {
            status,
            listeners: Observers::new(),
        }
    }

    pub fn current_status(&self) -> ConnectivityStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current_status().is_online()
    }

    /// Record a new status; returns true if it differs from the previous one
    pub fn set_status(&self, next: ConnectivityStatus) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if changed {
            info!(status = %next, "Connectivity changed");
            self.listeners.notify(&next);
        }
        changed
    }

    /// Register a transition listener
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectivityStatus) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    /// Async view of transitions, used by the scheduler
    pub fn watch(&self) -> watch::Receiver<ConnectivityStatus> {
        self.status.subscribe()
    }

    /// Probe reachability every `interval` until `cancel` fires
    pub async fn run_probe(
        self: Arc<Self>,
        probe: Arc<dyn IConnectivityProbe>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    let status = probe.probe().await;
                    debug!(status = %status, "Connectivity probe");
                    self.set_status(status);
                }
            }
        }
        debug!("Connectivity probe stopped");
    }
}
