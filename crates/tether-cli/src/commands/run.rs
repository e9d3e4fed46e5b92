//! Run command - Long-lived sync agent
//!
//! Provides the `tether run` CLI command which keeps the local store in sync
//! until interrupted:
//!
//! ```text
//! reachability probe ──→ ConnectivityMonitor ──→ SyncScheduler ──→ sync rounds
//!                                  │                    ▲
//!                                  ▼                    │ request_sync()
//!                          push channel keeper ─────────┘
//! ```
//!
//! SIGINT/SIGTERM cancel a shared `CancellationToken`. The probe and push
//! loops stop at their next await point, a running sync round is finished
//! first, and the push channel is closed before exit.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_sync::{SchedulerHandle, SyncContext};

use crate::engine::{load_config, Engine};
use crate::output::{get_formatter, OutputFormat};

/// First delay before reopening a dropped push channel
const RECONNECT_MIN: Duration = Duration::from_secs(1);
/// Upper bound on the reconnect delay
const RECONNECT_MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Do not open the push channel; rely on periodic pulls only
    #[arg(long)]
    pub no_push: bool,
}

impl RunCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let engine = Engine::open(load_config(config_path)?).await?;

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal(signal_token).await;
        });

        formatter.success(&format!(
            "Sync agent running against {} (Ctrl+C to stop)",
            engine.config.server.base_url
        ));
        run_agent(&engine, !self.no_push, shutdown).await;

        let pending = engine.context.pending_count().await?;
        engine.close().await;
        formatter.success(&format!("Sync agent stopped, {pending} pending"));
        Ok(())
    }
}

/// Drive probe, scheduler and push channel until `shutdown` fires
pub async fn run_agent(engine: &Engine, push: bool, shutdown: CancellationToken) {
    let ctx = &engine.context;
    let poll_interval = Duration::from_secs(engine.config.sync.poll_interval);
    let probe_interval = Duration::from_secs(engine.config.connectivity.probe_interval_secs);

    let _completed = ctx.on_sync_completed(|report| {
        info!(
            pulled = report.pulled,
            pushed = report.pushed,
            failed = report.failed,
            rejected = report.rejected,
            aborted = report.aborted,
            duration_ms = report.duration_ms,
            "Sync round finished"
        );
    });
    let _connectivity = ctx.on_connectivity_changed(|status| {
        info!(status = %status, "Connectivity changed");
    });
    let _auth = ctx.on_auth_required(|err| {
        warn!(error = %err, "Server refused the credentials");
    });
    let _rejected = ctx.on_item_rejected(|item| {
        warn!(
            item = %item.id,
            op = %item.op_type,
            collection = %item.collection,
            error = item.last_error.as_deref().unwrap_or(""),
            "Change rejected by the server"
        );
    });

    let (scheduler, handle) = ctx.scheduler(poll_interval);
    let probe = ctx
        .connectivity()
        .clone()
        .run_probe(engine.probe_handle(), probe_interval, shutdown.clone());

    info!(
        poll_interval_secs = poll_interval.as_secs(),
        probe_interval_secs = probe_interval.as_secs(),
        push,
        "Sync agent started"
    );

    if push {
        tokio::join!(
            scheduler.run(shutdown.clone()),
            probe,
            keep_push_open(ctx, handle, shutdown.clone()),
        );
        ctx.disconnect_push().await;
    } else {
        tokio::join!(scheduler.run(shutdown.clone()), probe);
    }

    info!("Sync agent stopped");
}

/// Keep the push channel open while online
///
/// Each successful (re)connect requests a sync round, since events sent
/// while the channel was down are only recovered by a pull. Failed attempts
/// back off exponentially; a connectivity change retries right away.
async fn keep_push_open(ctx: &SyncContext, scheduler: SchedulerHandle, shutdown: CancellationToken) {
    let mut connectivity = ctx.connectivity().watch();
    let mut delay = RECONNECT_MIN;

    loop {
        if ctx.connectivity().is_online() {
            match ctx.connect_push().await {
                Ok(()) => {
                    delay = RECONNECT_MIN;
                    scheduler.request_sync();
                    if let Some(channel) = ctx.push_channel() {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = channel.wait_disconnected() => {
                                warn!("Push channel closed by the server");
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!(error = %err, retry_in_ms = delay.as_millis() as u64, "Push channel unavailable");
                    delay = next_delay(delay);
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                delay = RECONNECT_MIN;
            }
        }
    }
    debug!("Push keeper stopped");
}

fn next_delay(current: Duration) -> Duration {
    (current * 2).min(RECONNECT_MAX)
}

/// Waits for SIGTERM or SIGINT and cancels the token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}
