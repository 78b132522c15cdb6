//! Heartbeat Monitor
//!
//! Periodically pings every connection and reaps the ones that did not
//! answer the previous ping. An unresponsive peer is gone within two
//! periods.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::hub::ConnectionHub;

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to the running heartbeat task
pub struct HeartbeatMonitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Start the heartbeat task for a hub
    ///
    /// The task stops when the hub shuts down or when [`stop`](Self::stop)
    /// is called, whichever comes first.
    pub fn start(hub: Arc<ConnectionHub>, period: Duration) -> Self {
        let cancel = hub.shutdown_token().child_token();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!("Heartbeat monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = hub.heartbeat_sweep().await;
                        tracing::debug!(
                            pinged = report.pinged,
                            terminated = report.terminated.len(),
                            "Heartbeat sweep"
                        );
                    }
                }
            }
        });

        tracing::info!(period_secs = period.as_secs_f64(), "Heartbeat monitor started");
        Self { cancel, handle }
    }

    /// Cancel the periodic task and wait for it to finish
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Heartbeat task failed");
        }
    }

    /// Whether the task is still running
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
