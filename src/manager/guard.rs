//! Primary session supervisor
//!
//! Resumes the home relay session in place after it drops. The manager's
//! reference to the primary client never changes; the guard calls
//! `connect()` again on the same instance with exponential backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::{DisconnectListener, RelayClient};
use crate::config::ReconnectConfig;
use crate::metrics::METRICS;

/// Retry cadence for primary resumption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_backoff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Supervises the primary client
pub struct ReconnectGuard<C> {
    client: Arc<C>,
    policy: ReconnectPolicy,
    shutdown_rx: watch::Receiver<bool>,
    /// A resumption loop is running
    running: AtomicBool,
}

impl<C: RelayClient> ReconnectGuard<C> {
    pub fn new(
        client: Arc<C>,
        shutdown_rx: watch::Receiver<bool>,
        policy: ReconnectPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            policy,
            shutdown_rx,
            running: AtomicBool::new(false),
        })
    }

    /// Disconnect listener that routes to [`on_disconnected`](Self::on_disconnected).
    ///
    /// Holds the guard weakly; the client owns the listener.
    pub fn listener(self: &Arc<Self>) -> DisconnectListener {
        let guard = Arc::downgrade(self);
        Box::new(move || {
            if let Some(guard) = guard.upgrade() {
                guard.on_disconnected();
            }
        })
    }

    /// Start resuming the session unless shutting down or already resuming
    pub fn on_disconnected(self: &Arc<Self>) {
        if *self.shutdown_rx.borrow() {
            debug!("Primary relay session closed during shutdown");
            return;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                self.running.store(false, Ordering::Release);
                warn!("Primary relay session lost outside a runtime; not resuming");
                return;
            }
        };

        warn!("Primary relay session lost, attempting reconnect");
        let guard = self.clone();
        runtime.spawn(async move { guard.resume().await });
    }

    async fn resume(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut backoff = self.policy.initial_backoff;

        loop {
            if *shutdown_rx.borrow() {
                debug!("Reconnect loop stopped by shutdown");
                break;
            }

            METRICS.reconnect_attempt();
            match self.client.connect().await {
                Ok(()) => {
                    if *shutdown_rx.borrow() {
                        debug!("Reconnected during shutdown, closing session");
                        self.client.close();
                        break;
                    }
                    METRICS.reconnect_succeeded();
                    self.client.set_on_disconnect_listener(self.listener());
                    self.running.store(false, Ordering::Release);

                    // A drop before the listener was registered is not reported.
                    if self.client.relay_remote_address().is_err() {
                        warn!("Primary relay session dropped right after reconnect");
                        self.on_disconnected();
                    } else {
                        info!("Reconnected to home relay");
                    }
                    return;
                }
                Err(e) => {
                    warn!(error = %e, retry_in_ms = backoff.as_millis() as u64, "Reconnection failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        debug!("Manager dropped, reconnect loop exiting");
                        break;
                    }
                }
            }
            backoff = self.policy.next_backoff(backoff);
        }

        self.running.store(false, Ordering::Release);
    }
}
