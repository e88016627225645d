//! Relay connection manager
//!
//! Owns the home relay session and a registry of sessions to foreign relays,
//! and routes every stream-open request to the right one.

mod guard;
mod track;

pub use guard::{ReconnectGuard, ReconnectPolicy};
pub use track::Track;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::client::{ClientFactory, RelayClient};
use crate::error::{DialError, ManagerError, NotConnected};
use crate::metrics::METRICS;
use track::TrackState;

/// Stream type produced by a manager over factory `F`
pub type StreamOf<F> = <<F as ClientFactory>::Client as RelayClient>::Stream;

type Registry<C> = DashMap<String, Arc<Track<C>>>;

struct Primary<C> {
    client: Arc<C>,
    // Kept alive for the manager's lifetime; the client only holds it weakly.
    _guard: Arc<ReconnectGuard<C>>,
}

/// Routes peer streams through the home relay or lazily dialed foreign relays
pub struct ConnectionManager<F: ClientFactory> {
    factory: F,
    home_address: String,
    peer_id: String,
    reconnect: ReconnectPolicy,
    primary: RwLock<Option<Primary<F::Client>>>,
    serve_lock: Mutex<()>,
    /// Foreign relay address -> track
    registry: Arc<Registry<F::Client>>,
    shutdown_tx: watch::Sender<bool>,
}

impl<F: ClientFactory> ConnectionManager<F> {
    /// Create a manager homed at `home_address` with local identity `peer_id`
    pub fn new(factory: F, home_address: impl Into<String>, peer_id: impl Into<String>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            factory,
            home_address: home_address.into(),
            peer_id: peer_id.into(),
            reconnect: ReconnectPolicy::default(),
            primary: RwLock::new(None),
            serve_lock: Mutex::new(()),
            registry: Arc::new(DashMap::new()),
            shutdown_tx,
        }
    }

    /// Override the primary resumption policy
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Establish the primary (home) relay session.
    ///
    /// Connect failures are returned as-is; resumption only starts once the
    /// session has been up. Calling again after success is a no-op.
    pub async fn serve(&self) -> Result<(), DialError> {
        let _serving = self.serve_lock.lock().await;
        if self.primary.read().is_some() {
            warn!(home = %self.home_address, "Primary relay already served");
            return Ok(());
        }

        let client = self.factory.new_client(&self.home_address, &self.peer_id);
        let guard = ReconnectGuard::new(
            client.clone(),
            self.shutdown_tx.subscribe(),
            self.reconnect,
        );
        client.set_on_disconnect_listener(guard.listener());

        if let Err(e) = client.connect().await {
            warn!(home = %self.home_address, error = %e, "Failed to connect to home relay");
            return Err(e);
        }

        *self.primary.write() = Some(Primary {
            client,
            _guard: guard,
        });
        info!(home = %self.home_address, peer_id = %self.peer_id, "Home relay connected");
        Ok(())
    }

    /// Open a stream to `peer_key` reachable via the relay at `server_address`
    pub async fn open_conn(
        &self,
        server_address: &str,
        peer_key: &str,
    ) -> Result<StreamOf<F>, ManagerError> {
        let primary = self.primary_client().ok_or(NotConnected)?;

        if self.is_foreign_server(&primary, server_address)? {
            self.open_conn_via(server_address, peer_key).await
        } else {
            let stream = primary.open_conn(peer_key).await.map_err(|e| {
                METRICS.stream_failed();
                e
            })?;
            METRICS.stream_opened();
            Ok(stream)
        }
    }

    /// Address the primary client currently reports
    pub fn relay_address(&self) -> Result<String, NotConnected> {
        self.primary_client()
            .ok_or(NotConnected)?
            .relay_remote_address()
    }

    /// Number of foreign relay entries (dialing or connected)
    pub fn foreign_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop primary resumption and close every session
    pub fn shutdown(&self) {
        info!(foreign = self.registry.len(), "Shutting down relay connections");
        self.shutdown_tx.send_replace(true);

        // Closing fires listeners that remove entries; collect first.
        let foreign: Vec<_> = self
            .registry
            .iter()
            .filter_map(|entry| entry.value().client())
            .collect();
        for client in foreign {
            client.close();
        }

        if let Some(primary) = self.primary_client() {
            primary.close();
        }
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn primary_client(&self) -> Option<Arc<F::Client>> {
        self.primary.read().as_ref().map(|p| p.client.clone())
    }

    /// Re-queried on every call; resumption may change the reported address.
    fn is_foreign_server(&self, primary: &F::Client, address: &str) -> Result<bool, NotConnected> {
        let remote = primary.relay_remote_address().map_err(|e| {
            debug!(address, "Primary relay not connected");
            e
        })?;
        Ok(remote != address)
    }

    async fn open_conn_via(
        &self,
        address: &str,
        peer_key: &str,
    ) -> Result<StreamOf<F>, ManagerError> {
        let existing = self
            .registry
            .get(address)
            .map(|entry| entry.value().clone());
        if let Some(track) = existing {
            return count_open(track.open_conn(peer_key).await);
        }

        let track = Arc::new(Track::new(address));
        let mut slot = track.lock_for_dial().await;

        // Someone may have published between the lookup and here.
        let raced = match self.registry.entry(address.to_string()) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(track.clone());
                None
            }
        };
        if let Some(other) = raced {
            drop(slot);
            return count_open(other.open_conn(peer_key).await);
        }

        METRICS.track_published();
        let pending = PendingTrack {
            registry: &self.registry,
            track: &track,
            armed: true,
        };

        debug!(address, "Dialing foreign relay");
        METRICS.dial_started();
        let client = self.factory.new_client(address, &self.peer_id);
        if let Err(e) = client.connect().await {
            METRICS.dial_failed();
            warn!(address, error = %e, "Foreign relay dial failed");
            *slot = TrackState::Failed(e.clone());
            drop(slot);
            drop(pending);
            return Err(e.into());
        }

        if self.is_shut_down() {
            client.close();
            debug!(address, "Dial finished after shutdown, discarding session");
            *slot = TrackState::Failed(DialError::shut_down(address));
            drop(slot);
            drop(pending);
            return Err(DialError::shut_down(address).into());
        }
        pending.disarm();

        let registry = Arc::downgrade(&self.registry);
        let weak_track = Arc::downgrade(&track);
        let owned_address = address.to_string();
        client.set_on_disconnect_listener(Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                delete_relay_conn(&registry, &owned_address, &weak_track);
            }
        }));

        *slot = TrackState::Connected(client.clone());
        drop(slot);
        info!(address, "Foreign relay connected");

        // Shutdown skips tracks whose lock is held; it may have run meanwhile.
        if self.is_shut_down() {
            client.close();
            delete_relay_conn(&self.registry, address, &Arc::downgrade(&track));
            return Err(DialError::shut_down(address).into());
        }

        // Listener registration is a no-op if the session already dropped.
        if client.relay_remote_address().is_err() {
            delete_relay_conn(&self.registry, address, &Arc::downgrade(&track));
        }

        count_open(client.open_conn(peer_key).await.map_err(ManagerError::from))
    }
}

fn count_open<S>(result: Result<S, ManagerError>) -> Result<S, ManagerError> {
    match &result {
        Ok(_) => METRICS.stream_opened(),
        Err(ManagerError::StreamOpenFailed(_)) => METRICS.stream_failed(),
        Err(_) => {}
    }
    result
}

/// Remove the registry entry for `address` if it still belongs to `track`
fn delete_relay_conn<C>(registry: &Registry<C>, address: &str, track: &Weak<Track<C>>) {
    let removed = registry
        .remove_if(address, |_, current| {
            std::ptr::eq(Arc::as_ptr(current), track.as_ptr())
        })
        .is_some();

    if removed {
        METRICS.track_removed();
        info!(address, "Deleting relay client");
    }
}

/// Unpublishes a track whose dial did not complete successfully.
///
/// Covers both a failed dial and the dialing future being dropped.
struct PendingTrack<'a, C> {
    registry: &'a Registry<C>,
    track: &'a Arc<Track<C>>,
    armed: bool,
}

impl<C> PendingTrack<'_, C> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<C> Drop for PendingTrack<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            delete_relay_conn(self.registry, self.track.address(), &Arc::downgrade(self.track));
        }
    }
}
