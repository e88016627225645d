//! Per-address connection record

use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::client::RelayClient;
use crate::error::{DialError, ManagerError};

/// Outcome of the dial guarded by a [`Track`]
pub(crate) enum TrackState<C> {
    /// Creator is dialing and holds the write lock
    Dialing,
    Connected(Arc<C>),
    Failed(DialError),
}

/// Lock-plus-client record for one foreign relay address.
///
/// The creator takes the write lock before the track is published and holds
/// it across the whole dial. Everyone else reads, so they either wait for the
/// dial or see its final outcome. The state is written only by the creator.
pub struct Track<C> {
    address: String,
    state: RwLock<TrackState<C>>,
}

impl<C> Track<C> {
    pub(crate) fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            state: RwLock::new(TrackState::Dialing),
        }
    }

    /// Relay address this track guards
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl<C: RelayClient> Track<C> {
    /// Exclusive access for the creating caller
    pub(crate) async fn lock_for_dial(&self) -> RwLockWriteGuard<'_, TrackState<C>> {
        self.state.write().await
    }

    /// Open a stream over the tracked client, waiting for an in-flight dial
    pub(crate) async fn open_conn(&self, peer_key: &str) -> Result<C::Stream, ManagerError> {
        let state = self.state.read().await;
        match &*state {
            TrackState::Connected(client) => Ok(client.open_conn(peer_key).await?),
            TrackState::Failed(err) => Err(err.clone().into()),
            // Creator dropped the lock without recording an outcome.
            TrackState::Dialing => Err(DialError::abandoned(self.address.as_str()).into()),
        }
    }

    /// Connected client, if the dial finished successfully. Never waits.
    pub fn client(&self) -> Option<Arc<C>> {
        let state = self.state.try_read().ok()?;
        match &*state {
            TrackState::Connected(client) => Some(client.clone()),
            _ => None,
        }
    }
}
