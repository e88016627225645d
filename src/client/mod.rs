//! Relay session clients
//!
//! A client owns one session to a single relay server and multiplexes
//! logical streams to peers over it. The connection manager only talks to
//! clients through [`RelayClient`], so the transport is pluggable.

mod notifier;
pub mod protocol;
mod quic;
mod stream;

pub use notifier::{DisconnectListener, DisconnectNotifier};
pub use quic::{QuicClientFactory, QuicRelayClient, QuicSettings};
pub use stream::RelayStream;

use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{DialError, NotConnected, OpenError};

/// One session to a single relay server.
pub trait RelayClient: Send + Sync + 'static {
    /// Logical bidirectional stream to a peer
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Establish the session. May be called again after the session drops.
    fn connect(&self) -> impl Future<Output = Result<(), DialError>> + Send;

    /// Open one multiplexed stream to `peer_key` over this session
    fn open_conn(
        &self,
        peer_key: &str,
    ) -> impl Future<Output = Result<Self::Stream, OpenError>> + Send;

    /// Resolved address of the relay server, as `ip:port` or the dialed name
    fn relay_remote_address(&self) -> Result<String, NotConnected>;

    /// Register the single observer fired the first time the session drops.
    ///
    /// Registering after the session has already dropped is a no-op.
    fn set_on_disconnect_listener(&self, listener: DisconnectListener);

    /// Tear down the session; fires the disconnect listener if connected
    fn close(&self);
}

/// Builds clients bound to a relay address and local identity.
pub trait ClientFactory: Send + Sync + 'static {
    type Client: RelayClient;

    fn new_client(&self, server_address: &str, peer_id: &str) -> Arc<Self::Client>;
}
