//! Error types
//!
//! Typed failures surfaced by relay clients and the connection manager.

use std::fmt::Display;
use thiserror::Error;

/// A connect attempt to a relay server failed.
///
/// Cloneable so that every caller waiting on the same in-flight dial
/// receives the same failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to dial relay {address}: {reason}")]
pub struct DialError {
    /// Relay server address that was dialed
    pub address: String,
    /// Underlying cause
    pub reason: String,
}

impl DialError {
    pub fn new(address: impl Into<String>, reason: impl Display) -> Self {
        Self {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// The dialing caller went away before the outcome was recorded
    pub(crate) fn abandoned(address: impl Into<String>) -> Self {
        Self::new(address, "dial abandoned before completion")
    }

    /// The manager shut down while the dial was in flight
    pub(crate) fn shut_down(address: impl Into<String>) -> Self {
        Self::new(address, "relay manager shut down")
    }
}

/// A connected client could not open a logical stream.
#[derive(Debug, Error)]
#[error("failed to open stream to peer {peer_key}: {reason}")]
pub struct OpenError {
    /// Peer the stream was addressed to
    pub peer_key: String,
    /// Underlying cause
    pub reason: String,
}

impl OpenError {
    pub fn new(peer_key: impl Into<String>, reason: impl Display) -> Self {
        Self {
            peer_key: peer_key.into(),
            reason: reason.to_string(),
        }
    }
}

/// The relay client has no live session.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("relay client not connected")]
pub struct NotConnected;

/// Errors returned by [`ConnectionManager`](crate::ConnectionManager) operations
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Primary client absent or currently unreachable
    #[error(transparent)]
    NotConnected(#[from] NotConnected),

    /// Foreign relay dial failed
    #[error(transparent)]
    DialFailed(#[from] DialError),

    /// Connected client failed to open the stream
    #[error(transparent)]
    StreamOpenFailed(#[from] OpenError),
}
