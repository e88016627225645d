//! relayconn - relay connection fabric
//!
//! Lets a peer reach other peers through relay servers when no direct path
//! exists. A [`ConnectionManager`] keeps one session to the home relay and
//! dials foreign relays on demand, exactly once per address, removing them
//! again when their sessions drop.

pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod util;

pub use client::{ClientFactory, RelayClient};
pub use config::Config;
pub use error::{DialError, ManagerError, NotConnected, OpenError};
pub use manager::ConnectionManager;

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
