//! Scripted in-memory relay clients for manager tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;

use relayconn::client::{ClientFactory, DisconnectListener, DisconnectNotifier, RelayClient};
use relayconn::manager::ReconnectPolicy;
use relayconn::{DialError, NotConnected, OpenError};

#[derive(Default)]
struct Network {
    dials: Mutex<HashMap<String, usize>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    unreachable_peers: Mutex<HashSet<String>>,
    flaky: Mutex<HashSet<String>>,
    clients: Mutex<Vec<Arc<MockClient>>>,
}

impl Network {
    fn record_dial(&self, address: &str) {
        *self.dials.lock().entry(address.to_string()).or_default() += 1;
    }

    fn delay_for(&self, address: &str) -> Option<Duration> {
        self.delays.lock().get(address).copied()
    }

    fn is_failing(&self, address: &str) -> bool {
        self.failing.lock().contains(address)
    }

    fn is_flaky(&self, address: &str) -> bool {
        self.flaky.lock().contains(address)
    }

    fn is_unreachable(&self, peer_key: &str) -> bool {
        self.unreachable_peers.lock().contains(peer_key)
    }
}

/// Factory handing out [`MockClient`]s that share one scripted network
#[derive(Clone, Default)]
pub struct MockFactory {
    net: Arc<Network>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every dial to `address` take `delay`
    pub fn set_delay(&self, address: &str, delay: Duration) {
        self.net.delays.lock().insert(address.to_string(), delay);
    }

    pub fn clear_delay(&self, address: &str) {
        self.net.delays.lock().remove(address);
    }

    /// Make dials to `address` fail with "connection refused"
    pub fn set_failing(&self, address: &str, failing: bool) {
        let mut set = self.net.failing.lock();
        if failing {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    /// Make stream opens to `peer_key` fail on every relay
    pub fn set_unreachable(&self, peer_key: &str) {
        self.net.unreachable_peers.lock().insert(peer_key.to_string());
    }

    /// Make sessions to `address` drop as soon as they come up
    pub fn set_flaky(&self, address: &str) {
        self.net.flaky.lock().insert(address.to_string());
    }

    /// Connect attempts made against `address`
    pub fn dial_count(&self, address: &str) -> usize {
        self.net.dials.lock().get(address).copied().unwrap_or(0)
    }

    /// Every client built for `address`, oldest first
    pub fn clients_for(&self, address: &str) -> Vec<Arc<MockClient>> {
        self.net
            .clients
            .lock()
            .iter()
            .filter(|c| c.address == address)
            .cloned()
            .collect()
    }

    /// Most recent client built for `address`
    pub fn client_for(&self, address: &str) -> Arc<MockClient> {
        self.clients_for(address)
            .pop()
            .unwrap_or_else(|| panic!("no client built for {address}"))
    }
}

impl ClientFactory for MockFactory {
    type Client = MockClient;

    fn new_client(&self, server_address: &str, peer_id: &str) -> Arc<MockClient> {
        let client = Arc::new(MockClient {
            address: server_address.to_string(),
            peer_id: peer_id.to_string(),
            net: self.net.clone(),
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            notifier: DisconnectNotifier::new(),
            reported_address: Mutex::new(None),
            opened: Mutex::new(Vec::new()),
        });
        self.net.clients.lock().push(client.clone());
        client
    }
}

/// In-memory relay session; streams are echo pipes
pub struct MockClient {
    address: String,
    peer_id: String,
    net: Arc<Network>,
    connected: AtomicBool,
    generation: AtomicU64,
    notifier: DisconnectNotifier,
    reported_address: Mutex<Option<String>>,
    opened: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Peers streams were opened to, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Report a different remote address from now on (e.g. after failover)
    pub fn report_address(&self, address: &str) {
        *self.reported_address.lock() = Some(address.to_string());
    }

    /// Simulate the session dropping
    pub fn drop_session(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.notifier.fire(self.generation.load(Ordering::SeqCst));
        }
    }
}

impl RelayClient for MockClient {
    type Stream = DuplexStream;

    async fn connect(&self) -> Result<(), DialError> {
        self.net.record_dial(&self.address);
        if let Some(delay) = self.net.delay_for(&self.address) {
            tokio::time::sleep(delay).await;
        }
        if self.net.is_failing(&self.address) {
            return Err(DialError::new(self.address.as_str(), "connection refused"));
        }

        let generation = self.notifier.rearm();
        self.generation.store(generation, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        if self.net.is_flaky(&self.address) {
            self.drop_session();
        }
        Ok(())
    }

    async fn open_conn(&self, peer_key: &str) -> Result<DuplexStream, OpenError> {
        if !self.is_connected() {
            return Err(OpenError::new(peer_key, NotConnected));
        }
        if self.net.is_unreachable(peer_key) {
            return Err(OpenError::new(peer_key, "peer unknown to relay"));
        }
        self.opened.lock().push(peer_key.to_string());

        let (local, remote) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(remote);
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
        });
        Ok(local)
    }

    fn relay_remote_address(&self) -> Result<String, NotConnected> {
        if !self.is_connected() {
            return Err(NotConnected);
        }
        let reported = self.reported_address.lock().clone();
        Ok(reported.unwrap_or_else(|| self.address.clone()))
    }

    fn set_on_disconnect_listener(&self, listener: DisconnectListener) {
        self.notifier.set_listener(listener);
    }

    fn close(&self) {
        self.drop_session();
    }
}

/// Short backoff so reconnect tests finish quickly
pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
