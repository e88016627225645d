//! QUIC relay client
//!
//! Establishes and resumes the QUIC session to one relay server and opens
//! logical peer streams over it.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use quinn::{Connection, Endpoint, IdleTimeout, VarInt};
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::notifier::{DisconnectListener, DisconnectNotifier};
use super::stream::RelayStream;
use super::{ClientFactory, RelayClient};
use crate::config::QuicConfig;
use crate::error::{DialError, NotConnected, OpenError};

/// Transport settings shared by every relay client
#[derive(Debug, Clone)]
pub struct QuicSettings {
    pub idle_timeout: Duration,
    pub keep_alive: Duration,
    /// TLS SNI override
    pub server_name: Option<String>,
    pub insecure: bool,
    pub alpn: Vec<u8>,
}

impl QuicSettings {
    /// TLS server name for `address`: the override, else the host part
    pub fn server_name_for<'a>(&'a self, address: &'a str) -> &'a str {
        self.server_name.as_deref().unwrap_or_else(|| {
            address
                .rsplit_once(':')
                .map(|(host, _)| host.trim_start_matches('[').trim_end_matches(']'))
                .unwrap_or(address)
        })
    }
}

impl From<&QuicConfig> for QuicSettings {
    fn from(config: &QuicConfig) -> Self {
        Self {
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            server_name: config.server_name.clone(),
            insecure: config.insecure,
            alpn: config.alpn.as_bytes().to_vec(),
        }
    }
}

/// Builds [`QuicRelayClient`]s that share one client endpoint
pub struct QuicClientFactory {
    endpoint: Endpoint,
    settings: Arc<QuicSettings>,
}

impl QuicClientFactory {
    /// Create the shared endpoint. Must run inside a tokio runtime.
    pub fn new(settings: QuicSettings) -> Result<Self> {
        let endpoint = create_client_endpoint(&settings)?;
        Ok(Self {
            endpoint,
            settings: Arc::new(settings),
        })
    }
}

impl ClientFactory for QuicClientFactory {
    type Client = QuicRelayClient;

    fn new_client(&self, server_address: &str, peer_id: &str) -> Arc<QuicRelayClient> {
        Arc::new(QuicRelayClient {
            server_address: server_address.to_string(),
            peer_id: peer_id.to_string(),
            settings: self.settings.clone(),
            endpoint: self.endpoint.clone(),
            connection: RwLock::new(None),
            notifier: Arc::new(DisconnectNotifier::new()),
        })
    }
}

/// Session to a single relay server over QUIC
pub struct QuicRelayClient {
    server_address: String,
    peer_id: String,
    settings: Arc<QuicSettings>,
    endpoint: Endpoint,
    connection: RwLock<Option<Connection>>,
    notifier: Arc<DisconnectNotifier>,
}

impl QuicRelayClient {
    /// Relay address this client was built for
    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    fn live_connection(&self) -> Option<Connection> {
        self.connection
            .read()
            .as_ref()
            .filter(|c| c.close_reason().is_none())
            .cloned()
    }

    fn dial_error(&self, reason: impl std::fmt::Display) -> DialError {
        DialError::new(self.server_address.as_str(), reason)
    }

    /// Fire the notifier once `connection` closes, unless a newer session replaced it
    fn watch_session(&self, connection: Connection, generation: u64) {
        let notifier = self.notifier.clone();
        let address = self.server_address.clone();
        tokio::spawn(async move {
            let reason = connection.closed().await;
            debug!(%address, %reason, "Relay session closed");
            notifier.fire(generation);
        });
    }
}

impl RelayClient for QuicRelayClient {
    type Stream = RelayStream;

    async fn connect(&self) -> Result<(), DialError> {
        let server_addr = resolve_address(&self.server_address)
            .await
            .map_err(|e| self.dial_error(format!("{e:#}")))?;
        let server_name = self.settings.server_name_for(&self.server_address);

        debug!(addr = %server_addr, name = %server_name, "Connecting to relay");

        let connection = self
            .endpoint
            .connect(server_addr, server_name)
            .map_err(|e| self.dial_error(e))?
            .await
            .map_err(|e| self.dial_error(e))?;

        let generation = self.notifier.rearm();
        let previous = self.connection.write().replace(connection.clone());
        if let Some(previous) = previous {
            previous.close(VarInt::from_u32(0), b"superseded");
        }
        self.watch_session(connection.clone(), generation);

        info!(
            relay = %self.server_address,
            addr = %connection.remote_address(),
            peer_id = %self.peer_id,
            "Connected to relay"
        );
        Ok(())
    }

    async fn open_conn(&self, peer_key: &str) -> Result<RelayStream, OpenError> {
        let connection = self
            .live_connection()
            .ok_or_else(|| OpenError::new(peer_key, NotConnected))?;

        RelayStream::establish(&connection, &self.peer_id, peer_key)
            .await
            .map_err(|e| OpenError::new(peer_key, format!("{e:#}")))
    }

    fn relay_remote_address(&self) -> Result<String, NotConnected> {
        self.live_connection()
            .map(|c| c.remote_address().to_string())
            .ok_or(NotConnected)
    }

    fn set_on_disconnect_listener(&self, listener: DisconnectListener) {
        self.notifier.set_listener(listener);
    }

    fn close(&self) {
        if let Some(connection) = self.connection.write().take() {
            connection.close(VarInt::from_u32(0), b"client shutdown");
        }
    }
}

/// Create QUIC client endpoint
fn create_client_endpoint(settings: &QuicSettings) -> Result<Endpoint> {
    let mut tls_config = if settings.insecure {
        warn!("TLS certificate verification disabled (insecure mode)");
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureServerVerifier))
            .with_no_client_auth()
    } else {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    };

    tls_config.alpn_protocols = vec![settings.alpn.clone()];

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(
        IdleTimeout::try_from(settings.idle_timeout).context("Invalid idle timeout")?,
    ));
    transport.keep_alive_interval(Some(settings.keep_alive));

    let mut client_config = quinn::ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(tls_config)?,
    ));
    client_config.transport_config(Arc::new(transport));

    let mut endpoint = Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))
        .context("Failed to bind client endpoint")?;
    endpoint.set_default_client_config(client_config);

    Ok(endpoint)
}

/// Resolve relay address
async fn resolve_address(address: &str) -> Result<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    tokio::net::lookup_host(address)
        .await
        .with_context(|| format!("Failed to resolve {}", address))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("No addresses found for {}", address))
}

/// Insecure TLS verifier for development
#[derive(Debug)]
struct InsecureServerVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureServerVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
