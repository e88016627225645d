//! relayconn - Entry Point
//!
//! Serves the home relay session and optionally pipes stdio to a peer.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tracing::{error, info};

use relayconn::client::{QuicClientFactory, QuicSettings};
use relayconn::manager::ReconnectPolicy;
use relayconn::{Config, ConnectionManager, VERSION};

/// relayconn - reach peers through home and foreign relays
#[derive(Parser)]
#[command(name = "relayconn")]
#[command(version = VERSION)]
#[command(about = "Relay connection manager for peers without a direct path")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the home relay and keep the session alive
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "relayconn.toml")]
        config: PathBuf,
    },
    /// Open a stream to a peer and pipe stdin/stdout through it
    Connect {
        /// Path to configuration file
        #[arg(short, long, default_value = "relayconn.toml")]
        config: PathBuf,
        /// Relay the peer is homed at. Streams go over the home session only
        /// when this equals its resolved ip:port.
        #[arg(short, long)]
        server: String,
        /// Peer key
        #[arg(short, long)]
        peer: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install the ring crypto provider for rustls
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(&config).await,
        Commands::Connect {
            config,
            server,
            peer,
        } => connect(&config, &server, &peer).await,
    }
}

async fn start(config_path: &Path) -> Result<ConnectionManager<QuicClientFactory>> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    relayconn::util::init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        config_path = ?config_path,
        "Starting relayconn"
    );

    if config.metrics.enabled {
        relayconn::metrics::init_metrics(&config.metrics)?;
        info!(bind_addr = %config.metrics.bind_addr, "Metrics endpoint started");
    }

    let factory = QuicClientFactory::new(QuicSettings::from(&config.quic))?;
    let manager = ConnectionManager::new(
        factory,
        config.relay.home_address.clone(),
        config.relay.peer_id.clone(),
    )
    .with_reconnect_policy(ReconnectPolicy::from(&config.reconnect));

    manager
        .serve()
        .await
        .context("Failed to connect to home relay")?;

    info!(relay_addr = %manager.relay_address()?, "Home relay session up");
    Ok(manager)
}

async fn serve(config_path: &Path) -> Result<()> {
    let manager = start(config_path).await?;

    shutdown_signal().await;
    info!("Shutdown signal received");
    manager.shutdown();

    info!("Stopped");
    Ok(())
}

async fn connect(config_path: &Path, server: &str, peer: &str) -> Result<()> {
    let manager = start(config_path).await?;

    let stream = manager
        .open_conn(server, peer)
        .await
        .with_context(|| format!("Failed to open stream to {} via {}", peer, server))?;
    info!(peer = %peer, relay = %server, "Stream open, piping stdio");

    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    let upstream = async {
        let sent = tokio::io::copy(&mut stdin, &mut writer).await?;
        writer.shutdown().await?;
        Ok::<_, std::io::Error>(sent)
    };
    let downstream = tokio::io::copy(&mut reader, &mut stdout);

    tokio::select! {
        result = async { tokio::try_join!(upstream, downstream) } => {
            match result {
                Ok((sent, received)) => info!(sent, received, "Stream closed"),
                Err(e) => error!(error = %e, "Stream error"),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    manager.shutdown();
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
