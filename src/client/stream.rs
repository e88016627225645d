//! Logical streams over a QUIC relay session

use anyhow::{Context as _, Result};
use quinn::{Connection, RecvStream, SendStream};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tracing::debug;

use super::protocol;

/// One bidirectional byte stream to a peer, spliced by the relay
#[derive(Debug)]
pub struct RelayStream {
    peer_key: String,
    send: SendStream,
    recv: RecvStream,
}

impl RelayStream {
    /// Open a bi-stream on `connection` and ask the relay to splice it to `peer_key`
    pub(crate) async fn establish(
        connection: &Connection,
        source: &str,
        peer_key: &str,
    ) -> Result<Self> {
        let (mut send, mut recv) = connection
            .open_bi()
            .await
            .context("Failed to open stream")?;

        let request = protocol::encode_open_request(source, peer_key)?;
        send.write_all(&request)
            .await
            .context("Failed to send open request")?;

        let status = recv
            .read_u8()
            .await
            .context("Failed to read open response")?;
        protocol::decode_open_response(status)?;

        debug!(peer = %peer_key, stream_id = ?send.id(), "Relay stream established");

        Ok(Self {
            peer_key: peer_key.to_string(),
            send,
            recv,
        })
    }

    /// Peer this stream reaches
    pub fn peer_key(&self) -> &str {
        &self.peer_key
    }
}

impl AsyncRead for RelayStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        AsyncRead::poll_read(Pin::new(&mut self.recv), cx, buf)
    }
}

impl AsyncWrite for RelayStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        AsyncWrite::poll_write(Pin::new(&mut self.send), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_flush(Pin::new(&mut self.send), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_shutdown(Pin::new(&mut self.send), cx)
    }
}
