//! Stream-open header
//!
//! The first bytes written on every logical stream tell the relay which peer
//! to splice it to:
//! - Open Request: [Version(1)][SrcLen(1)][Src(N)][DstLen(1)][Dst(M)]
//! - Open Response: [Status(1)]

use anyhow::{bail, Result};
use bytes::BufMut;

/// Header version
pub const VERSION: u8 = 0x01;

/// Response status codes
pub const STATUS_OK: u8 = 0x00;
pub const STATUS_PEER_UNKNOWN: u8 = 0x01;
pub const STATUS_ERROR: u8 = 0xFF;

fn put_key(buf: &mut Vec<u8>, key: &str, what: &str) -> Result<()> {
    let bytes = key.as_bytes();
    if bytes.is_empty() {
        bail!("{what} must not be empty");
    }
    if bytes.len() > 255 {
        bail!("{what} too long (max 255 bytes)");
    }
    buf.put_u8(bytes.len() as u8);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Encode an open request
pub fn encode_open_request(source: &str, destination: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(3 + source.len() + destination.len());
    buf.put_u8(VERSION);
    put_key(&mut buf, source, "source peer id")?;
    put_key(&mut buf, destination, "destination peer key")?;
    Ok(buf)
}

/// Decode an open response
///
/// Returns Ok(()) if the relay accepted the stream
pub fn decode_open_response(status: u8) -> Result<()> {
    match status {
        STATUS_OK => Ok(()),
        STATUS_PEER_UNKNOWN => bail!("Peer not reachable through this relay"),
        STATUS_ERROR => bail!("Relay returned error"),
        status => bail!("Unknown status code: {}", status),
    }
}
