//! GELF over UDP.
//!
//! Messages are gzip-compressed. A payload that does not fit in one
//! datagram is split into chunks, each prefixed with a 12-byte header:
//!
//! | bytes | content                         |
//! |-------|---------------------------------|
//! | 0-1   | magic `0x1e 0x0f`               |
//! | 2-9   | message id, shared by all chunks|
//! | 10    | zero-based chunk index          |
//! | 11    | total chunk count               |
//!
//! Delivery is best effort: nothing is acknowledged or retransmitted, and
//! losing any one chunk loses the message at the collector.

use crate::compression::{gzip, Compression};
use crate::message::{to_bytes, CodecError, WireMessage};
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Largest datagram written. Should stay below the path MTU minus the UDP
/// header.
pub const CHUNK_SIZE: usize = 1420;
pub const CHUNK_HEADER_LEN: usize = 12;
/// Payload bytes carried by one chunk.
pub const CHUNK_DATA_LEN: usize = CHUNK_SIZE - CHUNK_HEADER_LEN;
/// The chunk count is a single byte on the wire.
pub const MAX_CHUNKS: usize = 255;
pub const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];

/// Number of datagrams needed for a compressed payload of `len` bytes.
pub fn chunk_count(len: usize) -> usize {
    if len <= CHUNK_SIZE {
        1
    } else {
        len.div_ceil(CHUNK_DATA_LEN)
    }
}

/// Split a compressed payload into the datagrams to send.
///
/// A payload of at most [`CHUNK_SIZE`] bytes is sent as is. Anything
/// larger becomes a series of chunks tagged with `message_id`. Payloads
/// that would need more than [`MAX_CHUNKS`] chunks are rejected.
pub fn split_into_datagrams(
    payload: &[u8],
    message_id: [u8; 8],
) -> Result<Vec<Vec<u8>>, TransportError> {
    let count = chunk_count(payload.len());
    if count > MAX_CHUNKS {
        return Err(TransportError::TooManyChunks { needed: count });
    }
    if count == 1 {
        return Ok(vec![payload.to_vec()]);
    }

    let datagrams = payload
        .chunks(CHUNK_DATA_LEN)
        .enumerate()
        .map(|(index, data)| {
            let mut datagram = Vec::with_capacity(CHUNK_HEADER_LEN + data.len());
            datagram.extend_from_slice(&CHUNK_MAGIC);
            datagram.extend_from_slice(&message_id);
            datagram.push(index as u8);
            datagram.push(count as u8);
            datagram.extend_from_slice(data);
            datagram
        })
        .collect();
    Ok(datagrams)
}

/// Compress a message the way it goes on the wire.
pub fn encode_payload(message: &WireMessage) -> Result<Vec<u8>, TransportError> {
    let json = to_bytes(message)?;
    let payload = gzip(&json, Compression::fast()).map_err(CodecError::from)?;
    Ok(payload)
}

/// GELF UDP transport.
pub struct UdpTransport {
    addr: String,
    socket: Mutex<Option<UdpSocket>>,
}

impl UdpTransport {
    /// Resolve `addr` (`host:port`) and open a connected socket to it.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let remote = lookup_host(addr).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", addr),
            )
        })?;
        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        debug!(%remote, "udp transport ready");

        Ok(UdpTransport {
            addr: addr.to_string(),
            socket: Mutex::new(Some(socket)),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn name(&self) -> &'static str {
        "udp"
    }

    async fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        let payload = encode_payload(message)?;
        let datagrams = split_into_datagrams(&payload, rand::random())?;

        let guard = self.socket.lock().await;
        let socket = guard.as_ref().ok_or(TransportError::Closed)?;
        for datagram in &datagrams {
            let written = socket.send(datagram).await?;
            if written != datagram.len() {
                return Err(TransportError::ShortWrite {
                    written,
                    expected: datagram.len(),
                });
            }
        }
        trace!(
            bytes = payload.len(),
            datagrams = datagrams.len(),
            "sent gelf message over udp"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.socket.lock().await.take();
        Ok(())
    }
}
