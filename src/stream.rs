//! GELF over TCP.
//!
//! Each message is the uncompressed JSON followed by a single `0x00`
//! terminator; there is no length prefix. When a write fails the transport
//! drops the connection, re-dials at a fixed interval and retries the
//! message exactly once on the new connection.

use crate::config::ReconnectPolicy;
use crate::message::{to_bytes, WireMessage};
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use std::io;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Byte that terminates every message on the stream.
pub const FRAME_TERMINATOR: u8 = 0x00;

/// GELF TCP transport with automatic reconnect.
///
/// Sends are serialized through one lock so frames from concurrent callers
/// never interleave. A send stuck reconnecting gives up as soon as the
/// transport is closed.
pub struct TcpTransport {
    addr: String,
    policy: ReconnectPolicy,
    stream: Mutex<Option<TcpStream>>,
    shutdown: CancellationToken,
}

impl TcpTransport {
    /// Dial `addr` (`host:port`). The initial connection is not retried.
    pub async fn connect(addr: &str, policy: ReconnectPolicy) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(addr, "tcp transport connected");

        Ok(TcpTransport {
            addr: addr.to_string(),
            policy,
            stream: Mutex::new(Some(stream)),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Dial until a connection is established or the policy's attempt
    /// budget is spent.
    async fn reconnect(&self) -> Result<TcpStream, TransportError> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            debug!(addr = %self.addr, attempt = attempts, "reconnecting");
            let dialed = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(TransportError::Closed),
                dialed = TcpStream::connect(&self.addr) => dialed,
            };
            match dialed {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!(addr = %self.addr, attempts, "reconnected");
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(addr = %self.addr, attempt = attempts, error = %e, "reconnect failed");
                    if let Some(max) = self.policy.max_attempts {
                        if attempts >= max.max(1) {
                            return Err(TransportError::ReconnectExhausted {
                                addr: self.addr.clone(),
                                attempts,
                                source: e,
                            });
                        }
                    }
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Err(TransportError::Closed),
                        _ = sleep(self.policy.interval) => {}
                    }
                }
            }
        }
    }
}

/// A peer that has closed its side shows up as a readable EOF. The
/// collector never writes to us, so any other outcome means the connection
/// is still usable.
fn peer_closed(stream: &TcpStream) -> bool {
    let mut probe = [0u8; 1];
    match stream.try_read(&mut probe) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
        Err(_) => true,
    }
}

async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> io::Result<()> {
    if peer_closed(stream) {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection closed by peer",
        ));
    }
    stream.write_all(frame).await?;
    stream.flush().await
}

#[async_trait]
impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        let mut frame = to_bytes(message)?;
        frame.push(FRAME_TERMINATOR);

        let mut guard = self.stream.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let first = match guard.as_mut() {
            Some(stream) => write_frame(stream, &frame).await,
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "not connected")),
        };
        let err = match first {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        warn!(addr = %self.addr, error = %err, "tcp write failed");
        *guard = None;

        let mut stream = self.reconnect().await?;
        write_frame(&mut stream, &frame).await?;
        *guard = Some(stream);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown.cancel();
        if let Some(mut stream) = self.stream.lock().await.take() {
            // The peer may already be gone; nothing left to report.
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}
