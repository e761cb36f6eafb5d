use crate::message::WireMessage;
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// A transport that simply drops all messages.
///
/// Useful for measuring the overhead of the hook itself without any
/// network I/O, and for tests that only care about what reached the
/// transport.
#[derive(Default)]
pub struct NoopTransport {
    sent: AtomicU64,
}

impl NoopTransport {
    /// Number of messages accepted so far.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for NoopTransport {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn send(&self, _message: &WireMessage) -> Result<(), TransportError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
