use crate::config::{parse_address, ConfigError, TransportConfig};
use crate::message::{CodecError, WireMessage};
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

/// Boxed error returned by [`MessageHandler`]s.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Destination for [`WireMessage`]s.
///
/// Implementations own their connection and serialize concurrent writers
/// internally, so a single instance can be shared behind an `Arc` by any
/// number of tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in diagnostics, e.g. `"udp"`.
    fn name(&self) -> &'static str;

    /// Deliver one message.
    ///
    /// **Returns**
    /// - `Ok(())` once the whole message was handed to the network (or to
    ///   the broker, for queue-backed transports).
    /// - `Err(..)` if encoding failed or the message could not be written.
    ///   A partially written message is never reported as delivered.
    async fn send(&self, message: &WireMessage) -> Result<(), TransportError>;

    /// Release the underlying connection. Calling it again is a no-op.
    async fn close(&self) -> Result<(), TransportError>;

    /// Read messages back and pass each one to `handler` until the transport
    /// is closed.
    ///
    /// Only transports backed by a readable store support this; the default
    /// implementation returns [`TransportError::Unsupported`].
    async fn consume(&self, _handler: &dyn MessageHandler) -> Result<(), TransportError> {
        Err(TransportError::Unsupported(self.name()))
    }
}

/// Receives messages from [`Transport::consume`].
///
/// Returning an error hands the message back to the queue, so the same
/// message may be delivered more than once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: WireMessage) -> Result<(), BoxError>;
}

/// Error type returned by transports.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message too large, would need {needed} chunks")]
    TooManyChunks { needed: usize },

    #[error("short write: {written}/{expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("reconnecting to {addr} failed after {attempts} attempts: {source}")]
    ReconnectExhausted {
        addr: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("{0} feature is not enabled")]
    FeatureDisabled(&'static str),

    #[error("transport is closed")]
    Closed,

    #[error("{0} transport does not support consuming")]
    Unsupported(&'static str),
}

/// Create a concrete [`Transport`] from a [`TransportConfig`].
///
/// This is the main entry point for applications that pick a transport
/// from configuration instead of constructing one directly.
pub async fn connect(config: &TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
    match config {
        TransportConfig::Datagram { addr } => {
            let transport = crate::datagram::UdpTransport::connect(addr).await?;
            Ok(Arc::new(transport) as Arc<dyn Transport>)
        }
        TransportConfig::Stream { addr, reconnect } => {
            let transport = crate::stream::TcpTransport::connect(addr, reconnect.clone()).await?;
            Ok(Arc::new(transport) as Arc<dyn Transport>)
        }
        TransportConfig::DurableQueue(redis_config) => {
            #[cfg(feature = "redis")]
            {
                let transport =
                    crate::durable::RedisTransport::connect(redis_config.clone()).await?;
                Ok(Arc::new(transport) as Arc<dyn Transport>)
            }

            #[cfg(not(feature = "redis"))]
            {
                let _ = redis_config;
                Err(TransportError::FeatureDisabled("redis"))
            }
        }
    }
}

/// Parse a `tcp://` / `udp://` address and connect to it.
pub async fn connect_addr(addr: &str) -> Result<Arc<dyn Transport>, TransportError> {
    let config = parse_address(addr)?;
    connect(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop::NoopTransport;

    struct Discard;

    #[async_trait]
    impl MessageHandler for Discard {
        async fn handle(&self, _message: WireMessage) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unknown_scheme_creates_no_transport() {
        let err = connect_addr("amqp://127.0.0.1:5672").await.err().unwrap();
        assert!(matches!(err, TransportError::Config(ConfigError::UnknownScheme(_))));
    }

    #[tokio::test]
    async fn consume_is_unsupported_by_default() {
        let transport = NoopTransport::default();
        let err = transport.consume(&Discard).await.unwrap_err();
        assert!(matches!(err, TransportError::Unsupported("noop")));
    }

    #[tokio::test]
    async fn connect_builds_datagram_transport() {
        let transport = connect_addr("udp://127.0.0.1:12201").await.unwrap();
        assert_eq!(transport.name(), "udp");
        transport.close().await.unwrap();
    }
}
