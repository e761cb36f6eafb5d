//! Durable delivery through a Redis list.
//!
//! Producers gzip each message and `RPUSH` it onto the queue key. A
//! separate consumer `BLPOP`s from the same key, decodes the payload and
//! hands it to a [`MessageHandler`]. Once the broker has acknowledged the
//! push the message no longer depends on the producing process. Delivery is
//! at least once: a payload whose handler fails is pushed back, even when
//! the transport is being closed at that moment.
//!
//! The consumer pops with a bounded `BLPOP` timeout and checks for shutdown
//! between pops rather than abandoning a pop in flight, so closing never
//! discards an element the broker has already handed out.

use crate::compression::{gunzip, gzip, Compression};
use crate::config::RedisConfig;
use crate::message::{from_bytes, to_bytes, CodecError, WireMessage};
use crate::pool::{ObjectPool, PoolFactory};
use crate::transport::{MessageHandler, Transport, TransportError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest a single `BLPOP` waits, which bounds how long `close` takes to
/// stop a consumer.
const POP_TIMEOUT_SECS: u64 = 1;

/// Compress a message for storage in the queue.
pub fn encode_payload(message: &WireMessage) -> Result<Vec<u8>, CodecError> {
    let json = to_bytes(message)?;
    Ok(gzip(&json, Compression::best())?)
}

pub fn decode_payload(payload: &[u8]) -> Result<WireMessage, CodecError> {
    let json = gunzip(payload)?;
    from_bytes(&json)
}

struct Connector {
    client: Client,
}

#[async_trait]
impl PoolFactory for Connector {
    type Object = MultiplexedConnection;

    async fn create(&self) -> Result<MultiplexedConnection, TransportError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

/// Redis-backed transport.
///
/// Pushes go through a small connection pool. [`Transport::consume`] uses
/// its own connection because `BLPOP` holds the connection while it waits.
pub struct RedisTransport {
    config: RedisConfig,
    client: Client,
    pool: ObjectPool<Connector>,
    shutdown: CancellationToken,
}

impl RedisTransport {
    /// Open a client for `config` and check the broker answers `PING`.
    pub async fn connect(config: RedisConfig) -> Result<Self, TransportError> {
        let client = Client::open(config.url())?;
        let mut probe = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut probe).await?;
        info!(addr = %config.addr, queue = %config.queue, "redis transport connected");

        let pool = ObjectPool::new(
            Connector {
                client: client.clone(),
            },
            config.pool_size,
        )
        .with_retry_interval(config.retry_interval);

        Ok(RedisTransport {
            config,
            client,
            pool,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn queue(&self) -> &str {
        &self.config.queue
    }

    /// Push a raw payload, retrying with a fixed delay until the broker
    /// accepts it or the transport is closed.
    async fn push(&self, payload: &[u8]) -> Result<(), TransportError> {
        loop {
            if self.shutdown.is_cancelled() {
                return Err(TransportError::Closed);
            }
            let mut conn = self.pool.get().await;
            match rpush(&mut conn, &self.config.queue, payload).await {
                Ok(depth) => {
                    conn.release();
                    debug!(queue = %self.config.queue, depth, bytes = payload.len(), "pushed gelf message");
                    return Ok(());
                }
                Err(e) => {
                    conn.discard();
                    warn!(queue = %self.config.queue, error = %e, "redis push failed, retrying");
                    self.pause().await;
                }
            }
        }
    }

    /// Put a popped payload back on the queue.
    ///
    /// Unlike [`RedisTransport::push`] this still tries once after `close`,
    /// on a fresh connection, because the payload exists nowhere else.
    async fn requeue(&self, payload: &[u8]) -> Result<(), TransportError> {
        match self.push(payload).await {
            Err(TransportError::Closed) => {}
            other => return other,
        }

        let pushed = match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => rpush(&mut conn, &self.config.queue, payload).await,
            Err(e) => Err(e),
        };
        match pushed {
            Ok(depth) => {
                debug!(queue = %self.config.queue, depth, "requeued message while closing");
                Ok(())
            }
            Err(e) => {
                error!(queue = %self.config.queue, error = %e, bytes = payload.len(), "message lost: requeue failed while closing");
                Err(e.into())
            }
        }
    }

    /// Pop the next payload, opening the consumer connection when needed.
    async fn pop(
        &self,
        slot: &mut Option<MultiplexedConnection>,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        if slot.is_none() {
            *slot = Some(self.client.get_multiplexed_async_connection().await?);
        }
        let Some(conn) = slot.as_mut() else {
            return Ok(None);
        };
        // A nil reply means the timeout passed without an element.
        let popped: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(&self.config.queue)
            .arg(POP_TIMEOUT_SECS)
            .query_async(conn)
            .await?;
        Ok(popped.map(|(_, payload)| payload).filter(|p| !p.is_empty()))
    }

    /// Sleep for the retry interval, waking early on close.
    async fn pause(&self) {
        tokio::select! {
            _ = sleep(self.config.retry_interval) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }
}

#[async_trait]
impl Transport for RedisTransport {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        let payload = encode_payload(message)?;
        self.push(&payload).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown.cancel();
        Ok(())
    }

    async fn consume(&self, handler: &dyn MessageHandler) -> Result<(), TransportError> {
        let mut conn: Option<MultiplexedConnection> = None;
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            let popped = self.pop(&mut conn).await;

            let payload = match popped {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    warn!(queue = %self.config.queue, error = %e, "redis pop failed, retrying");
                    conn = None;
                    self.pause().await;
                    continue;
                }
            };

            let message = match decode_payload(&payload) {
                Ok(message) => message,
                Err(e) => {
                    // Retrying cannot fix a corrupt payload.
                    error!(queue = %self.config.queue, error = %e, "dropping undecodable payload");
                    continue;
                }
            };

            if let Err(e) = handler.handle(message).await {
                warn!(queue = %self.config.queue, error = %e, "handler failed, requeueing message");
                self.requeue(&payload).await?;
                self.pause().await;
            }
        }
    }
}

async fn rpush(
    conn: &mut MultiplexedConnection,
    queue: &str,
    payload: &[u8],
) -> redis::RedisResult<i64> {
    redis::cmd("RPUSH")
        .arg(queue)
        .arg(payload)
        .query_async(conn)
        .await
}
