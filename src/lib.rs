//! Ship structured log records to a GELF collector.
//!
//! A [`GelfHook`] encodes [`LogRecord`]s into GELF [`WireMessage`]s and hands
//! them to a [`Transport`]: chunked UDP, TCP with reconnect, or (with the
//! `redis` feature) a durable Redis queue. In asynchronous mode records go
//! through a [`DeliveryQueue`] drained by background workers, so the
//! logging call never waits on the network. [`GelfLayer`] plugs the hook into
//! `tracing`.

pub mod compression;
pub mod config;
pub mod datagram;
pub mod delivery;
#[cfg(feature = "redis")]
pub mod durable;
pub mod env;
pub mod hook;
pub mod init;
pub mod layer;
pub mod message;
pub mod noop;
pub mod pool;
pub mod queue;
pub mod record;
pub mod stream;
pub mod transport;

pub use config::{parse_address, HookConfig, ReconnectPolicy, RedisConfig, TransportConfig};
pub use delivery::DeliveryQueue;
pub use hook::{GelfHook, HookError};
pub use layer::GelfLayer;
pub use message::{Encoder, Severity, WireMessage};
pub use record::{Level, LogRecord};
pub use transport::{connect, connect_addr, MessageHandler, Transport, TransportError};
