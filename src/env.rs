/// Environment variable names used by this crate for convenient
/// configuration of transports from microservices.
///
/// These are purely helpers; the transports themselves never read the
/// environment.

/// Collector address, `udp://host:port` or `tcp://host:port`.
pub const GELF_ADDRESS_ENV: &str = "GELF_ADDRESS";

/// Redis `host:port`. When set, the durable queue transport is used.
pub const GELF_REDIS_ADDR_ENV: &str = "GELF_REDIS_ADDR";

/// Optional Redis user name.
pub const GELF_REDIS_USERNAME_ENV: &str = "GELF_REDIS_USERNAME";

/// Optional Redis password.
pub const GELF_REDIS_PASSWORD_ENV: &str = "GELF_REDIS_PASSWORD";

/// Redis database index.
pub const GELF_REDIS_DB_ENV: &str = "GELF_REDIS_DB";

/// Redis list key, `graylog` unless set.
pub const GELF_REDIS_QUEUE_ENV: &str = "GELF_REDIS_QUEUE";

/// `true` to send from the logging call instead of the delivery queue.
pub const GELF_SYNCHRONOUS_ENV: &str = "GELF_SYNCHRONOUS";

/// Number of delivery workers.
pub const GELF_CONCURRENCY_ENV: &str = "GELF_CONCURRENCY";

/// Host name reported in messages, overriding discovery.
pub const GELF_HOST_ENV: &str = "GELF_HOST";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
