use std::sync::Arc;

use tracing_gelf_sink::durable::RedisTransport;
use tracing_gelf_sink::record::FieldValue;
use tracing_gelf_sink::{GelfHook, HookConfig, Level, LogRecord, RedisConfig};

/// Push records onto a Redis list without going through `tracing`.
///
/// The hook is synchronous, so each `fire` returns once Redis accepted the
/// message. Run `redis_consumer_example` to drain the queue.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let transport = Arc::new(RedisTransport::connect(RedisConfig::from_env()?).await?);
    let hook = GelfHook::new(
        transport,
        HookConfig {
            synchronous: true,
            ..HookConfig::default()
        },
    );

    for i in 0..5 {
        let record = LogRecord::new(Level::Info, format!("order {} accepted", i))
            .with_field("order_id", FieldValue::from(i as i64))
            .with_field("source", "redis_example");
        hook.fire(record).await?;
    }

    let failure = anyhow::anyhow!("connection refused").context("payment gateway");
    hook.fire(LogRecord::new(Level::Error, "payment failed").with_error(failure))
        .await?;

    hook.flush_and_close().await?;
    Ok(())
}
