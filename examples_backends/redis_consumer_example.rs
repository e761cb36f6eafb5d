use async_trait::async_trait;
use tracing::info;
use tracing_gelf_sink::durable::RedisTransport;
use tracing_gelf_sink::transport::BoxError;
use tracing_gelf_sink::{MessageHandler, RedisConfig, Transport, WireMessage};

/// Prints every message popped from the queue.
struct Printer;

#[async_trait]
impl MessageHandler for Printer {
    async fn handle(&self, message: WireMessage) -> Result<(), BoxError> {
        println!("{}", serde_json::to_string(&message)?);
        Ok(())
    }
}

/// Drain the queue filled by `redis_example` until Ctrl-C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let transport = RedisTransport::connect(RedisConfig::from_env()?).await?;
    info!(queue = transport.queue(), "consuming");

    tokio::select! {
        result = transport.consume(&Printer) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            transport.close().await?;
        }
    }
    Ok(())
}
