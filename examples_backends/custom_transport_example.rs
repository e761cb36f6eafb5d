use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use tracing_gelf_sink::{
    init::init_tracing, GelfHook, HookConfig, Transport, TransportError, WireMessage,
};

/// Example of plugging in a transport this crate does not provide by
/// implementing the `Transport` trait directly. Imagine it forwards to a
/// proprietary log shipper.
struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        let json = tracing_gelf_sink::message::to_bytes(message)?;
        println!("[stdout-transport] {}", String::from_utf8_lossy(&json));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(StdoutTransport);
    let hook = Arc::new(GelfHook::new(transport, HookConfig::default()));

    init_tracing(Arc::clone(&hook))?;

    info!(target: "demo", "custom transport example started");
    error!(target: "demo", db = "my-custom-db", "simulated error sent via custom transport");

    hook.flush_and_close().await?;
    Ok(())
}
