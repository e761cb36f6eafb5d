use std::sync::Arc;

use tracing::{error, info};
use tracing_gelf_sink::datagram::UdpTransport;
use tracing_gelf_sink::init::init_tracing;
use tracing_gelf_sink::{GelfHook, HookConfig};

/// Ship events to a Graylog UDP input.
///
/// Start a collector with e.g. `nc -klu 12201 | xxd` to see the gzipped
/// datagrams arrive.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let addr = std::env::var("GELF_UDP_ADDR").unwrap_or_else(|_| "127.0.0.1:12201".to_string());
    let transport = Arc::new(UdpTransport::connect(&addr).await?);
    let hook = Arc::new(GelfHook::new(transport, HookConfig::default()));

    init_tracing(Arc::clone(&hook))?;

    info!(target: "demo", "udp example started");
    error!(target: "demo", user_id = 7, "simulated error sent over udp");
    // Large enough to be split into several chunks.
    info!(target: "demo", payload = %"x".repeat(20_000), "chunked message");

    hook.flush_and_close().await?;
    Ok(())
}
