use std::sync::Arc;

use tracing::{info, warn};
use tracing_gelf_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_gelf_sink::{connect_addr, GelfHook, HookConfig};

/// Ship events to a Graylog TCP input, chosen by URL scheme.
///
/// Try stopping the collector while this runs: sends block and reconnect
/// until it is back.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let addr = std::env::var("GELF_ADDRESS").unwrap_or_else(|_| "tcp://127.0.0.1:12201".to_string());
    let transport = connect_addr(&addr).await?;

    let mut config = HookConfig::from_env()?;
    config
        .extra
        .insert("app".to_string(), serde_json::json!("tcp-example"));
    let hook = Arc::new(GelfHook::new(transport, config));

    init_tracing_with_config(
        Arc::clone(&hook),
        LayerConfig {
            enable_stdout: false,
            ..LayerConfig::default()
        },
    )?;

    for i in 0..10 {
        info!(target: "demo", iteration = i, "tcp example tick");
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
    warn!(target: "demo", "tcp example finished");

    hook.flush_and_close().await?;
    Ok(())
}
