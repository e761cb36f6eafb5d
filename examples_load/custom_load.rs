use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::{error, Level};

use tracing_gelf_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_gelf_sink::noop::NoopTransport;
use tracing_gelf_sink::{GelfHook, HookConfig};

#[tokio::main]
async fn main() {
    let transport = Arc::new(NoopTransport::default());

    let hook_config = HookConfig {
        concurrency: 8,
        host: Some("load-test".to_string()),
        flush_poll_interval: Duration::from_millis(50),
        ..HookConfig::default()
    };
    let hook = Arc::new(GelfHook::new(transport.clone(), hook_config));

    let layer_config = LayerConfig {
        min_level: Level::WARN,
        enable_stdout: false,
    };
    init_tracing_with_config(Arc::clone(&hook), layer_config)
        .expect("global subscriber already set");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(target: "load", iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: queued {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    if let Err(e) = hook.flush_and_close().await {
        eprintln!("close failed: {}", e);
    }
    if let Some(stats) = hook.stats() {
        println!("delivered {}, failed {}", stats.delivered(), stats.failed());
    }
}
