use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_gelf_sink::init::init_tracing;
use tracing_gelf_sink::noop::NoopTransport;
use tracing_gelf_sink::{GelfHook, HookConfig};

#[tokio::main]
async fn main() {
    let transport = Arc::new(NoopTransport::default());
    let hook = Arc::new(GelfHook::new(transport.clone(), HookConfig::default()));
    init_tracing(Arc::clone(&hook)).expect("global subscriber already set");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(target: "load", iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: queued {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    if let Err(e) = hook.flush_and_close().await {
        eprintln!("close failed: {}", e);
    }
    println!("delivered {} messages in {:?}", transport.sent(), start.elapsed());
}
