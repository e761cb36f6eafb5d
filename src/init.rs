use crate::hook::GelfHook;
use crate::layer::GelfLayer;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Settings for the global subscriber installed by [`init_tracing_with_config`].
///
/// **Fields**
/// - `min_level`: least severe level shipped to the collector.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   stacked on top of [`GelfLayer`] so events are printed locally too.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::DEBUG,
            enable_stdout: true,
        }
    }
}

/// Install a global `tracing` subscriber that ships events through `hook`.
///
/// **Parameters**
/// - `hook`: an asynchronous [`GelfHook`]. A synchronous hook rejects every
///   event, see [`GelfLayer`].
/// - `config`: [`LayerConfig`] controlling level filtering and local output.
///
/// **Errors**
///
/// Fails if a global subscriber has already been set.
pub fn init_tracing_with_config(
    hook: Arc<GelfHook>,
    config: LayerConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = GelfLayer::new(hook).with_min_level(config.min_level);

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(hook: Arc<GelfHook>) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(hook, LayerConfig::default())
}
