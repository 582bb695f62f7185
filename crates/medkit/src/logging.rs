use crate::Config;
use std::sync::Once;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: Once = Once::new();

/// Installs the global tracing subscriber at the configured level
///
/// Natively this logs to stdout, in the browser to the devtools console, where panics are also
/// reported. Only the first call installs anything, and an application that already installed its
/// own subscriber keeps it.
pub fn init(config: &Config) -> medkit_core::Result<()> {
    let level = config.max_level()?;
    INIT.call_once(|| install(level));
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn install(level: tracing::Level) {
    let res = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish()
        .try_init();
    if res.is_ok() {
        tracing::debug!(%level, "installed stdout logging");
    }
}

#[cfg(target_arch = "wasm32")]
fn install(level: tracing::Level) {
    use tracing_subscriber::layer::SubscriberExt;

    let config = tracing_wasm::WASMLayerConfigBuilder::new()
        .set_max_level(level)
        .build();
    let res = tracing_subscriber::registry()
        .with(tracing_wasm::WASMLayer::new(config))
        .try_init();
    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
    if res.is_ok() {
        tracing::debug!(%level, "installed console logging");
    }
}
