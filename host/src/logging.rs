/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "background=debug,content=debug,popup=info,host=info";

/// Install the tracing subscriber for this context. Safe to call twice.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Install the console tracing subscriber for this context.
#[cfg(target_arch = "wasm32")]
pub fn init_tracing() {
    dioxus_logger::init(dioxus_logger::tracing::Level::INFO).ok();
}
