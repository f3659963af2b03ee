//! Process-level bootstrap concerns that sit outside `library_core::config`:
//! tracing initialization. Business configuration itself
//! (`LibraryConfig::from_env`) lives in `library_core::config` so the store
//! and bus crates can validate it without depending on this binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes a JSON-structured tracing subscriber, honoring `RUST_LOG`
/// (default `info`) the way the rest of the workspace expects.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .try_init()
        .ok();
}
