//! Structured logging setup.
//!
//! Initializes a `tracing-subscriber` env-filter layer, honoring
//! `RUST_LOG` (defaulting to `info`) the way a typical Tokio service
//! does. Call once from `main` before touching any other module.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
