//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the configuration provides one.
pub const DEFAULT_LOG_FILTER: &str = "info,renderer=debug,egui=warn,winit=warn";

/// Initialize the logging system with tracing.
///
/// `RUST_LOG` wins over `default_filter`; an empty or malformed default falls
/// back to [`DEFAULT_LOG_FILTER`].
///
/// # Example
/// ```
/// renderer_core::init_logging(renderer_core::DEFAULT_LOG_FILTER);
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
