use std::sync::Once;

/// Install the global `tracing` subscriber. Call once from the host before
/// starting a session; later calls are no-ops.
///
/// The filter comes from `RUST_LOG`, defaulting to `huddle_core=info`.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("huddle_core=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init();
    });
}
