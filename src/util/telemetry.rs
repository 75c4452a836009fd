//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber if none is set.
///
/// The filter comes from `RUST_LOG`; with nothing set only errors are shown.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
    {
        tracing::debug!("tracing subscriber already installed: {err}");
    }
}
