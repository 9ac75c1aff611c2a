use tracing_subscriber::EnvFilter;

/// Stdout carries the IPC protocol, so all log output goes to stderr.
/// The filter comes from `GRADINGD_LOG`, then `RUST_LOG`, then `info`.
pub fn init() {
    let filter = std::env::var("GRADINGD_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
