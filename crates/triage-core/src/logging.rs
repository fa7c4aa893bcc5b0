use tracing_subscriber::EnvFilter;

/// Installs the process-wide subscriber. `RUST_LOG` wins over
/// `default_directive`; output goes to stderr. Returns false when a subscriber
/// was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
