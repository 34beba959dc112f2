use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging to stdout.
///
/// `RUST_LOG` takes precedence; `default_directive` applies when it is unset
/// or unparsable.
///
/// ```
/// gateway::init_logging("info");
/// ```
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    fmt().with_env_filter(filter).with_target(false).init();
}
