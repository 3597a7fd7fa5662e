//! Logging initialisation.
//!
//! The system has no user interface beyond its logs, so they carry the
//! whole story: lifecycle at `info`, per-path decisions at `debug`,
//! non-fatal trouble at `warn`. Everything goes to standard error so
//! flag-mode output on standard out stays clean.

use tracing_subscriber::EnvFilter;

/// Initialise the tracing subscriber. `RUST_LOG` overrides the default
/// `info` level. Call once, before the runtime starts.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();
}
