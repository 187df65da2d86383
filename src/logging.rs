//! Subscriber setup for the binaries.

use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count.
pub fn verbosity_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install a stderr fmt subscriber. `RUST_LOG` wins over `verbose`.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .try_init();
}
