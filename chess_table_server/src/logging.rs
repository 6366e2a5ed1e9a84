// Tracing subscriber setup for the `table-server` binary.
//
// Library code only emits `tracing` events; installing a subscriber is the
// binary's job, so embedding the server in another process (or a test) never
// fights over the global default.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. A second call (or a host process that
/// already installed one) leaves the existing subscriber in place.
pub fn init_logging(verbose: bool) {
    // RUST_LOG wins; otherwise the --verbose flag picks the level.
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .compact()
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
