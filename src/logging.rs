//! Diagnostics via `tracing`, written to stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "patchpilot=info,warn";

/// Install the global subscriber.
///
/// Reads `RUST_LOG`, falling back to [`DEFAULT_FILTER`]; `verbose` raises
/// this crate to `debug` (raw model responses are logged at that level).
///
/// ```bash
/// RUST_LOG=patchpilot=debug patchpilot run --issue 42
/// ```
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("patchpilot=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
