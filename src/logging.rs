//! Tracing subscriber setup for the `folio` binary.
//!
//! Logs go to stderr so answers on stdout can be piped. The filter comes
//! from `RUST_LOG` when set; otherwise dependencies log at `warn` and
//! Folio's own crates at `info` (`debug` with `--verbose`).

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,folio={level},folio_rag={level},folio_rag_core={level}")
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    // A subscriber may already be installed (tests, embedding hosts).
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init();
}
