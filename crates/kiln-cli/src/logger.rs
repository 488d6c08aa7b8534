//! Logging setup for the kiln binary.
//!
//! Everything logs through `tracing`; this installs the subscriber.
//!
//! ```rust,no_run
//! use kiln_cli::logger::init_logger;
//! use tracing::info;
//!
//! init_logger(false, false, false);
//! info!(pipeline = "js:0", "pipeline queued");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "kiln=debug,kiln_cli=debug,kiln_config=debug,kiln_graph=debug,kiln_pipeline=debug";
const QUIET_FILTER: &str = "kiln=error,kiln_cli=error,kiln_pipeline=error";
const DEFAULT_FILTER: &str = "kiln=info,kiln_cli=info,kiln_config=info,kiln_pipeline=info";

/// Install the global subscriber. Call once, before anything logs.
///
/// Precedence: `--verbose`, then `--quiet`, then `RUST_LOG`, then info
/// level for the kiln crates.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Install the global subscriber with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
