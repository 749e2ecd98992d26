//! Logging initialization.
//!
//! Events go to stderr through `tracing-subscriber`. The filter comes from
//! `INKPRESS_LOG`, then `RUST_LOG`, then the verbosity flags:
//!
//! - default → `warn`
//! - `--debug` → `debug` for this crate
//! - `--quiet` → `error`
//!
//! `--json-logs` switches to one JSON object per event.

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "INKPRESS_LOG";

/// Logging options taken from global flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub debug: bool,
    pub quiet: bool,
    pub json: bool,
}

/// Directive used when no environment filter is set.
pub fn default_directive(options: LogOptions) -> &'static str {
    if options.debug {
        "inkpress=debug,info"
    } else if options.quiet {
        "error"
    } else {
        "warn"
    }
}

fn filter(options: LogOptions) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options)))
}

/// Install the global subscriber.
///
/// A second call is a no-op, so tests and embedders can call it freely.
pub fn init(options: LogOptions) {
    let registry = tracing_subscriber::registry().with(filter(options));
    let result = if options.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    // Already initialized.
    let _ = result;
}
