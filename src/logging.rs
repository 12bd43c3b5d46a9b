//! Tracing subscriber setup.
//!
//! Logs go to stderr so `tunerd listen` can write raw audio to stdout.
//! `TUNERD_LOG` takes precedence over `RUST_LOG`; both accept the usual
//! `EnvFilter` directive syntax.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "TUNERD_LOG";

/// Default filter directive for the given `-v` count and `-q` flag.
pub fn filter_directive(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// Returns an error string if a subscriber is already installed or the
/// environment filter does not parse.
pub fn init(verbosity: u8, quiet: bool) -> Result<(), String> {
    let env_filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive)
            .map_err(|e| format!("Invalid {LOG_ENV} value '{directive}': {e}"))?,
        Err(_) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity, quiet))),
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0)
        .with_thread_names(verbosity > 1);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}
