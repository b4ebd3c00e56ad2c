//! Tracing subscriber setup for the CLI.
//!
//! Logs go to stderr so stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

/// Filter directives read before `RUST_LOG`.
pub const LOG_ENV: &str = "XP_LOG";

/// `XP_LOG`, then `RUST_LOG`, then a level from `-v` count (warn by default).
pub fn build_filter(verbosity: u8) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    })
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(verbosity: u8, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false);
    // Already initialized (tests, embedding) is fine.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
