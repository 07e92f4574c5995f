//! Log subscriber setup.
//!
//! Filter directives come from `LOBBYBOT_LOG`, then `RUST_LOG`, defaulting to
//! `info`. Set `LOBBYBOT_LOG_FORMAT=json` for one JSON object per event.
//! Output always goes to stderr.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "LOBBYBOT_LOG";
pub const FORMAT_ENV: &str = "LOBBYBOT_LOG_FORMAT";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init() {
    let json = std::env::var(FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
