//! Tracing subscriber setup

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false`
/// when a subscriber was already installed.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);

    let result = match config.format.as_str() {
        "compact" => builder.compact().try_init(),
        "json" => builder.json().try_init(),
        _ => builder.pretty().try_init(),
    };

    result.is_ok()
}
