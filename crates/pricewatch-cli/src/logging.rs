//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::{CliConfig, LogFormat};

/// Build the event filter: `RUST_LOG` wins, otherwise the verbosity level
#[must_use]
pub fn env_filter(config: &CliConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.filter_directive()))
}

/// Install the global subscriber, writing to stderr.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(config: &CliConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .with_target(false);

    match config.log_format {
        LogFormat::Text => builder
            .with_ansi(config.color.should_color())
            .try_init()
            .is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
