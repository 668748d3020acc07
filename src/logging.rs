/// Structured logging setup using tracing
///
/// Writes to stderr ONLY (never stdout): stdout carries the JSON-RPC stream
/// and a single stray log line would corrupt it. Format is auto-detected: human-readable
/// with ANSI colors when stderr is a terminal, structured JSON when piped.

use std::io::IsTerminal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Initialize the tracing subscriber.
///
/// Log level comes from config.log_level; RUST_LOG overrides it at runtime.
pub fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if std::io::stderr().is_terminal() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .init();
    }

    if config.log_file.is_some() {
        tracing::warn!("log_file configuration is reserved, logging to stderr only");
    }
}
