//! Tracing initialization for the connector host.

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Initialize JSON-formatted tracing using the configured log level as
/// the default `EnvFilter` directive (still overridable via `RUST_LOG`).
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.http.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().json().with_env_filter(filter).init();

    tracing::info!(log_level = %config.http.log_level, "tracing initialized");
    Ok(())
}

pub fn shutdown_tracing() {
    tracing::info!("tracing shutdown");
}
