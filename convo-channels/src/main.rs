//! Convo Channels - Main entry point.

use anyhow::Result;
use convo_channels::start_server;
use convo_common::config::Config;
use convo_common::logging::init_logging_with_exclusions;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_with_env()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    config.validate()?;

    tracing::info!("Convo Channels v{}", env!("CARGO_PKG_VERSION"));

    start_server(&config).await
}
