//! MediaDrop daemon entry point.

mod app;
mod config;
mod console;
mod fs_gateway;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries status lines.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting MediaDrop daemon"
    );

    let config = config::Config::load()?;
    tracing::info!(name = %config.name, users = config.users.len(), "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;
    // The stdin reader thread may still be parked in a read.
    rt.shutdown_timeout(std::time::Duration::from_millis(500));

    tracing::info!("daemon shut down cleanly");
    Ok(())
}
