//! Currency network server binary

use anyhow::Context;
use currency_network::{spawn_ledger_actor, Config, CurrencyNetwork};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match std::env::var("NETWORK_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => Config::from_env().context("loading configuration from environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        network = %config.network.name,
        "Starting currency network server"
    );

    let network = CurrencyNetwork::new(config)?;
    let (handle, actor) = spawn_ledger_actor(network);
    tracing::info!("Ledger actor running");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down currency network server");
    handle.shutdown().await?;
    let network = actor.await?;
    tracing::info!(
        users = network.users().len(),
        total_supply = network.total_supply(),
        "Final ledger state"
    );
    if let Ok(text) = network.metrics().render() {
        tracing::debug!(metrics = %text, "Final metrics");
    }
    Ok(())
}
