// Fleet reconciler process
// Decision: Configuration is loaded after .env so FLEET_RECONCILER_CONFIG may live there

use anyhow::{Context, Result};
use fleet_reconciler::telemetry::{init_tracing, LogFormat};
use fleet_reconciler::{app, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    init_tracing(LogFormat::from_env());
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fleet-reconciler starting");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(
        concurrency = config.reconcile.concurrency,
        backfill = config.reconcile.backfill,
        "Configuration loaded"
    );

    app::run(config).await
}
