// Process wiring: storage, scheduler and change feed
// Decision: A failed or closed change feed does not stop the process; only a signal does

use std::sync::Arc;

use anyhow::{Context, Result};
use fleet_forman::{Forman, Request, Submitter};
use fleet_storage::{Database, ProviderListener, ProviderSink};
use futures::FutureExt;
use tracing::{info, warn};

use crate::config::Config;
use crate::reconcile::Reconciler;

/// Sink that turns every provider id into a scheduler request
pub fn provider_sink(submitter: Submitter) -> ProviderSink {
    Arc::new(move |provider_id: String| {
        let submitter = submitter.clone();
        async move {
            if let Err(e) = submitter.submit(Request::new(provider_id.as_str())).await {
                warn!(provider = %provider_id, "Dropping provider notification: {}", e);
            }
        }
        .boxed()
    })
}

/// Start a scheduler running `reconciler` for every request
pub fn start_forman(config: &Config, reconciler: Reconciler) -> Result<Forman> {
    let forman = Forman::start(config.reconcile.forman_config(), move |request| {
        let reconciler = reconciler.clone();
        async move { reconciler.reconcile(request).await }
    })
    .context("failed to start scheduler")?;
    Ok(forman)
}

/// Shut down the scheduler within its configured timeout
pub async fn stop_scheduler(forman: Forman) -> Result<()> {
    forman
        .shutdown()
        .await
        .context("scheduler did not stop cleanly")
}

/// Run until SIGINT or SIGTERM, then tear everything down
pub async fn run(config: Config) -> Result<()> {
    let db = Database::connect(config.db.connect_options(), &config.db.tables)
        .await
        .context("failed to create database client")?;

    let reconciler = Reconciler::new(Arc::new(db.clone()), config.reconcile.retry_after());
    let forman = start_forman(&config, reconciler)?;

    let listener = match ProviderListener::start(
        &db,
        config.reconcile.backfill,
        provider_sink(forman.submitter()),
    )
    .await
    {
        Ok(listener) => listener,
        Err(e) => {
            if let Err(stop_err) = stop_scheduler(forman).await {
                warn!("{:#}", stop_err);
            }
            db.close().await;
            return Err(e).context("failed to register provider listener");
        }
    };

    info!("Fleet reconciler running");
    shutdown_signal().await;
    info!("Received signal, shutting down");

    listener.stop();
    let stopped = stop_scheduler(forman).await;
    db.close().await;

    stopped?;
    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
