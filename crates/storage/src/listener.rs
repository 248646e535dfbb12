// Provider change feed
//
// Decision: A lost notification connection stops the listener instead of
// reconnecting; notifications sent while disconnected would be missed anyway,
// so reconnecting is left to the process owner (restart, which re-runs backfill)

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::postgres::PgListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::StorageError;
use crate::repositories::{Database, ProviderStore};

/// Receives the id of every new or changed provider
pub type ProviderSink = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Pause after a receive error before waiting for the next notification
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Running change feed
pub struct ProviderListener {
    live: JoinHandle<()>,
    backfill: Option<JoinHandle<()>>,
}

impl ProviderListener {
    /// Subscribe to provider notifications and forward each payload to `sink`
    ///
    /// With `notify_existing`, every provider already in the table is also
    /// forwarded once, concurrently with live notifications.
    #[instrument(skip(db, sink))]
    pub async fn start(
        db: &Database,
        notify_existing: bool,
        sink: ProviderSink,
    ) -> Result<Self, StorageError> {
        let channel = db.tables().providers().to_string();

        let mut listener = PgListener::connect_with(db.pool())
            .await
            .map_err(StorageError::Listener)?;
        listener
            .listen(&channel)
            .await
            .map_err(StorageError::Listener)?;
        info!(%channel, "Listening for provider notifications");

        let live = tokio::spawn(forward_notifications(listener, Arc::clone(&sink)));

        let backfill = notify_existing.then(|| {
            let store: Arc<dyn ProviderStore> = Arc::new(db.clone());
            tokio::spawn(async move {
                match backfill_providers(store.as_ref(), &sink).await {
                    Ok(count) => info!(count, "Backfill of existing providers finished"),
                    Err(e) => error!("Failed to enumerate existing providers: {}", e),
                }
            })
        });

        Ok(Self { live, backfill })
    }

    /// True while live notifications are still being forwarded
    pub fn is_live(&self) -> bool {
        !self.live.is_finished()
    }

    /// Stop forwarding notifications and abandon any unfinished backfill
    pub fn stop(self) {
        self.live.abort();
        if let Some(backfill) = self.backfill {
            backfill.abort();
        }
        debug!("Provider listener stopped");
    }
}

async fn forward_notifications(mut listener: PgListener, sink: ProviderSink) {
    loop {
        match listener.try_recv().await {
            Ok(Some(notification)) => {
                let provider = notification.payload().to_string();
                debug!(%provider, "Provider notification received");
                sink(provider).await;
            }
            Ok(None) => {
                error!("Connection closed by server, provider notifications stopped");
                return;
            }
            Err(e) => {
                warn!("Failed to wait for notification: {}", e);
                tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
            }
        }
    }
}

/// Forward the id of every known provider to `sink`
///
/// Returns how many providers were forwarded.
pub async fn backfill_providers(
    store: &dyn ProviderStore,
    sink: &ProviderSink,
) -> Result<usize, StorageError> {
    let ids = store.list_provider_ids().await?;
    let count = ids.len();
    debug!(count, "Backfilling existing providers");

    for id in ids {
        sink(id).await;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderCluster;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::sync::Mutex;

    struct FakeStore {
        ids: Result<Vec<String>, ()>,
    }

    #[async_trait]
    impl ProviderStore for FakeStore {
        async fn get_provider_cluster(
            &self,
            _cluster_id: &str,
        ) -> Result<Option<ProviderCluster>, StorageError> {
            Ok(None)
        }

        async fn list_provider_ids(&self) -> Result<Vec<String>, StorageError> {
            self.ids
                .clone()
                .map_err(|_| StorageError::Query(sqlx::Error::PoolClosed))
        }
    }

    fn collecting_sink() -> (ProviderSink, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink: ProviderSink = Arc::new(move |id| {
            let captured = Arc::clone(&captured);
            async move { captured.lock().unwrap().push(id) }.boxed()
        });
        (sink, seen)
    }

    #[test_log::test(tokio::test)]
    async fn test_backfill_forwards_every_provider_in_order() {
        let store = FakeStore {
            ids: Ok(vec!["a".into(), "b".into(), "c".into()]),
        };
        let (sink, seen) = collecting_sink();

        let count = backfill_providers(&store, &sink).await.unwrap();

        assert_eq!(count, 3);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_backfill_with_no_providers() {
        let store = FakeStore { ids: Ok(vec![]) };
        let (sink, seen) = collecting_sink();

        assert_eq!(backfill_providers(&store, &sink).await.unwrap(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_backfill_propagates_query_error() {
        let store = FakeStore { ids: Err(()) };
        let (sink, seen) = collecting_sink();

        let result = backfill_providers(&store, &sink).await;

        assert!(matches!(result, Err(StorageError::Query(_))));
        assert!(seen.lock().unwrap().is_empty());
    }
}
