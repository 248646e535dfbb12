// Provider reconciliation callback run by Forman
// Decision: An unknown provider is dropped; lookup and reconcile failures back off and retry

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_forman::{Outcome, Request};
use fleet_storage::{ProviderCluster, ProviderStore};
use tracing::{error, info, instrument, warn};

/// Errors raised while driving a provider towards its desired state
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A desired-state step did not converge
    #[error("step {step} failed for provider {cluster_id}: {message}")]
    Step {
        step: &'static str,
        cluster_id: String,
        message: String,
    },
}

/// Drives a single provider towards its desired state
#[async_trait]
pub trait DesiredState: Send + Sync {
    async fn ensure(&self, provider: &ProviderCluster) -> Result<(), ReconcileError>;
}

/// Desired-state steps for a provider installation
///
/// The steps are not implemented yet: infra, cluster install, agent
/// operator, monitoring config and data-foundation config. Each provider is
/// logged as reconciled.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstallFlow;

#[async_trait]
impl DesiredState for InstallFlow {
    async fn ensure(&self, provider: &ProviderCluster) -> Result<(), ReconcileError> {
        info!(cluster_id = %provider.cluster_id, "Provider reconciled");
        Ok(())
    }
}

/// Reconciles one provider per request
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ProviderStore>,
    desired: Arc<dyn DesiredState>,
    retry_after: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ProviderStore>, retry_after: Duration) -> Self {
        Self {
            store,
            desired: Arc::new(InstallFlow),
            retry_after,
        }
    }

    pub fn with_desired_state(mut self, desired: Arc<dyn DesiredState>) -> Self {
        self.desired = desired;
        self
    }

    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    #[instrument(skip(self), fields(key = %request.key()))]
    pub async fn reconcile(&self, request: Request) -> Outcome {
        info!("Processing request");

        let provider = match self.store.get_provider_cluster(request.key()).await {
            Ok(Some(provider)) => provider,
            Ok(None) => {
                warn!("Provider not found, dropping request");
                return Outcome::done();
            }
            Err(e) => {
                error!(retry_after = ?self.retry_after, "Failed to get provider cluster: {}", e);
                return Outcome::requeue_after(self.retry_after);
            }
        };

        info!(
            cluster_id = %provider.cluster_id,
            account_id = %provider.account_id,
            satellite_id = %provider.satellite_id,
            "Provider loaded"
        );

        match self.desired.ensure(&provider).await {
            Ok(()) => Outcome::done(),
            Err(e) => {
                error!(retry_after = ?self.retry_after, "Failed to reconcile provider cluster: {}", e);
                Outcome::requeue_after(self.retry_after)
            }
        }
    }
}
