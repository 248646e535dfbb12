//! Public scheduler handle

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::backoff::BackoffScheduler;
use crate::config::FormanConfig;
use crate::dispatcher::{Dispatcher, Envelope};
use crate::error::FormanError;
use crate::guard::Callback;
use crate::request::{Outcome, Request};
use crate::worker::WorkerHandle;

/// Point-in-time view of the scheduler, published by the dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormanStats {
    /// Invocations currently in progress
    pub active: usize,
    /// Requests cleared to run but waiting for a free worker
    pub ready: usize,
    /// Keys with work running, queued or in backoff
    pub tracked_keys: usize,
    /// Requests queued behind a running key
    pub pending: usize,
    /// Keys waiting on a backoff timer
    pub awaiting_backoff: usize,
    /// Requests accepted from producers
    pub submitted: u64,
    /// Callback invocations finished (including panics)
    pub invocations: u64,
    /// Invocations that finished the request
    pub completed: u64,
    /// Invocations that asked to run again
    pub requeues: u64,
    /// Invocations that panicked
    pub panics: u64,
}

/// Cloneable submission endpoint
///
/// Producers hold a `Submitter` to feed requests into the scheduler. Each
/// `submit` waits until the dispatcher has room for the request.
#[derive(Clone)]
pub struct Submitter {
    tx: mpsc::Sender<Envelope>,
}

impl Submitter {
    /// Submit a request, waiting while the hand-off queue is full
    pub async fn submit(&self, request: impl Into<Request>) -> Result<(), FormanError> {
        self.tx
            .send(Envelope::Submit(request.into()))
            .await
            .map_err(|_| FormanError::Closed)
    }

    /// Submit from synchronous code
    ///
    /// Blocks the current thread; must not be called from an async context.
    pub fn blocking_submit(&self, request: impl Into<Request>) -> Result<(), FormanError> {
        self.tx
            .blocking_send(Envelope::Submit(request.into()))
            .map_err(|_| FormanError::Closed)
    }

    /// True once the scheduler has stopped accepting requests
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Keyed work scheduler
///
/// Runs a callback for every submitted [`Request`] on a fixed pool of
/// workers. Requests with the same key never run concurrently: while a key
/// is running, further requests for it wait in FIFO order and each one gets
/// its own invocation. The callback's [`Outcome`] decides whether the request
/// runs again, immediately or after a delay. A panicking callback is treated
/// as an immediate requeue and never takes its worker down.
///
/// # Example
///
/// ```no_run
/// use fleet_forman::{Forman, FormanConfig, Outcome, Request};
///
/// # async fn example() -> Result<(), fleet_forman::FormanError> {
/// let forman = Forman::start(FormanConfig::new(4), |request: Request| async move {
///     tracing::info!(key = %request.key(), "reconciling");
///     Outcome::done()
/// })?;
///
/// forman.submit("cluster-a").await?;
///
/// // ... later
/// forman.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Forman {
    config: FormanConfig,
    submitter: Submitter,
    shutdown_tx: watch::Sender<bool>,
    stats_rx: watch::Receiver<FormanStats>,
    dispatcher: JoinHandle<()>,
}

impl Forman {
    /// Start the workers and the dispatcher
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(callback), fields(concurrency = config.concurrency))]
    pub fn start<F, Fut>(config: FormanConfig, callback: F) -> Result<Self, FormanError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        config.validate()?;

        let callback: Callback =
            Arc::new(move |request| -> BoxFuture<'static, Outcome> { Box::pin(callback(request)) });

        let (submissions_tx, submissions_rx) = mpsc::channel(config.queue_capacity);
        // Each worker has at most one unreported completion
        let (reports_tx, reports_rx) = mpsc::channel(config.concurrency);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stats_tx, stats_rx) = watch::channel(FormanStats::default());

        let workers = (0..config.concurrency)
            .map(|id| WorkerHandle::spawn(id, Arc::clone(&callback), reports_tx.clone()))
            .collect();
        drop(reports_tx);

        let backoff = BackoffScheduler::new(submissions_tx.clone(), shutdown_rx.clone());
        let dispatcher = Dispatcher::new(workers, backoff, stats_tx);
        let dispatcher = tokio::spawn(dispatcher.run(submissions_rx, reports_rx, shutdown_rx));

        info!(
            concurrency = config.concurrency,
            queue_capacity = config.queue_capacity,
            "Forman started"
        );

        Ok(Self {
            config,
            submitter: Submitter { tx: submissions_tx },
            shutdown_tx,
            stats_rx,
            dispatcher,
        })
    }

    /// Submit a request, waiting while the hand-off queue is full
    pub async fn submit(&self, request: impl Into<Request>) -> Result<(), FormanError> {
        self.submitter.submit(request).await
    }

    /// A cloneable endpoint for producers
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Latest statistics snapshot
    pub fn stats(&self) -> FormanStats {
        *self.stats_rx.borrow()
    }

    /// Subscribe to statistics updates
    pub fn watch_stats(&self) -> watch::Receiver<FormanStats> {
        self.stats_rx.clone()
    }

    /// Configured number of workers
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Stop accepting requests and wait for in-flight invocations
    ///
    /// Queued requests and pending retries are discarded. Invocations that
    /// are already running finish normally, but no further work is
    /// dispatched, so a key never gains a second invocation during teardown.
    #[instrument(skip(self))]
    pub async fn shutdown(self) -> Result<(), FormanError> {
        info!("Initiating graceful shutdown");
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(self.config.shutdown_timeout, self.dispatcher).await {
            Ok(Ok(())) => {
                info!("Forman stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Dispatcher task ended abnormally: {}", e);
                Ok(())
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.shutdown_timeout,
                    "Shutdown timeout reached"
                );
                Err(FormanError::ShutdownTimeout)
            }
        }
    }
}
