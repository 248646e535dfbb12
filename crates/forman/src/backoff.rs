//! Delayed re-submission of requeued requests
//!
//! Each pending retry is a sleeping tokio task; the runtime's timer wheel
//! backs them, so an idle retry costs neither a worker nor an OS timer.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::dispatcher::Envelope;
use crate::request::Request;

/// Arms one-shot timers that feed requests back into the dispatcher
#[derive(Clone)]
pub(crate) struct BackoffScheduler {
    submissions: mpsc::Sender<Envelope>,
    shutdown_rx: watch::Receiver<bool>,
}

impl BackoffScheduler {
    pub(crate) fn new(
        submissions: mpsc::Sender<Envelope>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            submissions,
            shutdown_rx,
        }
    }

    /// Re-submit `request` once `delay` has elapsed
    ///
    /// The timer goes through the same bounded queue producers use, so it
    /// only ever waits on its own task. It is dropped on shutdown.
    pub(crate) fn schedule_after(&self, delay: Duration, request: Request) {
        let submissions = self.submissions.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let key = request.key().to_string();
            let fire = async move {
                tokio::time::sleep(delay).await;
                trace!(key = %request.key(), "Backoff elapsed, re-submitting");
                submissions.send(Envelope::Retry(request)).await
            };

            tokio::select! {
                sent = fire => {
                    if sent.is_err() {
                        debug!(%key, "Dispatcher gone, dropping retry");
                    }
                }
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    debug!(%key, "Shutdown requested, dropping pending retry");
                }
            }
        });
    }
}
