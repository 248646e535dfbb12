//! The dispatcher task
//!
//! A single task owns the key registry, the worker handles and the queue of
//! requests waiting for a free worker. Submissions, retries and worker
//! completions all arrive as messages, so per-key state is only ever touched
//! from one place.

use std::collections::VecDeque;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace};

use crate::backoff::BackoffScheduler;
use crate::forman::FormanStats;
use crate::registry::{Admission, Completion, KeyRegistry};
use crate::request::Request;
use crate::worker::{Report, WorkerHandle};

/// Messages accepted on the hand-off queue
#[derive(Debug)]
pub(crate) enum Envelope {
    /// A request from a producer
    Submit(Request),
    /// A request re-submitted by its backoff timer
    Retry(Request),
}

pub(crate) struct Dispatcher {
    registry: KeyRegistry,
    /// Indexed by worker id
    workers: Vec<WorkerHandle>,
    idle: Vec<usize>,
    /// Requests cleared to run, waiting for a worker (at most one per key)
    ready: VecDeque<Request>,
    backoff: BackoffScheduler,
    stats: FormanStats,
    stats_tx: watch::Sender<FormanStats>,
}

impl Dispatcher {
    pub(crate) fn new(
        workers: Vec<WorkerHandle>,
        backoff: BackoffScheduler,
        stats_tx: watch::Sender<FormanStats>,
    ) -> Self {
        // Pop from the back, so reverse to hand out worker 0 first
        let idle = workers.iter().rev().map(|worker| worker.id).collect();
        Self {
            registry: KeyRegistry::new(),
            workers,
            idle,
            ready: VecDeque::new(),
            backoff,
            stats: FormanStats::default(),
            stats_tx,
        }
    }

    /// Run until shutdown is requested or the Forman handle is dropped
    pub(crate) async fn run(
        mut self,
        mut submissions: mpsc::Receiver<Envelope>,
        mut reports: mpsc::Receiver<Report>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        debug!(workers = self.workers.len(), "Dispatcher started");
        self.publish();

        loop {
            tokio::select! {
                biased;

                // A dropped sender means the Forman handle is gone
                _ = shutdown_rx.changed() => {
                    debug!("Dispatcher: shutdown requested");
                    break;
                }

                Some(report) = reports.recv() => {
                    self.on_report(report);
                }

                // While a request waits for a worker every worker is busy;
                // stop accepting so producers block on the bounded queue.
                // The backoff scheduler holds a sender, so this never yields None.
                Some(envelope) = submissions.recv(), if self.ready.is_empty() => {
                    self.on_envelope(envelope);
                }
            }

            self.publish();
        }

        drop(submissions);
        drop(reports);
        self.stop_workers().await;
    }

    fn on_envelope(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Submit(request) => {
                self.stats.submitted += 1;
                let state = self.registry.state(request.key());
                let key = request.key().to_string();
                match self.registry.admit(request) {
                    Admission::Dispatch(request) => self.enqueue(request),
                    Admission::Queued { depth } => {
                        debug!(%key, ?state, depth, "Key busy, request queued");
                    }
                }
            }
            Envelope::Retry(request) => {
                let key = request.key().to_string();
                match self.registry.resume(request) {
                    Admission::Dispatch(request) => {
                        trace!(%key, "Backoff finished, dispatching retry");
                        self.enqueue(request);
                    }
                    Admission::Queued { depth } => {
                        debug!(%key, depth, "Retry queued at head of pending requests");
                    }
                }
            }
        }
    }

    fn on_report(&mut self, report: Report) {
        let Report {
            worker_id,
            request,
            guarded,
        } = report;

        self.idle.push(worker_id);
        self.stats.invocations += 1;
        if guarded.is_panic() {
            self.stats.panics += 1;
        }

        let outcome = guarded.into_outcome();
        if outcome.requeue {
            self.stats.requeues += 1;
        } else {
            self.stats.completed += 1;
        }

        let key = request.key().to_string();
        match self.registry.complete(request, outcome) {
            Completion::Dispatch(next) => {
                trace!(%key, requeue = outcome.requeue, "Dispatching next request for key");
                self.enqueue(next);
            }
            Completion::Backoff(request, delay) => {
                debug!(
                    %key,
                    ?delay,
                    pending = self.registry.pending_len(&key),
                    "Requeue after backoff"
                );
                self.backoff.schedule_after(delay, request);
            }
            Completion::Idle => {
                trace!(%key, "Key idle");
            }
        }

        // The freed worker may serve a request that was waiting
        self.pump();
    }

    fn enqueue(&mut self, request: Request) {
        self.ready.push_back(request);
        self.pump();
    }

    /// Hand waiting requests to idle workers
    fn pump(&mut self) {
        while !self.ready.is_empty() {
            let Some(worker_id) = self.idle.pop() else {
                break;
            };
            let Some(request) = self.ready.pop_front() else {
                self.idle.push(worker_id);
                break;
            };

            if let Err(request) = self.workers[worker_id].assign(request) {
                // The worker is not returned to the idle list
                error!(worker_id, key = %request.key(), "Worker unavailable, retrying on another");
                self.ready.push_front(request);
            }
        }
    }

    fn publish(&mut self) {
        self.stats.active = self.workers.len() - self.idle.len();
        self.stats.ready = self.ready.len();
        self.stats.tracked_keys = self.registry.tracked_keys();
        self.stats.pending = self.registry.pending_total();
        self.stats.awaiting_backoff = self.registry.awaiting_backoff();
        self.stats_tx.send_replace(self.stats);
    }

    async fn stop_workers(mut self) {
        info!(
            active = self.stats.active,
            discarded = self.ready.len() + self.registry.pending_total(),
            awaiting_backoff = self.registry.awaiting_backoff(),
            "Dispatcher stopping, waiting for in-flight invocations"
        );

        let workers = std::mem::take(&mut self.workers);
        futures::future::join_all(workers.into_iter().map(WorkerHandle::stop)).await;

        self.idle.clear();
        self.ready.clear();
        self.stats.active = 0;
        self.stats.ready = 0;
        self.stats_tx.send_replace(self.stats);
        info!("Dispatcher stopped");
    }
}
