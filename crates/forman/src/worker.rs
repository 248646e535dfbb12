//! Pool members executing one request at a time

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use crate::guard::{run_guarded, Callback, Guarded};
use crate::request::Request;

/// Completion report sent from a worker back to the dispatcher
#[derive(Debug)]
pub(crate) struct Report {
    pub(crate) worker_id: usize,
    pub(crate) request: Request,
    pub(crate) guarded: Guarded,
}

/// Dispatcher-side handle to a worker
pub(crate) struct WorkerHandle {
    pub(crate) id: usize,
    assignments: mpsc::Sender<Request>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn a worker that reports completions on `reports`
    pub(crate) fn spawn(id: usize, callback: Callback, reports: mpsc::Sender<Report>) -> Self {
        // An idle worker holds at most one assignment
        let (assignments, rx) = mpsc::channel(1);
        let join = tokio::spawn(run(id, callback, rx, reports));
        Self {
            id,
            assignments,
            join,
        }
    }

    /// Hand a request to this worker
    ///
    /// Only called for idle workers, so the single assignment slot is free.
    /// Returns the request back if the worker is gone.
    pub(crate) fn assign(&self, request: Request) -> Result<(), Request> {
        self.assignments.try_send(request).map_err(|err| match err {
            mpsc::error::TrySendError::Full(request) => request,
            mpsc::error::TrySendError::Closed(request) => request,
        })
    }

    /// Close the assignment channel and wait for the current invocation to finish
    pub(crate) async fn stop(self) {
        drop(self.assignments);
        if let Err(e) = self.join.await {
            debug!(worker_id = self.id, "Worker task ended abnormally: {}", e);
        }
    }
}

#[instrument(skip_all, fields(worker_id = id))]
async fn run(
    id: usize,
    callback: Callback,
    mut assignments: mpsc::Receiver<Request>,
    reports: mpsc::Sender<Report>,
) {
    debug!("Worker started");

    while let Some(request) = assignments.recv().await {
        trace!(key = %request.key(), "Invoking callback");
        let guarded = run_guarded(&callback, request.clone()).await;

        let report = Report {
            worker_id: id,
            request,
            guarded,
        };
        if reports.send(report).await.is_err() {
            debug!("Dispatcher gone, worker exiting");
            break;
        }
    }

    debug!("Worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Outcome;
    use futures::FutureExt;
    use std::sync::Arc;

    fn callback() -> Callback {
        Arc::new(|request: Request| {
            async move {
                if request.key() == "explode" {
                    panic!("explode");
                }
                Outcome::done()
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_worker_reports_completion() {
        let (tx, mut rx) = mpsc::channel(1);
        let worker = WorkerHandle::spawn(3, callback(), tx);

        worker.assign(Request::new("a")).unwrap();
        let report = rx.recv().await.unwrap();

        assert_eq!(report.worker_id, 3);
        assert_eq!(report.request, Request::new("a"));
        assert_eq!(report.guarded, Guarded::Completed(Outcome::done()));

        worker.stop().await;
    }

    #[tokio::test]
    async fn test_worker_survives_panic() {
        let (tx, mut rx) = mpsc::channel(1);
        let worker = WorkerHandle::spawn(0, callback(), tx);

        worker.assign(Request::new("explode")).unwrap();
        let report = rx.recv().await.unwrap();
        assert!(report.guarded.is_panic());

        // Same worker keeps serving
        worker.assign(Request::new("b")).unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.guarded, Guarded::Completed(Outcome::done()));

        worker.stop().await;
    }

    #[tokio::test]
    async fn test_assign_to_stopped_worker_returns_request() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let worker = WorkerHandle::spawn(0, callback(), tx);

        // First assignment runs and the worker exits when reporting fails
        worker.assign(Request::new("a")).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(worker.assign(Request::new("b")), Err(Request::new("b")));
        worker.stop().await;
    }
}
