//! Panic containment around a single callback invocation

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::error;

use crate::request::{Outcome, Request};

/// Callback invoked once per request
pub type Callback = Arc<dyn Fn(Request) -> BoxFuture<'static, Outcome> + Send + Sync>;

/// Result of a guarded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Guarded {
    /// The callback returned normally
    Completed(Outcome),
    /// The callback panicked; the payload message is kept for logging
    Panicked(String),
}

impl Guarded {
    /// Fold both cases into an outcome. A panic becomes an immediate requeue.
    pub(crate) fn into_outcome(self) -> Outcome {
        match self {
            Guarded::Completed(outcome) => outcome,
            Guarded::Panicked(_) => Outcome::requeue(),
        }
    }

    pub(crate) fn is_panic(&self) -> bool {
        matches!(self, Guarded::Panicked(_))
    }
}

/// Run the callback for `request`, containing any panic
///
/// The callback is called inside the guarded future so that a panic raised
/// while building the future is caught as well as one raised while polling it.
pub(crate) async fn run_guarded(callback: &Callback, request: Request) -> Guarded {
    let key = request.key().to_string();
    let invocation = async move { callback(request).await };

    match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(outcome) => Guarded::Completed(outcome),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%key, panic = %message, "Callback panicked, requeueing");
            Guarded::Panicked(message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
