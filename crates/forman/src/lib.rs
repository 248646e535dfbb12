//! # Forman
//!
//! A keyed work scheduler: a fixed pool of workers running a reconciliation
//! callback once per submitted request.
//!
//! ## Guarantees
//!
//! - **One invocation per key at a time**: requests sharing a key are queued
//!   (FIFO, never merged) while the key is running
//! - **Bounded parallelism**: at most `concurrency` invocations run at once
//! - **Panic containment**: a panicking callback is logged and retried
//!   immediately; its worker keeps serving
//! - **Declarative retries**: the callback's [`Outcome`] asks for an
//!   immediate or delayed requeue, with no retry ceiling imposed here
//! - **Backpressure**: producers wait in `submit` while the bounded hand-off
//!   queue is full
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │   Producers (change feed, backfill)   BackoffScheduler       │
//! │        │ submit                         │ retry (timer)      │
//! │        ▼                                ▼                    │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │           bounded hand-off queue (mpsc)              │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │        │                                                     │
//! │        ▼                                                     │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │  Dispatcher (owns KeyRegistry: key → state+pending)  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │        │ assign                         ▲ report             │
//! │        ▼                                │                    │
//! │  [Worker 0] [Worker 1] ... [Worker N-1]  (panic guarded)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use fleet_forman::prelude::*;
//! use std::time::Duration;
//!
//! let forman = Forman::start(FormanConfig::new(8), |request: Request| async move {
//!     match reconcile(request.key()).await {
//!         Ok(()) => Outcome::done(),
//!         Err(_) => Outcome::requeue_after(Duration::from_secs(60)),
//!     }
//! })?;
//!
//! forman.submit("cluster-a").await?;
//! ```

mod backoff;
mod config;
mod dispatcher;
mod error;
mod forman;
mod guard;
mod registry;
mod request;
mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::FormanConfig;
    pub use crate::error::FormanError;
    pub use crate::forman::{Forman, FormanStats, Submitter};
    pub use crate::request::{Outcome, Request};
}

pub use config::FormanConfig;
pub use error::FormanError;
pub use forman::{Forman, FormanStats, Submitter};
pub use guard::Callback;
pub use request::{Outcome, Request};
