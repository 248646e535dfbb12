//! Request and outcome types exchanged between the scheduler and the callback

use std::fmt;
use std::time::Duration;

/// A unit of work, identified by its key
///
/// Requests are immutable once created. Every submitted request results in
/// its own callback invocation; requests sharing a key are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    key: String,
}

impl Request {
    /// Create a request for the given key
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The key identifying this unit of work
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<&str> for Request {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for Request {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

/// Outcome of a single callback invocation
///
/// `requeue == false` means the work is finished (success or permanent
/// give-up). `requeue == true` asks the scheduler to run the same request
/// again after `after`; a zero delay means immediately, ahead of any other
/// requests queued for the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Whether the request should run again
    pub requeue: bool,

    /// Delay before the next run (only meaningful when `requeue` is set)
    pub after: Duration,
}

impl Outcome {
    /// Work is finished, nothing more to do for this request
    pub fn done() -> Self {
        Self::default()
    }

    /// Run the request again immediately
    pub fn requeue() -> Self {
        Self {
            requeue: true,
            after: Duration::ZERO,
        }
    }

    /// Run the request again once `after` has elapsed
    pub fn requeue_after(after: Duration) -> Self {
        Self {
            requeue: true,
            after,
        }
    }

    /// True when the request should run again without waiting
    pub fn is_immediate_requeue(&self) -> bool {
        self.requeue && self.after.is_zero()
    }
}
