//! Per-key execution state
//!
//! The registry decides, for every submission and completion, whether a
//! request goes to a worker, waits in its key's pending queue, or waits for
//! a backoff timer. It holds no workers itself; the dispatcher owns it and
//! is the only code that mutates it, which is what keeps two invocations for
//! the same key from ever overlapping.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::request::{Outcome, Request};

/// Execution state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyState {
    /// Nothing running or pending. Idle keys have no registry entry.
    Idle,
    /// An invocation is in progress or the request is waiting for a free worker
    Running,
    /// The last invocation asked for a delayed retry; a timer is pending
    AwaitingBackoff,
}

#[derive(Debug)]
struct KeyEntry {
    state: KeyState,
    pending: VecDeque<Request>,
}

impl KeyEntry {
    fn running() -> Self {
        Self {
            state: KeyState::Running,
            pending: VecDeque::new(),
        }
    }
}

/// What to do with a newly arrived request
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Hand the request to a worker
    Dispatch(Request),
    /// The key is busy; the request waits in its pending queue
    Queued { depth: usize },
}

/// What to do after an invocation finished
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Hand this request (the retried one, or the next pending one) to a worker
    Dispatch(Request),
    /// Arm a timer that re-submits the request after the delay
    Backoff(Request, Duration),
    /// Nothing left for the key; its entry was removed
    Idle,
}

#[derive(Debug, Default)]
pub(crate) struct KeyRegistry {
    entries: HashMap<String, KeyEntry>,
}

impl KeyRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A request submitted by a producer
    ///
    /// Idle keys start running. Keys that are running or waiting on a backoff
    /// timer queue the request behind the work already in progress.
    pub(crate) fn admit(&mut self, request: Request) -> Admission {
        match self.entries.get_mut(request.key()) {
            None => {
                self.entries
                    .insert(request.key().to_string(), KeyEntry::running());
                Admission::Dispatch(request)
            }
            Some(entry) => {
                entry.pending.push_back(request);
                Admission::Queued {
                    depth: entry.pending.len(),
                }
            }
        }
    }

    /// A request re-submitted by its backoff timer
    ///
    /// The retry resumes the work that asked for it, so it runs ahead of any
    /// request queued for the key while the timer was pending.
    pub(crate) fn resume(&mut self, request: Request) -> Admission {
        match self.entries.get_mut(request.key()) {
            Some(entry) if entry.state == KeyState::AwaitingBackoff => {
                entry.state = KeyState::Running;
                Admission::Dispatch(request)
            }
            Some(entry) => {
                entry.pending.push_front(request);
                Admission::Queued {
                    depth: entry.pending.len(),
                }
            }
            None => self.admit(request),
        }
    }

    /// An invocation for `request` finished with `outcome`
    pub(crate) fn complete(&mut self, request: Request, outcome: Outcome) -> Completion {
        let Some(entry) = self.entries.get_mut(request.key()) else {
            // Completions always follow a dispatch, which created the entry.
            // Treat a missing entry as a fresh submission rather than losing work.
            return if outcome.requeue {
                self.complete_missing(request, outcome)
            } else {
                Completion::Idle
            };
        };

        if outcome.is_immediate_requeue() {
            entry.state = KeyState::Running;
            return Completion::Dispatch(request);
        }

        if outcome.requeue {
            entry.state = KeyState::AwaitingBackoff;
            return Completion::Backoff(request, outcome.after);
        }

        match entry.pending.pop_front() {
            Some(next) => {
                entry.state = KeyState::Running;
                Completion::Dispatch(next)
            }
            None => {
                self.entries.remove(request.key());
                Completion::Idle
            }
        }
    }

    fn complete_missing(&mut self, request: Request, outcome: Outcome) -> Completion {
        let mut entry = KeyEntry::running();
        let completion = if outcome.is_immediate_requeue() {
            Completion::Dispatch(request.clone())
        } else {
            entry.state = KeyState::AwaitingBackoff;
            Completion::Backoff(request.clone(), outcome.after)
        };
        self.entries.insert(request.key().to_string(), entry);
        completion
    }

    /// Current state of a key
    pub(crate) fn state(&self, key: &str) -> KeyState {
        self.entries
            .get(key)
            .map(|entry| entry.state)
            .unwrap_or(KeyState::Idle)
    }

    /// Number of requests queued behind the running one for `key`
    pub(crate) fn pending_len(&self, key: &str) -> usize {
        self.entries
            .get(key)
            .map(|entry| entry.pending.len())
            .unwrap_or(0)
    }

    /// Number of keys with work in progress, queued, or in backoff
    pub(crate) fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Number of keys waiting on a backoff timer
    pub(crate) fn awaiting_backoff(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.state == KeyState::AwaitingBackoff)
            .count()
    }

    /// Total requests queued behind running keys
    pub(crate) fn pending_total(&self) -> usize {
        self.entries.values().map(|entry| entry.pending.len()).sum()
    }
}
