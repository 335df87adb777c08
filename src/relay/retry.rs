use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many times one edge may be transmitted, and whether the poll loop
/// waits for each outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryPolicy {
    /// Transmissions per edge, the first one included
    pub max_attempts: u32,
    pub mode: RetryMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum RetryMode {
    /// Hold the poll loop until the send completes or `attempt_timeout_ms`
    /// passes, resending straight away on failure
    Blocking { attempt_timeout_ms: u64 },
    /// Return to polling after each send and resend from the completion
    /// handler. A newer edge replaces the payload being retried.
    NonBlocking,
}

impl RetryPolicy {
    pub const fn blocking() -> Self {
        Self {
            max_attempts: 10,
            mode: RetryMode::Blocking {
                attempt_timeout_ms: 500,
            },
        }
    }

    pub const fn non_blocking() -> Self {
        Self {
            max_attempts: 70,
            mode: RetryMode::NonBlocking,
        }
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        match self.mode {
            RetryMode::Blocking { attempt_timeout_ms } => {
                Some(Duration::from_millis(attempt_timeout_ms))
            }
            RetryMode::NonBlocking => None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::blocking()
    }
}

/// Progress of the transmission for the current edge
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    in_flight: bool,
}

impl RetryState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// A send was accepted and its completion has not arrived yet
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.in_flight = true;
        self.attempts
    }

    pub(crate) fn settle(&mut self) {
        self.in_flight = false;
    }

    pub(crate) fn exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempts >= policy.max_attempts
    }
}

/// Orders send completions against the sends that caused them.
///
/// The radio reports completions in the order the sends were accepted, so
/// counting both is enough to tell whether a completion belongs to the
/// latest transmission or to one that a newer edge or a timeout already
/// left behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SendSequence {
    accepted: u64,
    completed: u64,
    latest: u64,
}

impl SendSequence {
    /// The radio accepted a send; it is now the latest one
    pub(crate) fn accept(&mut self) {
        self.accepted += 1;
        self.latest = self.accepted;
    }

    /// Account for one completion. Returns whether it belongs to the latest
    /// send; `false` also covers completions nothing was waiting for.
    pub(crate) fn complete(&mut self) -> bool {
        if self.completed == self.accepted {
            return false;
        }
        self.completed += 1;
        self.completed == self.latest
    }

    pub(crate) fn outstanding(&self) -> u64 {
        self.accepted - self.completed
    }
}
