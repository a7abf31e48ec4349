//! Debounced scheduling of re-scans from mutation bursts.
//!
//! The host page streams DOM in bursts of dozens of insertions. Scanning on
//! every batch would contend with the page's own rendering, so the
//! scheduler keeps a single trailing-debounce deadline: every batch resets
//! it, and only once the page has stayed quiet for the configured period
//! does one scan fire. The scan itself runs on a later loop turn, never
//! inside mutation delivery. Scans are cheap and idempotent, so a single
//! live deadline is the whole re-entrancy story; there is nothing to lock.

use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

pub struct MutationScheduler {
    debounce: Duration,
    deadline: Option<Instant>,
    active: bool,
}

impl MutationScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: None,
            active: false,
        }
    }

    /// Attach the mutation intake. Idempotent; returns true when this call
    /// actually activated it.
    pub fn start(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        true
    }

    /// Detach the intake and cancel any pending scan. After this returns no
    /// scan deadline remains.
    pub fn stop(&mut self) {
        self.active = false;
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// A mutation batch arrived: restart the trailing debounce.
    /// Ignored while the intake is detached.
    pub fn note_mutations(&mut self, now: Instant) -> bool {
        if !self.active {
            return false;
        }
        self.deadline = Some(now + self.debounce);
        trace!("Debounce deadline reset");
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the deadline when due. Returns true exactly once per quiet
    /// period, no matter how many batches fed into it.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if now >= d && self.active => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
