//! Single-slot debounce timer.
//!
//! A [`Debounce`] holds at most one pending deadline. Scheduling replaces
//! whatever was pending, so a burst of triggers produces exactly one firing,
//! `delay` after the last trigger. The timer never sleeps on its own: the
//! caller asks [`Debounce::fire`] whether the deadline has passed, which
//! keeps this module free of I/O and lets tests drive time explicitly.

use std::time::{Duration, Instant};

/// A pending debounce deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    /// Monotonic generation; bumped by every schedule.
    pub generation: u64,
    /// When the timer fires.
    pub deadline: Instant,
}

/// One debounce slot with a fixed quiet period.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    generation: u64,
    pending: Option<PendingTimer>,
}

impl Debounce {
    /// Create an idle debounce with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            pending: None,
        }
    }

    /// The quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Change the quiet period. A pending deadline keeps its old value.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Cancel any pending deadline and schedule a new one at `now + delay`.
    ///
    /// Cancel-and-replace is one operation: there is no window in which two
    /// deadlines are pending.
    pub fn schedule(&mut self, now: Instant) -> PendingTimer {
        self.generation = self.generation.wrapping_add(1);
        let timer = PendingTimer {
            generation: self.generation,
            deadline: now + self.delay,
        };
        self.pending = Some(timer);
        timer
    }

    /// Drop the pending deadline, returning it if there was one.
    pub fn cancel(&mut self) -> Option<PendingTimer> {
        self.pending.take()
    }

    /// The pending deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|t| t.deadline)
    }

    /// Check if a deadline is pending.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume the pending deadline if it has passed.
    ///
    /// Returns `true` exactly once per scheduled deadline.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(timer) if timer.deadline <= now => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}
