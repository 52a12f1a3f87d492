//! Debounce with duplicate suppression and a skipped first value.
//!
//! [`Debouncer`] is a plain state object: a pending value plus its deadline,
//! and the last value that settled. Time is passed in by the caller, so the
//! whole contract can be exercised without a running clock:
//!
//! 1. every [`push`](Debouncer::push) replaces the pending value and restarts
//!    the quiet window;
//! 2. when the window elapses the pending value *settles*;
//! 3. a settled value equal to the previous settled value is dropped;
//! 4. the very first settled value only establishes the baseline.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
    settled: Option<T>,
}

impl<T: Clone + PartialEq> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            settled: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a new value observed at `now`.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.window));
    }

    /// When the pending value settles, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    /// The last settled value, including the baseline.
    pub fn settled(&self) -> Option<&T> {
        self.settled.as_ref()
    }

    /// Settle the pending value if its window has elapsed at `now`.
    ///
    /// Returns the value only when it should fire: not the first settled
    /// value, and different from the previous one.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => {}
            _ => return None,
        }
        let (value, _) = self.pending.take()?;

        match self.settled.replace(value.clone()) {
            Some(previous) if previous != value => Some(value),
            _ => None,
        }
    }
}
