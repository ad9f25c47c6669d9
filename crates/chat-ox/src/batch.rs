//! Coalescing of text deltas: one flush operation, two triggers.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Minimum pending size that forces an immediate flush
pub const BATCH_MIN_SIZE: usize = 20;

/// Period of the flush ticker
pub const BATCH_DELAY: Duration = Duration::from_millis(50);

/// When buffered text is handed to the callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Flush as soon as this many UTF-16 code units are pending
    pub min_size: usize,
    /// Flush pending text once this much time has passed since the last flush
    pub interval: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            min_size: BATCH_MIN_SIZE,
            interval: BATCH_DELAY,
        }
    }
}

impl BatchPolicy {
    /// Forward every fragment as soon as it arrives.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            min_size: 1,
            interval: BATCH_DELAY,
        }
    }
}

/// Size and time triggers for the text buffer.
///
/// The ticker is created on the first buffered fragment and torn down once by
/// [`FlushScheduler::stop`]; after that it never re-arms.
#[derive(Debug)]
pub(crate) struct FlushScheduler {
    policy: BatchPolicy,
    last_emit: Instant,
    ticker: Option<Interval>,
    stopped: bool,
}

impl FlushScheduler {
    pub(crate) fn new(policy: BatchPolicy) -> Self {
        Self {
            policy,
            last_emit: Instant::now(),
            ticker: None,
            stopped: false,
        }
    }

    pub(crate) fn policy(&self) -> BatchPolicy {
        self.policy
    }

    pub(crate) fn arm(&mut self) {
        if self.ticker.is_some() || self.stopped {
            return;
        }
        let period = self.policy.interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.ticker.is_some()
    }

    /// Resolves on the next tick; never resolves while unarmed.
    pub(crate) async fn tick(&mut self) -> Instant {
        match self.ticker.as_mut() {
            Some(ticker) => ticker.tick().await,
            None => std::future::pending().await,
        }
    }

    pub(crate) fn size_reached(&self, pending_units: usize) -> bool {
        pending_units >= self.policy.min_size
    }

    pub(crate) fn interval_elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_emit) >= self.policy.interval
    }

    pub(crate) fn mark_emitted(&mut self, now: Instant) {
        self.last_emit = now;
    }

    /// Clear the ticker. Returns whether it was running.
    pub(crate) fn stop(&mut self) -> bool {
        self.stopped = true;
        self.ticker.take().is_some()
    }
}
