//! Poll rate limiting
//!
//! Unforced polls closer together than the minimum interval are dropped.
//! Forced polls always go through and still reset the timer.

use std::time::{Duration, Instant};
use tracing::debug;

/// Time of the last accepted poll
#[derive(Debug, Clone, Copy, Default)]
pub struct PollTimer {
    last_accepted: Option<Instant>,
}

impl PollTimer {
    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }
}

/// Decision for a single poll request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Fetch after the given delay
    Dispatch { delay: Duration },
    /// Too soon after the previous poll
    Throttled { retry_after: Duration },
}

impl PollDecision {
    pub fn is_dispatch(&self) -> bool {
        matches!(self, PollDecision::Dispatch { .. })
    }
}

/// Rate limiter in front of the fetch client
#[derive(Debug, Clone)]
pub struct PollScheduler {
    min_interval: Duration,
    dispatch_delay: Duration,
    timer: PollTimer,
}

impl PollScheduler {
    pub fn new(min_interval: Duration, dispatch_delay: Duration) -> Self {
        Self {
            min_interval,
            dispatch_delay,
            timer: PollTimer::default(),
        }
    }

    pub fn timer(&self) -> PollTimer {
        self.timer
    }

    /// Decide on a poll at the current instant
    pub fn request(&mut self, force: bool) -> PollDecision {
        self.request_at(force, Instant::now())
    }

    /// Decide on a poll at `now`
    pub fn request_at(&mut self, force: bool, now: Instant) -> PollDecision {
        if !force {
            if let Some(last) = self.timer.last_accepted {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.min_interval {
                    let retry_after = self.min_interval - elapsed;
                    debug!(?elapsed, ?retry_after, "Poll throttled");
                    return PollDecision::Throttled { retry_after };
                }
            }
        }

        self.timer.last_accepted = Some(now);
        PollDecision::Dispatch {
            delay: self.dispatch_delay,
        }
    }

    /// Forget the last poll, e.g. after reinitialization
    pub fn reset(&mut self) {
        self.timer = PollTimer::default();
    }
}
