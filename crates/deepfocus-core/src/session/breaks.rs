//! Break-due detection.
//!
//! A break is due whenever elapsed time crosses a multiple of the interval
//! and no break of at least `min_break_minutes` happened within the last
//! interval. The tracker only signals; pausing stays a user action.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakTracker {
    interval_minutes: u64,
    min_break_minutes: u64,
    /// Elapsed minute at which the last qualifying break started.
    last_break_at: u64,
    /// Highest interval multiple already signalled.
    signalled: u64,
}

impl BreakTracker {
    pub fn new(interval_minutes: u32, min_break_minutes: u32) -> Self {
        Self {
            interval_minutes: u64::from(interval_minutes.max(1)),
            min_break_minutes: u64::from(min_break_minutes),
            last_break_at: 0,
            signalled: 0,
        }
    }

    pub fn interval_minutes(&self) -> u64 {
        self.interval_minutes
    }

    /// Returns `Some(multiple)` once per crossed multiple that needs a break.
    pub fn check(&mut self, elapsed_minutes: u64) -> Option<u64> {
        let multiple = elapsed_minutes / self.interval_minutes;
        if multiple == 0 || multiple <= self.signalled {
            return None;
        }
        self.signalled = multiple;
        let since_break = elapsed_minutes.saturating_sub(self.last_break_at);
        (since_break >= self.interval_minutes).then_some(multiple)
    }

    /// Count a pause as a break when it was long enough.
    pub fn record_pause(&mut self, elapsed_minutes: u64, paused_minutes: u64) -> bool {
        if paused_minutes >= self.min_break_minutes {
            self.last_break_at = elapsed_minutes;
            true
        } else {
            false
        }
    }
}
