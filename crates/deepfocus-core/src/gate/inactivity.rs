//! Inactivity and visibility monitor.
//!
//! Flags a possible distraction once per idle stretch, and immediately
//! when the host surface is hidden.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A self-inflicted distraction noticed by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistractionSignal {
    Inactivity { idle_secs: i64, at: DateTime<Utc> },
    SurfaceHidden { at: DateTime<Utc> },
}

impl DistractionSignal {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            DistractionSignal::Inactivity { at, .. } | DistractionSignal::SurfaceHidden { at } => *at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InactivityMonitor {
    threshold_secs: i64,
    last_activity: Option<DateTime<Utc>>,
    flagged: bool,
    hidden: bool,
}

impl InactivityMonitor {
    pub fn new(threshold_secs: u64) -> Self {
        Self {
            threshold_secs: threshold_secs.max(1) as i64,
            last_activity: None,
            flagged: false,
            hidden: false,
        }
    }

    pub fn threshold(&self) -> Duration {
        Duration::seconds(self.threshold_secs)
    }

    /// Start watching from `now`.
    pub fn arm(&mut self, now: DateTime<Utc>) {
        self.last_activity = Some(now);
        self.flagged = false;
        self.hidden = false;
    }

    pub fn disarm(&mut self) {
        self.last_activity = None;
        self.flagged = false;
        self.hidden = false;
    }

    pub fn is_armed(&self) -> bool {
        self.last_activity.is_some()
    }

    pub fn note_activity(&mut self, now: DateTime<Utc>) {
        if self.is_armed() {
            self.last_activity = Some(now);
            self.flagged = false;
        }
    }

    pub fn note_visibility(&mut self, hidden: bool, now: DateTime<Utc>) -> Option<DistractionSignal> {
        if !self.is_armed() {
            return None;
        }
        let newly_hidden = hidden && !self.hidden;
        self.hidden = hidden;
        if !hidden {
            self.note_activity(now);
        }
        newly_hidden.then_some(DistractionSignal::SurfaceHidden { at: now })
    }

    /// Returns a signal the first time inactivity exceeds the threshold.
    pub fn check(&mut self, now: DateTime<Utc>) -> Option<DistractionSignal> {
        let last = self.last_activity?;
        let idle_secs = (now - last).num_seconds();
        if self.flagged || idle_secs <= self.threshold_secs {
            return None;
        }
        self.flagged = true;
        Some(DistractionSignal::Inactivity { idle_secs, at: now })
    }

    /// Shift the reference point forward, e.g. across a pause.
    pub fn skip_to(&mut self, now: DateTime<Utc>) {
        if self.is_armed() {
            self.last_activity = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn flags_once_per_idle_stretch() {
        let mut monitor = InactivityMonitor::new(30);
        monitor.arm(t0());

        assert!(monitor.check(t0() + Duration::seconds(30)).is_none());
        let signal = monitor.check(t0() + Duration::seconds(31)).unwrap();
        assert_eq!(
            signal,
            DistractionSignal::Inactivity {
                idle_secs: 31,
                at: t0() + Duration::seconds(31)
            }
        );
        assert!(monitor.check(t0() + Duration::seconds(90)).is_none());

        monitor.note_activity(t0() + Duration::seconds(100));
        assert!(monitor.check(t0() + Duration::seconds(131)).is_some());
    }

    #[test]
    fn disarmed_monitor_stays_quiet() {
        let mut monitor = InactivityMonitor::new(30);
        assert!(monitor.check(t0() + Duration::hours(1)).is_none());
        assert!(monitor.note_visibility(true, t0()).is_none());
    }

    #[test]
    fn hiding_flags_immediately_once() {
        let mut monitor = InactivityMonitor::new(30);
        monitor.arm(t0());
        assert!(monitor.note_visibility(true, t0()).is_some());
        assert!(monitor.note_visibility(true, t0()).is_none());
        assert!(monitor.note_visibility(false, t0()).is_none());
        assert!(monitor.note_visibility(true, t0()).is_some());
    }
}
