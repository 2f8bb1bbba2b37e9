use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::{FlowSnapshot, Recommendation};
use crate::gate::{DistractionSignal, InterruptionSource, QueueReason, Urgency};
use crate::session::{EndReason, EndStats, SessionType};

/// Every session state change produces an event.
/// Hosts drain them from the controller or subscribe through the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SessionEvent {
    SessionStarted {
        session_id: String,
        session_type: SessionType,
        task_count: usize,
        planned_minutes: u32,
        at: DateTime<Utc>,
    },
    SessionPaused {
        session_id: String,
        elapsed_minutes: u64,
        at: DateTime<Utc>,
    },
    SessionResumed {
        session_id: String,
        paused_secs: i64,
        at: DateTime<Utc>,
    },
    /// A session was picked up again after a restart.
    SessionRestored {
        session_id: String,
        from_snapshot: bool,
        elapsed_minutes: u64,
        at: DateTime<Utc>,
    },
    TaskStarted {
        session_id: String,
        task_id: String,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        session_id: String,
        task_id: String,
        at: DateTime<Utc>,
    },
    TaskSkipped {
        session_id: String,
        task_id: String,
        at: DateTime<Utc>,
    },
    /// The last task is done; the session ends at `ends_at`.
    AllTasksCompleted {
        session_id: String,
        ends_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    FlowEvaluated {
        session_id: String,
        score: f64,
        confidence: f64,
        in_flow: bool,
        at: DateTime<Utc>,
    },
    FlowEntered {
        session_id: String,
        snapshot: FlowSnapshot,
        at: DateTime<Utc>,
    },
    FlowExited {
        session_id: String,
        duration_secs: i64,
        at: DateTime<Utc>,
    },
    FlowRecommendations {
        session_id: String,
        recommendations: Vec<Recommendation>,
        at: DateTime<Utc>,
    },
    BreakDue {
        session_id: String,
        elapsed_minutes: u64,
        interval_minutes: u64,
        at: DateTime<Utc>,
    },
    InterruptionAllowed {
        session_id: String,
        event_id: String,
        source: InterruptionSource,
        urgency: Urgency,
        at: DateTime<Utc>,
    },
    InterruptionQueued {
        session_id: String,
        event_id: String,
        source: InterruptionSource,
        urgency: Urgency,
        reason: QueueReason,
        at: DateTime<Utc>,
    },
    DistractionDetected {
        session_id: String,
        signal: DistractionSignal,
        at: DateTime<Utc>,
    },
    InterruptionsReleased {
        session_id: String,
        count: usize,
        at: DateTime<Utc>,
    },
    EmergencyOverride {
        session_id: String,
        released: usize,
        at: DateTime<Utc>,
    },
    SessionEnded {
        session_id: String,
        reason: EndReason,
        stats: EndStats,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::SessionStarted { session_id, .. }
            | SessionEvent::SessionPaused { session_id, .. }
            | SessionEvent::SessionResumed { session_id, .. }
            | SessionEvent::SessionRestored { session_id, .. }
            | SessionEvent::TaskStarted { session_id, .. }
            | SessionEvent::TaskCompleted { session_id, .. }
            | SessionEvent::TaskSkipped { session_id, .. }
            | SessionEvent::AllTasksCompleted { session_id, .. }
            | SessionEvent::FlowEvaluated { session_id, .. }
            | SessionEvent::FlowEntered { session_id, .. }
            | SessionEvent::FlowExited { session_id, .. }
            | SessionEvent::FlowRecommendations { session_id, .. }
            | SessionEvent::BreakDue { session_id, .. }
            | SessionEvent::InterruptionAllowed { session_id, .. }
            | SessionEvent::InterruptionQueued { session_id, .. }
            | SessionEvent::DistractionDetected { session_id, .. }
            | SessionEvent::InterruptionsReleased { session_id, .. }
            | SessionEvent::EmergencyOverride { session_id, .. }
            | SessionEvent::SessionEnded { session_id, .. } => session_id,
        }
    }

    /// The `type` tag as serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "SessionStarted",
            SessionEvent::SessionPaused { .. } => "SessionPaused",
            SessionEvent::SessionResumed { .. } => "SessionResumed",
            SessionEvent::SessionRestored { .. } => "SessionRestored",
            SessionEvent::TaskStarted { .. } => "TaskStarted",
            SessionEvent::TaskCompleted { .. } => "TaskCompleted",
            SessionEvent::TaskSkipped { .. } => "TaskSkipped",
            SessionEvent::AllTasksCompleted { .. } => "AllTasksCompleted",
            SessionEvent::FlowEvaluated { .. } => "FlowEvaluated",
            SessionEvent::FlowEntered { .. } => "FlowEntered",
            SessionEvent::FlowExited { .. } => "FlowExited",
            SessionEvent::FlowRecommendations { .. } => "FlowRecommendations",
            SessionEvent::BreakDue { .. } => "BreakDue",
            SessionEvent::InterruptionAllowed { .. } => "InterruptionAllowed",
            SessionEvent::InterruptionQueued { .. } => "InterruptionQueued",
            SessionEvent::DistractionDetected { .. } => "DistractionDetected",
            SessionEvent::InterruptionsReleased { .. } => "InterruptionsReleased",
            SessionEvent::EmergencyOverride { .. } => "EmergencyOverride",
            SessionEvent::SessionEnded { .. } => "SessionEnded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = SessionEvent::TaskStarted {
            session_id: "s1".into(),
            task_id: "t1".into(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert_eq!(event.session_id(), "s1");

        let back: SessionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
