//! Collaborator contracts.
//!
//! The controller talks to the outside world only through these traits.
//! [`crate::storage::Database`] implements the storage ports;
//! [`HeadlessSurface`] stands in for a host without a notification layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::error::Result;
use crate::gate::{DistractionSignal, GateDecision, GateLevel, InterruptionEvent};
use crate::session::{EndStats, SessionState, SessionStatus, SessionType};
use crate::task::{TaskCandidate, TaskFilter, TaskStatus};

pub type SessionId = String;

/// Supplies candidate tasks and accepts status updates.
pub trait TaskStore {
    fn list_candidates(&self, filter: &TaskFilter) -> Result<Vec<TaskCandidate>>;

    /// Fails with `NotFound` for an unknown id.
    fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<()>;
}

/// What the controller knows when it creates a session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionDraft {
    pub user_id: String,
    pub session_type: SessionType,
    pub planned_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub task_ids: Vec<String>,
    pub gate_level: GateLevel,
}

/// Durable record of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_id: String,
    pub session_type: SessionType,
    pub planned_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub skipped_task_ids: Vec<String>,
    pub gate_level: GateLevel,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_ms: i64,
    pub end_stats: Option<EndStats>,
}

/// Something worth recording against a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistractionRecord {
    Interruption {
        event: InterruptionEvent,
        decision: GateDecision,
    },
    Signal {
        signal: DistractionSignal,
    },
}

impl DistractionRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            DistractionRecord::Interruption { .. } => "interruption",
            DistractionRecord::Signal { .. } => "signal",
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            DistractionRecord::Interruption { event, .. } => event.received_at,
            DistractionRecord::Signal { signal } => signal.at(),
        }
    }
}

/// System of record for sessions.
pub trait SessionPersistence {
    fn create_session(&self, draft: &SessionDraft) -> Result<SessionId>;
    fn get_active_session(&self, user_id: &str) -> Result<Option<SessionRecord>>;
    fn record_pause(&self, session_id: &str, at: DateTime<Utc>) -> Result<()>;
    fn record_resume(&self, session_id: &str, at: DateTime<Utc>) -> Result<()>;
    /// Succeeds when the session already ended.
    fn record_end(&self, session_id: &str, stats: &EndStats) -> Result<()>;
    /// Keeps the task out of the queue when the session is rebuilt.
    fn record_skip(&self, session_id: &str, task_id: &str) -> Result<()>;
    fn record_distraction(&self, session_id: &str, record: &DistractionRecord) -> Result<()>;
}

/// Host notification delivery.
///
/// Incoming interruptions are pushed into the engine through
/// [`crate::session::SessionController::handle_interruption`] or a
/// [`crate::session::SessionHandle`]; the surface only toggles ambient
/// delivery and receives the interruptions the gate lets go.
pub trait NotificationSurface {
    fn suppress(&mut self);
    fn restore(&mut self);
    fn release(&mut self, events: &[InterruptionEvent]);
}

/// Process-restart recovery. Not the system of record.
pub trait SnapshotStore {
    fn save_session_snapshot(&self, state: &SessionState) -> Result<()>;
    fn load_session_snapshot(&self) -> Result<Option<SessionState>>;
    fn clear_session_snapshot(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct SurfaceLog {
    suppressed: bool,
    released: Vec<InterruptionEvent>,
}

/// A [`NotificationSurface`] that logs and keeps what it is handed.
///
/// Clones share state, so a host can keep one clone and give the other to
/// the controller.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    inner: Arc<Mutex<SurfaceLog>>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suppressed(&self) -> bool {
        self.inner.lock().map(|log| log.suppressed).unwrap_or(false)
    }

    pub fn released(&self) -> Vec<InterruptionEvent> {
        self.inner
            .lock()
            .map(|log| log.released.clone())
            .unwrap_or_default()
    }

    pub fn take_released(&self) -> Vec<InterruptionEvent> {
        self.inner
            .lock()
            .map(|mut log| std::mem::take(&mut log.released))
            .unwrap_or_default()
    }
}

impl NotificationSurface for HeadlessSurface {
    fn suppress(&mut self) {
        if let Ok(mut log) = self.inner.lock() {
            log.suppressed = true;
        }
    }

    fn restore(&mut self) {
        if let Ok(mut log) = self.inner.lock() {
            log.suppressed = false;
        }
    }

    fn release(&mut self, events: &[InterruptionEvent]) {
        for event in events {
            info!(source = %event.source, sender = %event.sender, "releasing queued interruption");
        }
        if let Ok(mut log) = self.inner.lock() {
            log.released.extend_from_slice(events);
        }
    }
}
