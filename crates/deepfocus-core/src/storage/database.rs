//! SQLite-backed storage.
//!
//! Provides persistent storage for:
//! - Tasks offered to sessions
//! - Focus session records and their final statistics
//! - Distraction history per session
//! - Key-value store for application state (the session snapshot lives here)
//!
//! [`Database`] implements every storage port the controller needs.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{data_dir, migrations};
use crate::error::{CoreError, DatabaseError, Result};
use crate::gate::GateLevel;
use crate::ports::{
    DistractionRecord, SessionDraft, SessionId, SessionPersistence, SessionRecord, SnapshotStore,
    TaskStore,
};
use crate::session::{EndStats, SessionState, SessionStatus, SessionType};
use crate::task::{Priority, TaskCandidate, TaskFilter, TaskStatus};

const SNAPSHOT_KEY: &str = "session_snapshot";

const TASK_COLUMNS: &str = "id, title, priority, estimated_minutes, due_date, tags, category,
     parent_id, description, subtask_count, status";

const SESSION_COLUMNS: &str = "id, user_id, session_type, planned_minutes, started_at, status,
     task_ids, gate_level, paused_at, paused_ms, end_stats, skipped_task_ids";

/// Input for [`Database::add_task`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    pub estimated_minutes: u32,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtask_count: u32,
}

/// One line of session history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub planned_minutes: u32,
    pub task_count: usize,
    pub end_stats: Option<EndStats>,
}

impl From<SessionRecord> for SessionSummary {
    fn from(record: SessionRecord) -> Self {
        Self {
            task_count: record.task_ids.len(),
            id: record.id,
            session_type: record.session_type,
            status: record.status,
            started_at: record.started_at,
            planned_minutes: record.planned_minutes,
            end_stats: record.end_stats,
        }
    }
}

struct TaskRow {
    id: String,
    title: String,
    priority: String,
    estimated_minutes: u32,
    due_date: Option<String>,
    tags: String,
    category: Option<String>,
    parent_id: Option<String>,
    description: String,
    subtask_count: u32,
    status: String,
}

impl TaskRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            priority: row.get(2)?,
            estimated_minutes: row.get(3)?,
            due_date: row.get(4)?,
            tags: row.get(5)?,
            category: row.get(6)?,
            parent_id: row.get(7)?,
            description: row.get(8)?,
            subtask_count: row.get(9)?,
            status: row.get(10)?,
        })
    }

    fn into_candidate(self) -> Result<TaskCandidate, DatabaseError> {
        let corrupt = |message: String| DatabaseError::CorruptRow {
            table: "tasks",
            message,
        };
        Ok(TaskCandidate {
            priority: self.priority.parse().map_err(|e| corrupt(format!("{e}")))?,
            status: self.status.parse().map_err(|e| corrupt(format!("{e}")))?,
            due_date: self
                .due_date
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .map_err(corrupt)?,
            tags: serde_json::from_str(&self.tags).map_err(|e| corrupt(e.to_string()))?,
            description_length: self.description.chars().count(),
            id: self.id,
            title: self.title,
            estimated_duration_minutes: self.estimated_minutes,
            category: self.category,
            parent_id: self.parent_id,
            subtask_count: self.subtask_count,
        })
    }
}

struct SessionRow {
    id: String,
    user_id: String,
    session_type: String,
    planned_minutes: u32,
    started_at: String,
    status: String,
    task_ids: String,
    gate_level: String,
    paused_at: Option<String>,
    paused_ms: i64,
    end_stats: Option<String>,
    skipped_task_ids: String,
}

impl SessionRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_type: row.get(2)?,
            planned_minutes: row.get(3)?,
            started_at: row.get(4)?,
            status: row.get(5)?,
            task_ids: row.get(6)?,
            gate_level: row.get(7)?,
            paused_at: row.get(8)?,
            paused_ms: row.get(9)?,
            end_stats: row.get(10)?,
            skipped_task_ids: row.get(11)?,
        })
    }

    fn into_record(self) -> Result<SessionRecord, DatabaseError> {
        let corrupt = |message: String| DatabaseError::CorruptRow {
            table: "focus_sessions",
            message,
        };
        Ok(SessionRecord {
            session_type: self
                .session_type
                .parse::<SessionType>()
                .map_err(|e| corrupt(e.to_string()))?,
            status: self
                .status
                .parse::<SessionStatus>()
                .map_err(|e| corrupt(e.to_string()))?,
            gate_level: self
                .gate_level
                .parse::<GateLevel>()
                .map_err(|e| corrupt(e.to_string()))?,
            started_at: parse_timestamp(&self.started_at).map_err(corrupt)?,
            paused_at: self
                .paused_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .map_err(corrupt)?,
            task_ids: serde_json::from_str(&self.task_ids).map_err(|e| corrupt(e.to_string()))?,
            skipped_task_ids: serde_json::from_str(&self.skipped_task_ids)
                .map_err(|e| corrupt(e.to_string()))?,
            end_stats: self
                .end_stats
                .as_deref()
                .map(serde_json::from_str::<EndStats>)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?,
            id: self.id,
            user_id: self.user_id,
            planned_minutes: self.planned_minutes,
            paused_ms: self.paused_ms,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{raw}': {e}"))
}

/// SQLite database shared by every storage port.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open the database at `~/.config/deepfocus/deepfocus.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("deepfocus.db");
        Ok(Self::open_at(path)?)
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(StdDuration::from_secs(5))?;
        debug!(path = %path.display(), "database opened");
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Locked)
    }

    // ── Key-value store ──────────────────────────────────────────────

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Insert a pending task and return it as a candidate.
    pub fn add_task(&self, task: &NewTask, now: DateTime<Utc>) -> Result<TaskCandidate> {
        if task.title.trim().is_empty() {
            return Err(crate::error::ValidationError::InvalidValue {
                field: "title".into(),
                message: "must not be empty".into(),
            }
            .into());
        }
        let id = Uuid::new_v4().to_string();
        let tags = serde_json::to_string(&task.tags)?;
        self.conn()?.execute(
            "INSERT INTO tasks (id, title, priority, estimated_minutes, due_date, tags, category,
                                parent_id, description, subtask_count, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                id,
                task.title,
                task.priority.as_str(),
                task.estimated_minutes,
                task.due_date.map(|d| d.to_rfc3339()),
                tags,
                task.category,
                task.parent_id,
                task.description,
                task.subtask_count,
                TaskStatus::Pending.as_str(),
                now.to_rfc3339(),
            ],
        )?;
        debug!(task_id = %id, title = %task.title, "task added");
        self.get_task(&id)
    }

    pub fn get_task(&self, id: &str) -> Result<TaskCandidate> {
        let row = {
            let conn = self.conn()?;
            let row = conn
                .query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                    params![id],
                    TaskRow::read,
                )
                .optional()?;
            row
        };
        match row {
            Some(row) => Ok(row.into_candidate()?),
            None => Err(CoreError::task_not_found(id)),
        }
    }

    /// Tasks matching `filter`, oldest first.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskCandidate>> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at, rowid"
            ))?;
            let rows = stmt
                .query_map([], TaskRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let task = row.into_candidate()?;
            if filter.matches(&task) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    // ── Sessions ─────────────────────────────────────────────────────

    pub fn get_session(&self, id: &str) -> Result<SessionRecord> {
        let row = {
            let conn = self.conn()?;
            let row = conn
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM focus_sessions WHERE id = ?1"),
                    params![id],
                    SessionRow::read,
                )
                .optional()?;
            row
        };
        match row {
            Some(row) => Ok(row.into_record()?),
            None => Err(CoreError::session_not_found(id)),
        }
    }

    /// Most recent sessions first.
    pub fn session_history(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM focus_sessions
                 ORDER BY started_at DESC, rowid DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit as i64], SessionRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter()
            .map(|row| Ok(SessionSummary::from(row.into_record()?)))
            .collect()
    }

    /// Distractions recorded against a session, in arrival order.
    pub fn distractions_for(&self, session_id: &str) -> Result<Vec<DistractionRecord>> {
        let payloads = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare("SELECT payload FROM distractions WHERE session_id = ?1 ORDER BY id")?;
            let rows = stmt
                .query_map(params![session_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        payloads
            .iter()
            .map(|payload| Ok(serde_json::from_str(payload)?))
            .collect()
    }

    fn session_status(conn: &Connection, id: &str) -> Result<SessionStatus> {
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM focus_sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let status = status.ok_or_else(|| CoreError::session_not_found(id))?;
        status.parse::<SessionStatus>().map_err(|e| {
            DatabaseError::CorruptRow {
                table: "focus_sessions",
                message: e.to_string(),
            }
            .into()
        })
    }
}

impl TaskStore for Database {
    fn list_candidates(&self, filter: &TaskFilter) -> Result<Vec<TaskCandidate>> {
        self.list_tasks(filter)
    }

    fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), task_id],
        )?;
        if changed == 0 {
            return Err(CoreError::task_not_found(task_id));
        }
        Ok(())
    }
}

impl SessionPersistence for Database {
    fn create_session(&self, draft: &SessionDraft) -> Result<SessionId> {
        let id = Uuid::new_v4().to_string();
        let task_ids = serde_json::to_string(&draft.task_ids)?;
        self.conn()?.execute(
            "INSERT INTO focus_sessions (id, user_id, session_type, planned_minutes, started_at,
                                         status, task_ids, gate_level, paused_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                id,
                draft.user_id,
                draft.session_type.as_str(),
                draft.planned_minutes,
                draft.started_at.to_rfc3339(),
                SessionStatus::Active.as_str(),
                task_ids,
                draft.gate_level.to_string(),
            ],
        )?;
        info!(session_id = %id, user_id = %draft.user_id, "session record created");
        Ok(id)
    }

    fn get_active_session(&self, user_id: &str) -> Result<Option<SessionRecord>> {
        let row = {
            let conn = self.conn()?;
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM focus_sessions
                         WHERE user_id = ?1 AND status IN ('active', 'paused')
                         ORDER BY started_at DESC, rowid DESC LIMIT 1"
                    ),
                    params![user_id],
                    SessionRow::read,
                )
                .optional()?;
            row
        };
        Ok(row.map(SessionRow::into_record).transpose()?)
    }

    fn record_pause(&self, session_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        match Self::session_status(&conn, session_id)? {
            SessionStatus::Active => {
                conn.execute(
                    "UPDATE focus_sessions SET status = 'paused', paused_at = ?1 WHERE id = ?2",
                    params![at.to_rfc3339(), session_id],
                )?;
                Ok(())
            }
            // Already paused or ended.
            _ => Ok(()),
        }
    }

    fn record_resume(&self, session_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        if Self::session_status(&conn, session_id)? != SessionStatus::Paused {
            return Ok(());
        }
        let paused_at: Option<String> = conn.query_row(
            "SELECT paused_at FROM focus_sessions WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        let paused_for = match paused_at.as_deref().map(parse_timestamp).transpose() {
            Ok(Some(since)) => (at - since).num_milliseconds().max(0),
            Ok(None) => 0,
            Err(message) => {
                return Err(DatabaseError::CorruptRow {
                    table: "focus_sessions",
                    message,
                }
                .into())
            }
        };
        conn.execute(
            "UPDATE focus_sessions
             SET status = 'active', paused_at = NULL, paused_ms = paused_ms + ?1
             WHERE id = ?2",
            params![paused_for, session_id],
        )?;
        Ok(())
    }

    fn record_end(&self, session_id: &str, stats: &EndStats) -> Result<()> {
        let conn = self.conn()?;
        if Self::session_status(&conn, session_id)? == SessionStatus::Ended {
            debug!(session_id, "session already ended in store");
            return Ok(());
        }
        let payload = serde_json::to_string(stats)?;
        conn.execute(
            "UPDATE focus_sessions
             SET status = 'ended', paused_at = NULL, ended_at = ?1, end_stats = ?2
             WHERE id = ?3",
            params![stats.ended_at.to_rfc3339(), payload, session_id],
        )?;
        Ok(())
    }

    fn record_skip(&self, session_id: &str, task_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT skipped_task_ids FROM focus_sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        let raw = raw.ok_or_else(|| CoreError::session_not_found(session_id))?;
        let mut skipped: Vec<String> =
            serde_json::from_str(&raw).map_err(|e| DatabaseError::CorruptRow {
                table: "focus_sessions",
                message: e.to_string(),
            })?;
        if skipped.iter().any(|id| id == task_id) {
            return Ok(());
        }
        skipped.push(task_id.to_string());
        conn.execute(
            "UPDATE focus_sessions SET skipped_task_ids = ?1 WHERE id = ?2",
            params![serde_json::to_string(&skipped)?, session_id],
        )?;
        Ok(())
    }

    fn record_distraction(&self, session_id: &str, record: &DistractionRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.conn()?.execute(
            "INSERT INTO distractions (session_id, kind, at, payload) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, record.kind(), record.at().to_rfc3339(), payload],
        )?;
        Ok(())
    }
}

impl SnapshotStore for Database {
    fn save_session_snapshot(&self, state: &SessionState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        Ok(self.kv_set(SNAPSHOT_KEY, &json)?)
    }

    fn load_session_snapshot(&self) -> Result<Option<SessionState>> {
        match self.kv_get(SNAPSHOT_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn clear_session_snapshot(&self) -> Result<()> {
        Ok(self.kv_delete(SNAPSHOT_KEY)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{DistractionSignal, GateDecision, InterruptionEvent, InterruptionSource};
    use crate::session::{EndData, EndReason};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn new_task(title: &str, minutes: u32) -> NewTask {
        NewTask {
            title: title.into(),
            estimated_minutes: minutes,
            ..NewTask::default()
        }
    }

    fn draft(task_ids: Vec<String>) -> SessionDraft {
        SessionDraft {
            user_id: "local".into(),
            session_type: SessionType::DeepWork,
            planned_minutes: 90,
            started_at: t0(),
            task_ids,
            gate_level: GateLevel::Strict,
        }
    }

    fn stats(reason: EndReason) -> EndStats {
        EndStats {
            reason,
            ended_at: t0() + Duration::minutes(50),
            elapsed_minutes: 50,
            completed_task_ids: vec![],
            skipped_task_ids: vec![],
            total_flow_secs: 0,
            flow_episodes: 0,
            average_flow_score: 0.0,
            peak_flow_score: 0.0,
            interruptions_queued: 0,
            interruptions_allowed: 0,
            interruptions_released: 0,
            distractions_flagged: 0,
            pause_count: 0,
            end_data: EndData::default(),
        }
    }

    #[test]
    fn kv_round_trip_and_delete() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.kv_get("k").unwrap(), None);
        db.kv_set("k", "v1").unwrap();
        db.kv_set("k", "v2").unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("v2"));
        db.kv_delete("k").unwrap();
        assert_eq!(db.kv_get("k").unwrap(), None);
    }

    #[test]
    fn add_and_list_tasks() {
        let db = Database::open_memory().unwrap();
        let mut input = new_task("Write report", 45);
        input.priority = Priority::High;
        input.tags = vec!["writing".into()];
        input.description = "Quarterly numbers".into();
        let added = db.add_task(&input, t0()).unwrap();
        db.add_task(&new_task("Email", 10), t0() + Duration::seconds(1))
            .unwrap();

        assert_eq!(added.priority, Priority::High);
        assert_eq!(added.description_length, 17);
        assert_eq!(added.status, TaskStatus::Pending);

        let all = db.list_tasks(&TaskFilter::open()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "Write report");

        let tagged = db
            .list_tasks(&TaskFilter {
                tag: Some("writing".into()),
                ..TaskFilter::default()
            })
            .unwrap();
        assert_eq!(tagged.len(), 1);
    }

    #[test]
    fn empty_title_is_rejected() {
        let db = Database::open_memory().unwrap();
        assert!(db.add_task(&new_task("  ", 10), t0()).is_err());
    }

    #[test]
    fn set_status_hides_closed_tasks_from_open_filter() {
        let db = Database::open_memory().unwrap();
        let task = db.add_task(&new_task("Done soon", 10), t0()).unwrap();
        db.set_status(&task.id, TaskStatus::Completed).unwrap();

        assert!(db.list_tasks(&TaskFilter::open()).unwrap().is_empty());
        let by_id = db.list_tasks(&TaskFilter::by_ids(vec![task.id.clone()])).unwrap();
        assert_eq!(by_id[0].status, TaskStatus::Completed);
    }

    #[test]
    fn set_status_unknown_task_is_not_found() {
        let db = Database::open_memory().unwrap();
        let err = db.set_status("nope", TaskStatus::Completed).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "task", .. }));
    }

    #[test]
    fn pause_and_resume_accumulate_paused_time() {
        let db = Database::open_memory().unwrap();
        let id = db.create_session(&draft(vec!["a".into()])).unwrap();

        db.record_pause(&id, t0() + Duration::minutes(10)).unwrap();
        let paused = db.get_active_session("local").unwrap().unwrap();
        assert_eq!(paused.status, SessionStatus::Paused);
        assert_eq!(paused.paused_at, Some(t0() + Duration::minutes(10)));

        db.record_resume(&id, t0() + Duration::minutes(15)).unwrap();
        let resumed = db.get_session(&id).unwrap();
        assert_eq!(resumed.status, SessionStatus::Active);
        assert_eq!(resumed.paused_at, None);
        assert_eq!(resumed.paused_ms, 5 * 60 * 1000);
    }

    #[test]
    fn record_end_is_idempotent() {
        let db = Database::open_memory().unwrap();
        let id = db.create_session(&draft(vec![])).unwrap();

        db.record_end(&id, &stats(EndReason::UserEnded)).unwrap();
        db.record_end(&id, &stats(EndReason::Aborted)).unwrap();

        let record = db.get_session(&id).unwrap();
        assert_eq!(record.status, SessionStatus::Ended);
        assert_eq!(record.end_stats.unwrap().reason, EndReason::UserEnded);
        assert!(db.get_active_session("local").unwrap().is_none());
    }

    #[test]
    fn record_end_unknown_session_is_not_found() {
        let db = Database::open_memory().unwrap();
        let err = db.record_end("ghost", &stats(EndReason::UserEnded)).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "session", .. }));
    }

    #[test]
    fn record_skip_keeps_each_task_once() {
        let db = Database::open_memory().unwrap();
        let id = db
            .create_session(&draft(vec!["a".into(), "b".into()]))
            .unwrap();

        db.record_skip(&id, "a").unwrap();
        db.record_skip(&id, "a").unwrap();
        assert_eq!(db.get_session(&id).unwrap().skipped_task_ids, ["a"]);

        let err = db.record_skip("ghost", "a").unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "session", .. }));
    }

    #[test]
    fn distractions_are_kept_in_order() {
        let db = Database::open_memory().unwrap();
        let id = db.create_session(&draft(vec![])).unwrap();
        let event = InterruptionEvent::new(InterruptionSource::Chat, "sam", "lunch?", t0());
        db.record_distraction(
            &id,
            &DistractionRecord::Interruption {
                event,
                decision: GateDecision::Allow,
            },
        )
        .unwrap();
        db.record_distraction(
            &id,
            &DistractionRecord::Signal {
                signal: DistractionSignal::Inactivity {
                    idle_secs: 40,
                    at: t0() + Duration::seconds(40),
                },
            },
        )
        .unwrap();

        let records = db.distractions_for(&id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind(), "interruption");
        assert_eq!(records[1].kind(), "signal");
    }

    #[test]
    fn history_lists_newest_first() {
        let db = Database::open_memory().unwrap();
        let first = db.create_session(&draft(vec!["a".into()])).unwrap();
        let mut later = draft(vec!["a".into(), "b".into()]);
        later.started_at = t0() + Duration::hours(2);
        let second = db.create_session(&later).unwrap();

        let history = db.session_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second);
        assert_eq!(history[0].task_count, 2);
        assert_eq!(history[1].id, first);
    }

    #[test]
    fn snapshot_load_without_save_is_none() {
        let db = Database::open_memory().unwrap();
        assert!(db.load_session_snapshot().unwrap().is_none());
        db.clear_session_snapshot().unwrap();
    }
}
