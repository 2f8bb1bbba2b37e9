use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::flow::FlowConfig;
use crate::gate::{GateConfig, GateLevel};
use crate::task::TaskCandidate;

/// What kind of work a session is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    DeepWork,
    Regular,
    Light,
    Creative,
}

impl Default for SessionType {
    fn default() -> Self {
        SessionType::Regular
    }
}

impl SessionType {
    pub const ALL: [SessionType; 4] = [
        SessionType::DeepWork,
        SessionType::Regular,
        SessionType::Light,
        SessionType::Creative,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::DeepWork => "deep_work",
            SessionType::Regular => "regular",
            SessionType::Light => "light",
            SessionType::Creative => "creative",
        }
    }

    pub fn default_break_interval_minutes(self) -> u32 {
        match self {
            SessionType::DeepWork => 90,
            SessionType::Regular => 50,
            SessionType::Light => 30,
            SessionType::Creative => 60,
        }
    }

    /// Gate level used when the caller does not pick one.
    pub fn default_gate_level(self) -> GateLevel {
        match self {
            SessionType::DeepWork => GateLevel::Strict,
            SessionType::Regular | SessionType::Creative => GateLevel::Balanced,
            SessionType::Light => GateLevel::Light,
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "deep_work" | "deep" => Ok(SessionType::DeepWork),
            "regular" => Ok(SessionType::Regular),
            "light" => Ok(SessionType::Light),
            "creative" => Ok(SessionType::Creative),
            other => Err(ValidationError::InvalidValue {
                field: "session type".into(),
                message: format!("expected deep_work|regular|light|creative, got '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Active,
    Paused,
    Ended,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Ended => "ended",
        }
    }

    /// Active or paused.
    pub fn is_live(self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Paused)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SessionStatus::Idle),
            "active" => Ok(SessionStatus::Active),
            "paused" => Ok(SessionStatus::Paused),
            "ended" => Ok(SessionStatus::Ended),
            other => Err(ValidationError::InvalidValue {
                field: "session status".into(),
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    UserEnded,
    AllTasksCompleted,
    Aborted,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::UserEnded => "user_ended",
            EndReason::AllTasksCompleted => "all_tasks_completed",
            EndReason::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

impl FromStr for EndReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_ended" | "user" => Ok(EndReason::UserEnded),
            "all_tasks_completed" | "completed" => Ok(EndReason::AllTasksCompleted),
            "aborted" | "abort" => Ok(EndReason::Aborted),
            other => Err(ValidationError::InvalidValue {
                field: "end reason".into(),
                message: format!("unknown reason '{other}'"),
            }),
        }
    }
}

/// Live flow flag carried by an active session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlowState {
    pub in_flow: bool,
    pub flow_start_time: Option<DateTime<Utc>>,
    /// Aggregate of the latest evaluation, 0.0..=1.0.
    pub last_score: f64,
    /// Highest aggregate seen in the current episode.
    #[serde(default)]
    pub episode_peak: f64,
}

/// One contiguous stretch of detected flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowEpisode {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub peak_score: f64,
}

/// Optional details the user supplies when ending a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndData {
    #[serde(default)]
    pub notes: Option<String>,
    /// Self-rated focus, 1-5.
    #[serde(default)]
    pub focus_rating: Option<u8>,
}

/// Final statistics persisted when a session ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndStats {
    pub reason: EndReason,
    pub ended_at: DateTime<Utc>,
    pub elapsed_minutes: u64,
    pub completed_task_ids: Vec<String>,
    pub skipped_task_ids: Vec<String>,
    pub total_flow_secs: i64,
    pub flow_episodes: u32,
    pub average_flow_score: f64,
    pub peak_flow_score: f64,
    pub interruptions_queued: u32,
    pub interruptions_allowed: u32,
    pub interruptions_released: u32,
    pub distractions_flagged: u32,
    pub pause_count: u32,
    #[serde(default)]
    pub end_data: EndData,
}

/// Per-session environment handed to `start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    pub session_type: SessionType,
    pub planned_minutes: u32,
    pub gate: GateConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    pub break_interval_minutes: u32,
    #[serde(default = "default_min_break_minutes")]
    pub min_break_minutes: u32,
    #[serde(default = "default_flow_eval_interval_secs")]
    pub flow_eval_interval_secs: u64,
    #[serde(default = "default_auto_end_grace_secs")]
    pub auto_end_grace_secs: u64,
    /// 1-10; fills the challenge/skill balance when nothing is self-reported.
    #[serde(default)]
    pub skill_level: Option<f64>,
}

pub fn default_user_id() -> String {
    "local".to_string()
}
fn default_min_break_minutes() -> u32 {
    5
}
fn default_flow_eval_interval_secs() -> u64 {
    30
}
fn default_auto_end_grace_secs() -> u64 {
    3
}

impl EnvConfig {
    /// Defaults for a session type, gate level included.
    pub fn for_type(session_type: SessionType) -> Self {
        Self {
            user_id: default_user_id(),
            session_type,
            planned_minutes: 60,
            gate: GateConfig::with_level(session_type.default_gate_level()),
            flow: FlowConfig::default(),
            break_interval_minutes: session_type.default_break_interval_minutes(),
            min_break_minutes: default_min_break_minutes(),
            flow_eval_interval_secs: default_flow_eval_interval_secs(),
            auto_end_grace_secs: default_auto_end_grace_secs(),
            skill_level: None,
        }
    }

    pub fn with_gate_level(mut self, level: GateLevel) -> Self {
        self.gate.level = level;
        self
    }

    pub fn with_planned_minutes(mut self, minutes: u32) -> Self {
        self.planned_minutes = minutes;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::for_type(SessionType::default())
    }
}

/// A single focus session.
///
/// Elapsed time is `active_ms` plus the running stretch since
/// `running_since`; pausing folds the stretch into `active_ms` and clears
/// the anchor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub session_type: SessionType,
    pub started_at: DateTime<Utc>,
    pub planned_minutes: u32,
    pub gate_level: GateLevel,
    pub status: SessionStatus,

    pub current_task: Option<TaskCandidate>,
    pub task_queue: Vec<TaskCandidate>,
    pub completed_task_ids: Vec<String>,
    #[serde(default)]
    pub skipped_task_ids: Vec<String>,

    active_ms: i64,
    running_since: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_ms: i64,
    pub pause_count: u32,

    pub flow: FlowState,
    #[serde(default)]
    pub flow_episodes: Vec<FlowEpisode>,
    #[serde(default)]
    pub flow_scores: Vec<f64>,

    #[serde(default)]
    pub interruptions_queued: u32,
    #[serde(default)]
    pub interruptions_allowed: u32,
    #[serde(default)]
    pub distractions_flagged: u32,

    #[serde(default)]
    pub end_stats: Option<EndStats>,
}

impl Session {
    /// A fresh active session; the first task becomes current.
    pub fn begin(
        id: String,
        env: &EnvConfig,
        mut tasks: Vec<TaskCandidate>,
        now: DateTime<Utc>,
    ) -> Self {
        let current_task = if tasks.is_empty() {
            None
        } else {
            Some(tasks.remove(0))
        };
        Self {
            id,
            user_id: env.user_id.clone(),
            session_type: env.session_type,
            started_at: now,
            planned_minutes: env.planned_minutes,
            gate_level: env.gate.level,
            status: SessionStatus::Active,
            current_task,
            task_queue: tasks,
            completed_task_ids: Vec::new(),
            skipped_task_ids: Vec::new(),
            active_ms: 0,
            running_since: Some(now),
            paused_at: None,
            paused_ms: 0,
            pause_count: 0,
            flow: FlowState::default(),
            flow_episodes: Vec::new(),
            flow_scores: Vec::new(),
            interruptions_queued: 0,
            interruptions_allowed: 0,
            distractions_flagged: 0,
            end_stats: None,
        }
    }

    /// Rebuild a session that was already running for `elapsed`.
    pub(crate) fn resumed_from(
        mut self,
        elapsed: Duration,
        paused_at: Option<DateTime<Utc>>,
        paused_ms: i64,
        now: DateTime<Utc>,
    ) -> Self {
        self.active_ms = elapsed.num_milliseconds().max(0);
        self.paused_ms = paused_ms.max(0);
        self.paused_at = paused_at;
        if paused_at.is_some() {
            self.status = SessionStatus::Paused;
            self.running_since = None;
        } else {
            self.status = SessionStatus::Active;
            self.running_since = Some(now);
        }
        self
    }

    // ── Time ─────────────────────────────────────────────────────────

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        let running = self
            .running_since
            .map(|since| (now - since).num_milliseconds().max(0))
            .unwrap_or(0);
        self.active_ms + running
    }

    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> u64 {
        (self.elapsed_ms(now) / 60_000) as u64
    }

    /// Fold the running stretch into the baseline.
    pub(crate) fn accrue(&mut self, now: DateTime<Utc>) {
        if let Some(since) = self.running_since {
            if now > since {
                self.active_ms += (now - since).num_milliseconds();
                self.running_since = Some(now);
            }
        }
    }

    pub(crate) fn freeze(&mut self, now: DateTime<Utc>) {
        self.accrue(now);
        self.running_since = None;
        self.paused_at = Some(now);
        self.pause_count += 1;
        self.status = SessionStatus::Paused;
    }

    /// Returns how long the session was paused.
    pub(crate) fn thaw(&mut self, now: DateTime<Utc>) -> Duration {
        let paused_for = self
            .paused_at
            .take()
            .map(|at| (now - at).max(Duration::zero()))
            .unwrap_or_else(Duration::zero);
        self.paused_ms += paused_for.num_milliseconds();
        self.running_since = Some(now);
        self.status = SessionStatus::Active;
        paused_for
    }

    pub(crate) fn stop_clock(&mut self, now: DateTime<Utc>) {
        self.accrue(now);
        self.running_since = None;
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Queue, current, and completed tasks together.
    pub fn tracked_task_count(&self) -> usize {
        self.task_queue.len() + usize::from(self.current_task.is_some()) + self.completed_task_ids.len()
    }

    /// Ids of every task the session was started with, in order.
    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.completed_task_ids.clone();
        ids.extend(self.skipped_task_ids.iter().cloned());
        ids.extend(self.current_task.iter().map(|t| t.id.clone()));
        ids.extend(self.task_queue.iter().map(|t| t.id.clone()));
        ids
    }

    pub fn has_remaining_tasks(&self) -> bool {
        self.current_task.is_some() || !self.task_queue.is_empty()
    }

    /// Move the current task out and promote the next one.
    pub(crate) fn advance(&mut self, completed: bool) -> Option<TaskCandidate> {
        let finished = self.current_task.take()?;
        if completed {
            if !self.completed_task_ids.contains(&finished.id) {
                self.completed_task_ids.push(finished.id.clone());
            }
        } else if !self.skipped_task_ids.contains(&finished.id) {
            self.skipped_task_ids.push(finished.id.clone());
        }
        if !self.task_queue.is_empty() {
            self.current_task = Some(self.task_queue.remove(0));
        }
        Some(finished)
    }

    // ── Flow ─────────────────────────────────────────────────────────

    pub fn total_flow_secs(&self, now: DateTime<Utc>) -> i64 {
        let closed: i64 = self.flow_episodes.iter().map(|e| e.duration_secs).sum();
        let open = match (self.flow.in_flow, self.flow.flow_start_time) {
            (true, Some(start)) => (now - start).num_seconds().max(0),
            _ => 0,
        };
        closed + open
    }

    pub(crate) fn enter_flow(&mut self, score: f64, now: DateTime<Utc>) {
        self.flow.in_flow = true;
        self.flow.flow_start_time = Some(now);
        self.flow.episode_peak = score;
    }

    /// Close the open episode, if any.
    pub(crate) fn exit_flow(&mut self, now: DateTime<Utc>) -> Option<FlowEpisode> {
        if !self.flow.in_flow {
            return None;
        }
        self.flow.in_flow = false;
        let started_at = self.flow.flow_start_time.take()?;
        let episode = FlowEpisode {
            started_at,
            ended_at: now,
            duration_secs: (now - started_at).num_seconds().max(0),
            peak_score: self.flow.episode_peak,
        };
        self.flow.episode_peak = 0.0;
        self.flow_episodes.push(episode.clone());
        Some(episode)
    }

    pub fn average_flow_score(&self) -> f64 {
        if self.flow_scores.is_empty() {
            return 0.0;
        }
        self.flow_scores.iter().sum::<f64>() / self.flow_scores.len() as f64
    }

    pub fn peak_flow_score(&self) -> f64 {
        self.flow_scores.iter().cloned().fold(0.0, f64::max)
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

    fn session(n: usize) -> Session {
        let tasks = (0..n)
            .map(|i| TaskCandidate::new(format!("t{i}"), "T", 20))
            .collect();
        Session::begin("s1".into(), &EnvConfig::default(), tasks, t0())
    }

    #[test]
    fn begin_promotes_first_task() {
        let s = session(3);
        assert_eq!(s.current_task.as_ref().map(|t| t.id.as_str()), Some("t0"));
        assert_eq!(s.task_queue.len(), 2);
        assert_eq!(s.tracked_task_count(), 3);
    }

    #[test]
    fn freeze_stops_accrual() {
        let mut s = session(1);
        s.freeze(t0() + Duration::minutes(10));
        assert_eq!(s.elapsed_minutes(t0() + Duration::minutes(50)), 10);

        let paused_for = s.thaw(t0() + Duration::minutes(50));
        assert_eq!(paused_for, Duration::minutes(40));
        assert_eq!(s.paused_ms, 40 * 60_000);
        assert_eq!(s.elapsed_minutes(t0() + Duration::minutes(55)), 15);
    }

    #[test]
    fn clock_never_runs_backwards() {
        let s = session(1);
        assert_eq!(s.elapsed_ms(t0() - Duration::seconds(5)), 0);
    }

    #[test]
    fn skipped_tasks_leave_the_tracked_count() {
        let mut s = session(2);
        s.advance(false);
        assert_eq!(s.tracked_task_count(), 1);
        assert_eq!(s.skipped_task_ids, ["t0"]);
        s.advance(true);
        assert_eq!(s.completed_task_ids, ["t1"]);
        assert!(!s.has_remaining_tasks());
        assert!(s.advance(true).is_none());
    }

    #[test]
    fn flow_episode_bookkeeping() {
        let mut s = session(1);
        s.enter_flow(0.8, t0());
        s.flow.episode_peak = 0.9;
        let episode = s.exit_flow(t0() + Duration::minutes(4)).unwrap();
        assert_eq!(episode.duration_secs, 240);
        assert_eq!(episode.peak_score, 0.9);
        assert!(s.exit_flow(t0() + Duration::minutes(5)).is_none());
        assert_eq!(s.total_flow_secs(t0() + Duration::hours(1)), 240);
    }

    #[test]
    fn session_type_defaults() {
        assert_eq!(SessionType::DeepWork.default_gate_level(), GateLevel::Strict);
        assert_eq!(SessionType::Light.default_break_interval_minutes(), 30);
        assert_eq!("deep-work".parse::<SessionType>().unwrap(), SessionType::DeepWork);
        assert_eq!(
            serde_json::to_string(&SessionType::DeepWork).unwrap(),
            "\"deep_work\""
        );
    }
}
