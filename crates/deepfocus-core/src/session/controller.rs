//! Session controller.
//!
//! Owns the single live session together with its distraction gate, flow
//! detector, and behavior sampler. Like the rest of the core it is a
//! wall-clock state machine: every operation takes `now`, nothing runs on
//! its own, and the host (or [`super::SessionRuntime`]) calls [`SessionController::tick`].
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Active <-> Paused -> Ended
//!          ^                     |
//!          +------- start -------+
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::breaks::BreakTracker;
use super::model::{EndData, EndReason, EndStats, EnvConfig, Session, SessionStatus, SessionType};
use crate::error::{CoreError, Result};
use crate::events::SessionEvent;
use crate::flow::{ActivitySignal, FlowDetector, FlowSnapshot, SampleAccumulator};
use crate::gate::{
    DistractionGate, DistractionSignal, GateDecision, InterruptionEvent, QueuedInterruption,
};
use crate::ports::{
    DistractionRecord, NotificationSurface, SessionDraft, SessionId, SessionPersistence,
    SnapshotStore, TaskStore,
};
use crate::ranker::estimate_complexity;
use crate::task::{TaskCandidate, TaskFilter, TaskStatus};

/// Everything the controller holds for one session. Also the durable
/// snapshot format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session: Session,
    pub env: EnvConfig,
    gate: DistractionGate,
    detector: FlowDetector,
    sampler: SampleAccumulator,
    breaks: BreakTracker,
    last_flow_eval_at: DateTime<Utc>,
    pending_auto_end_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn armed(session: Session, env: EnvConfig, now: DateTime<Utc>) -> Self {
        let mut gate = DistractionGate::new();
        gate.start_blocking(env.gate.clone(), now);

        let idle_threshold = Duration::seconds(env.gate.inactivity_threshold_secs as i64);
        let mut sampler = SampleAccumulator::new(now, idle_threshold);
        sampler.set_baseline(
            session.current_task.as_ref().map(task_difficulty),
            env.skill_level,
        );

        Self {
            detector: FlowDetector::new(env.flow.clone()),
            breaks: BreakTracker::new(env.break_interval_minutes, env.min_break_minutes),
            gate,
            sampler,
            last_flow_eval_at: now,
            pending_auto_end_at: None,
            session,
            env,
        }
    }

    pub fn gate(&self) -> &DistractionGate {
        &self.gate
    }

    pub fn detector(&self) -> &FlowDetector {
        &self.detector
    }

    pub fn pending_auto_end_at(&self) -> Option<DateTime<Utc>> {
        self.pending_auto_end_at
    }

    pub fn last_flow_eval_at(&self) -> DateTime<Utc> {
        self.last_flow_eval_at
    }
}

/// Difficulty on the 1-10 scale, from the task's estimated energy.
fn task_difficulty(task: &TaskCandidate) -> f64 {
    estimate_complexity(task).estimated_energy()
}

fn require<'a>(
    state: &'a mut Option<SessionState>,
    operation: &'static str,
    allowed: &[SessionStatus],
) -> Result<&'a mut SessionState> {
    let status = state
        .as_ref()
        .map(|s| s.session.status)
        .unwrap_or(SessionStatus::Idle);
    match state {
        Some(state) if allowed.contains(&status) => Ok(state),
        _ => Err(CoreError::invalid_state(operation, status)),
    }
}

fn as_persistence(operation: &'static str, err: CoreError) -> CoreError {
    match err {
        CoreError::PersistenceFailure { .. } => err,
        other => CoreError::persistence(operation, other),
    }
}

pub struct SessionController {
    tasks: Box<dyn TaskStore + Send>,
    persistence: Box<dyn SessionPersistence + Send>,
    surface: Box<dyn NotificationSurface + Send>,
    snapshots: Box<dyn SnapshotStore + Send>,
    state: Option<SessionState>,
    events: Vec<SessionEvent>,
}

impl SessionController {
    pub fn new(
        tasks: impl TaskStore + Send + 'static,
        persistence: impl SessionPersistence + Send + 'static,
        surface: impl NotificationSurface + Send + 'static,
        snapshots: impl SnapshotStore + Send + 'static,
    ) -> Self {
        Self {
            tasks: Box::new(tasks),
            persistence: Box::new(persistence),
            surface: Box::new(surface),
            snapshots: Box::new(snapshots),
            state: None,
            events: Vec::new(),
        }
    }

    /// One database backing every storage port.
    pub fn with_database(
        db: crate::storage::Database,
        surface: impl NotificationSurface + Send + 'static,
    ) -> Self {
        Self::new(db.clone(), db.clone(), surface, db)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        self.state
            .as_ref()
            .map(|s| s.session.status)
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn session(&self) -> Option<&Session> {
        self.state.as_ref().map(|s| &s.session)
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    pub fn is_in_flow(&self) -> bool {
        self.session().map(|s| s.flow.in_flow).unwrap_or(false)
    }

    pub fn latest_flow(&self) -> Option<&FlowSnapshot> {
        self.state.as_ref().and_then(|s| s.detector.latest())
    }

    pub fn queued_interruptions(&self) -> &[QueuedInterruption] {
        self.state
            .as_ref()
            .map(|s| s.gate.queued())
            .unwrap_or(&[])
    }

    /// Take every event produced since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start a session; the first task becomes current.
    ///
    /// Allowed from `Idle` and also from `Ended`, where the finished session
    /// is replaced by the new one. Fails with `InvalidSessionState` while a
    /// session is active or paused, or when `tasks` is empty.
    pub fn start(
        &mut self,
        tasks: Vec<TaskCandidate>,
        env: EnvConfig,
        now: DateTime<Utc>,
    ) -> Result<SessionId> {
        let status = self.status();
        if !matches!(status, SessionStatus::Idle | SessionStatus::Ended) {
            return Err(CoreError::invalid_state("start", status));
        }

        let mut seen = std::collections::HashSet::new();
        let tasks: Vec<TaskCandidate> = tasks
            .into_iter()
            .filter(|task| seen.insert(task.id.clone()))
            .collect();
        if tasks.is_empty() {
            return Err(CoreError::invalid_state("start without tasks", status));
        }

        let draft = SessionDraft {
            user_id: env.user_id.clone(),
            session_type: env.session_type,
            planned_minutes: env.planned_minutes,
            started_at: now,
            task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
            gate_level: env.gate.level,
        };
        let session_id = self
            .persistence
            .create_session(&draft)
            .map_err(|err| as_persistence("create session", err))?;

        let task_count = tasks.len();
        let session = Session::begin(session_id.clone(), &env, tasks, now);
        let first_task = session.current_task.as_ref().map(|t| t.id.clone());
        let state = SessionState::armed(session, env, now);
        self.surface.suppress();

        info!(
            session_id = %session_id,
            session_type = %state.env.session_type,
            task_count,
            gate_level = %state.env.gate.level,
            "session started"
        );
        self.events.push(SessionEvent::SessionStarted {
            session_id: session_id.clone(),
            session_type: state.env.session_type,
            task_count,
            planned_minutes: state.env.planned_minutes,
            at: now,
        });
        self.state = Some(state);

        if let Some(task_id) = first_task {
            self.events.push(SessionEvent::TaskStarted {
                session_id: session_id.clone(),
                task_id: task_id.clone(),
                at: now,
            });
            self.mirror_status(&task_id, TaskStatus::InProgress);
        }
        self.save_snapshot();
        Ok(session_id)
    }

    /// Freeze elapsed time. The gate stays armed.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<()> {
        let state = require(&mut self.state, "pause", &[SessionStatus::Active])?;
        state.session.freeze(now);
        state.sampler.pause(now);

        let session_id = state.session.id.clone();
        let elapsed_minutes = state.session.elapsed_minutes(now);
        if let Err(err) = self.persistence.record_pause(&session_id, now) {
            warn!(session_id = %session_id, error = %err, "failed to record pause");
        }
        info!(session_id = %session_id, elapsed_minutes, "session paused");
        self.events.push(SessionEvent::SessionPaused {
            session_id,
            elapsed_minutes,
            at: now,
        });
        self.save_snapshot();
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<()> {
        let state = require(&mut self.state, "resume", &[SessionStatus::Paused])?;
        let elapsed_minutes = state.session.elapsed_minutes(now);
        let paused_for = state.session.thaw(now);
        let took_break = state
            .breaks
            .record_pause(elapsed_minutes, paused_for.num_minutes().max(0) as u64);
        state.sampler.resume(now);
        state.gate.skip_inactivity_to(now);
        // Flow evaluation is due on active time only.
        state.last_flow_eval_at += paused_for.max(Duration::zero());

        let session_id = state.session.id.clone();
        if let Err(err) = self.persistence.record_resume(&session_id, now) {
            warn!(session_id = %session_id, error = %err, "failed to record resume");
        }
        info!(
            session_id = %session_id,
            paused_secs = paused_for.num_seconds(),
            took_break,
            "session resumed"
        );
        self.events.push(SessionEvent::SessionResumed {
            session_id,
            paused_secs: paused_for.num_seconds(),
            at: now,
        });
        self.save_snapshot();
        Ok(())
    }

    /// Mark the current task done and promote the next one.
    ///
    /// Returns the new current task. With nothing left the session ends
    /// after the configured grace delay.
    pub fn complete_current_task(&mut self, now: DateTime<Utc>) -> Result<Option<TaskCandidate>> {
        self.advance(true, "complete a task", now)
    }

    /// Like [`Self::complete_current_task`] without counting the task as done.
    pub fn skip_current_task(&mut self, now: DateTime<Utc>) -> Result<Option<TaskCandidate>> {
        self.advance(false, "skip a task", now)
    }

    fn advance(
        &mut self,
        completed: bool,
        operation: &'static str,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskCandidate>> {
        let state = require(
            &mut self.state,
            operation,
            &[SessionStatus::Active, SessionStatus::Paused],
        )?;
        let session_id = state.session.id.clone();
        let finished = state
            .session
            .advance(completed)
            .ok_or_else(|| CoreError::NotFound {
                kind: "current task",
                id: session_id.clone(),
            })?;
        state.sampler.record_task_outcome(completed);

        let next = state.session.current_task.clone();
        if let Some(task) = &next {
            let difficulty = ActivitySignal::SelfReport {
                perceived_minutes: None,
                difficulty: Some(task_difficulty(task)),
                skill: None,
            };
            state.sampler.record(&difficulty, now);
        }

        self.events.push(if completed {
            SessionEvent::TaskCompleted {
                session_id: session_id.clone(),
                task_id: finished.id.clone(),
                at: now,
            }
        } else {
            SessionEvent::TaskSkipped {
                session_id: session_id.clone(),
                task_id: finished.id.clone(),
                at: now,
            }
        });
        info!(session_id = %session_id, task_id = %finished.id, completed, "task finished");

        if let Some(task) = &next {
            self.events.push(SessionEvent::TaskStarted {
                session_id: session_id.clone(),
                task_id: task.id.clone(),
                at: now,
            });
        } else if state.pending_auto_end_at.is_none() {
            let ends_at = now + Duration::seconds(state.env.auto_end_grace_secs as i64);
            state.pending_auto_end_at = Some(ends_at);
            info!(session_id = %session_id, %ends_at, "all tasks done, session ending");
            self.events.push(SessionEvent::AllTasksCompleted {
                session_id: session_id.clone(),
                ends_at,
                at: now,
            });
        }

        let finished_status = if completed {
            TaskStatus::Completed
        } else {
            if let Err(err) = self.persistence.record_skip(&session_id, &finished.id) {
                warn!(
                    session_id = %session_id,
                    task_id = %finished.id,
                    error = %err,
                    "failed to record skip"
                );
            }
            TaskStatus::Pending
        };
        self.mirror_status(&finished.id, finished_status);
        if let Some(task) = &next {
            self.mirror_status(&task.id, TaskStatus::InProgress);
        }
        self.save_snapshot();
        Ok(next)
    }

    /// End the session and hand every queued interruption back to the host.
    ///
    /// Ending an ended session returns its stats again. When the end cannot
    /// be persisted the session is left as it was so the call can be retried.
    pub fn end(&mut self, reason: EndReason, end_data: EndData, now: DateTime<Utc>) -> Result<EndStats> {
        if let Some(state) = &self.state {
            if state.session.status == SessionStatus::Ended {
                if let Some(stats) = &state.session.end_stats {
                    debug!(session_id = %state.session.id, "session already ended");
                    return Ok(stats.clone());
                }
            }
        }
        let state = require(
            &mut self.state,
            "end",
            &[SessionStatus::Active, SessionStatus::Paused],
        )?;
        let session_id = state.session.id.clone();
        let stats = end_stats(state, reason, end_data, now);
        self.persistence
            .record_end(&session_id, &stats)
            .map_err(|err| as_persistence("end session", err))?;

        if let Some(episode) = state.session.exit_flow(now) {
            self.events.push(SessionEvent::FlowExited {
                session_id: session_id.clone(),
                duration_secs: episode.duration_secs,
                at: now,
            });
        }
        state.session.stop_clock(now);
        state.session.status = SessionStatus::Ended;
        state.session.end_stats = Some(stats.clone());
        state.pending_auto_end_at = None;
        let released = state.gate.stop_blocking();

        if !released.is_empty() {
            self.surface.release(&released);
        }
        self.surface.restore();
        if let Err(err) = self.snapshots.clear_session_snapshot() {
            warn!(session_id = %session_id, error = %err, "failed to clear session snapshot");
        }

        info!(
            session_id = %session_id,
            %reason,
            elapsed_minutes = stats.elapsed_minutes,
            completed = stats.completed_task_ids.len(),
            released = released.len(),
            "session ended"
        );
        self.events.push(SessionEvent::InterruptionsReleased {
            session_id: session_id.clone(),
            count: released.len(),
            at: now,
        });
        self.events.push(SessionEvent::SessionEnded {
            session_id,
            reason,
            stats: stats.clone(),
            at: now,
        });
        Ok(stats)
    }

    // ── Timers ───────────────────────────────────────────────────────

    /// Drive time-based work: elapsed accrual, inactivity, the pending
    /// auto-end, break reminders, and flow evaluation when it is due.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if !state.session.status.is_live() {
            return;
        }
        if state.pending_auto_end_at.is_some_and(|at| now >= at) {
            if let Err(err) = self.end(EndReason::AllTasksCompleted, EndData::default(), now) {
                warn!(error = %err, "auto-end failed, retrying on next tick");
            }
            return;
        }
        if state.session.status != SessionStatus::Active {
            return;
        }

        state.session.accrue(now);
        let distraction = state.gate.check_inactivity(now);
        let elapsed_minutes = state.session.elapsed_minutes(now);
        let break_due = state.breaks.check(elapsed_minutes).map(|_| BreakDue {
            session_id: state.session.id.clone(),
            elapsed_minutes,
            interval_minutes: state.breaks.interval_minutes(),
        });
        let eval_interval = Duration::seconds(state.env.flow_eval_interval_secs.max(1) as i64);
        let eval_due = now - state.last_flow_eval_at >= eval_interval;

        if let Some(signal) = distraction {
            self.on_distraction(signal, now);
        }
        if let Some(due) = break_due {
            info!(session_id = %due.session_id, elapsed_minutes, "break due");
            self.events.push(SessionEvent::BreakDue {
                session_id: due.session_id,
                elapsed_minutes: due.elapsed_minutes,
                interval_minutes: due.interval_minutes,
                at: now,
            });
        }
        if eval_due {
            if let Err(err) = self.evaluate_flow(now) {
                debug!(error = %err, "flow evaluation skipped");
            }
        }
    }

    /// Close the current behavior window and score it.
    pub fn evaluate_flow(&mut self, now: DateTime<Utc>) -> Result<FlowSnapshot> {
        let state = require(&mut self.state, "evaluate flow", &[SessionStatus::Active])?;
        let attempting = state.session.current_task.is_some();
        let sample = state.sampler.take(now, attempting);
        let snapshot = state.detector.observe(&sample);
        state.last_flow_eval_at = now;

        let session = &mut state.session;
        let session_id = session.id.clone();
        session.flow.last_score = snapshot.aggregate;
        session.flow_scores.push(snapshot.aggregate);

        debug!(
            session_id = %session_id,
            score = snapshot.aggregate,
            confidence = snapshot.confidence,
            in_flow = snapshot.is_in_flow,
            "flow evaluated"
        );
        self.events.push(SessionEvent::FlowEvaluated {
            session_id: session_id.clone(),
            score: snapshot.aggregate,
            confidence: snapshot.confidence,
            in_flow: snapshot.is_in_flow,
            at: now,
        });

        match (session.flow.in_flow, snapshot.is_in_flow) {
            (false, true) => {
                session.enter_flow(snapshot.aggregate, now);
                info!(session_id = %session_id, score = snapshot.aggregate, "flow entered");
                self.events.push(SessionEvent::FlowEntered {
                    session_id: session_id.clone(),
                    snapshot: snapshot.clone(),
                    at: now,
                });
            }
            (true, false) => {
                if let Some(episode) = session.exit_flow(now) {
                    info!(
                        session_id = %session_id,
                        duration_secs = episode.duration_secs,
                        "flow exited"
                    );
                    self.events.push(SessionEvent::FlowExited {
                        session_id: session_id.clone(),
                        duration_secs: episode.duration_secs,
                        at: now,
                    });
                }
            }
            (true, true) => {
                session.flow.episode_peak = session.flow.episode_peak.max(snapshot.aggregate);
            }
            (false, false) => {}
        }

        if !snapshot.recommendations.is_empty() {
            self.events.push(SessionEvent::FlowRecommendations {
                session_id,
                recommendations: snapshot.recommendations.clone(),
                at: now,
            });
        }
        self.save_snapshot();
        Ok(snapshot)
    }

    // ── Signals ──────────────────────────────────────────────────────

    /// Feed one behavioral signal. Ignored while paused.
    pub fn record_activity(&mut self, signal: ActivitySignal, now: DateTime<Utc>) -> Result<()> {
        let state = require(
            &mut self.state,
            "record activity",
            &[SessionStatus::Active, SessionStatus::Paused],
        )?;
        if state.session.status == SessionStatus::Paused {
            return Ok(());
        }
        state.sampler.record(&signal, now);
        let distraction = match signal {
            ActivitySignal::Visibility { hidden } => state.gate.note_visibility(hidden, now),
            ref s if s.is_input() => {
                state.gate.note_activity(now);
                None
            }
            _ => None,
        };
        if let Some(signal) = distraction {
            self.on_distraction(signal, now);
        }
        Ok(())
    }

    fn on_distraction(&mut self, signal: DistractionSignal, now: DateTime<Utc>) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.session.distractions_flagged += 1;
        // Hidden surfaces already reached the sampler as visibility signals.
        if matches!(signal, DistractionSignal::Inactivity { .. }) {
            state.sampler.record_interruption(signal.at(), true);
        }
        let session_id = state.session.id.clone();
        let record = DistractionRecord::Signal {
            signal: signal.clone(),
        };
        if let Err(err) = self.persistence.record_distraction(&session_id, &record) {
            warn!(session_id = %session_id, error = %err, "failed to record distraction");
        }
        debug!(session_id = %session_id, ?signal, "distraction detected");
        self.events.push(SessionEvent::DistractionDetected {
            session_id,
            signal,
            at: now,
        });
    }

    /// Pass an incoming interruption through the gate.
    ///
    /// Without a live session the gate is disarmed and everything passes.
    pub fn handle_interruption(&mut self, event: InterruptionEvent, now: DateTime<Utc>) -> GateDecision {
        let Some(state) = self.state.as_mut().filter(|s| s.session.status.is_live()) else {
            return GateDecision::Allow;
        };
        let in_flow = state.session.flow.in_flow;
        let urgency = state.gate.classify(&event);
        let decision = state.gate.intercept(event.clone(), in_flow);
        let session_id = state.session.id.clone();

        match decision {
            GateDecision::Allow => {
                state.session.interruptions_allowed += 1;
                if state.session.status == SessionStatus::Active {
                    state.sampler.record_interruption(now, false);
                }
                self.events.push(SessionEvent::InterruptionAllowed {
                    session_id: session_id.clone(),
                    event_id: event.id.clone(),
                    source: event.source,
                    urgency,
                    at: now,
                });
            }
            GateDecision::Queue { reason } => {
                state.session.interruptions_queued += 1;
                self.events.push(SessionEvent::InterruptionQueued {
                    session_id: session_id.clone(),
                    event_id: event.id.clone(),
                    source: event.source,
                    urgency,
                    reason,
                    at: now,
                });
            }
        }

        let mut recorded = event;
        recorded.urgency = Some(urgency);
        let record = DistractionRecord::Interruption {
            event: recorded,
            decision,
        };
        if let Err(err) = self.persistence.record_distraction(&session_id, &record) {
            warn!(session_id = %session_id, error = %err, "failed to record interruption");
        }
        self.save_snapshot();
        decision
    }

    /// Disarm the gate and flush its queue without ending the session.
    pub fn emergency_override(&mut self, now: DateTime<Utc>) -> Result<Vec<InterruptionEvent>> {
        let state = require(
            &mut self.state,
            "override the gate",
            &[SessionStatus::Active, SessionStatus::Paused],
        )?;
        let released = state.gate.emergency_override();
        let session_id = state.session.id.clone();

        self.surface.release(&released);
        self.surface.restore();
        warn!(session_id = %session_id, released = released.len(), "emergency override");
        self.events.push(SessionEvent::EmergencyOverride {
            session_id,
            released: released.len(),
            at: now,
        });
        self.save_snapshot();
        Ok(released)
    }

    // ── Recovery ─────────────────────────────────────────────────────

    /// Pick up `user_id`'s live session after a restart, using
    /// [`EnvConfig::for_type`] when the session has to be rebuilt.
    pub fn restore(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<Option<SessionId>> {
        self.restore_with(user_id, now, EnvConfig::for_type)
    }

    /// Pick up `user_id`'s live session after a restart.
    ///
    /// The durable snapshot wins when it belongs to the user. Otherwise the
    /// session is rebuilt from the persistence record and the task store,
    /// with elapsed time recomputed from the start time minus recorded
    /// pauses. Skipped tasks stay out of the rebuilt queue.
    pub fn restore_with<F>(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
        env_for: F,
    ) -> Result<Option<SessionId>>
    where
        F: Fn(SessionType) -> EnvConfig,
    {
        let status = self.status();
        if status.is_live() {
            return Err(CoreError::invalid_state("restore", status));
        }

        match self.snapshots.load_session_snapshot() {
            Ok(Some(state))
                if state.session.user_id == user_id && state.session.status.is_live() =>
            {
                return Ok(Some(self.adopt(state, true, now)));
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to load session snapshot"),
        }

        let Some(record) = self
            .persistence
            .get_active_session(user_id)
            .map_err(|err| as_persistence("restore session", err))?
        else {
            return Ok(None);
        };
        let candidates = self
            .tasks
            .list_candidates(&TaskFilter::by_ids(record.task_ids.clone()))
            .map_err(|err| as_persistence("restore session", err))?;
        let by_id: HashMap<&str, &TaskCandidate> =
            candidates.iter().map(|t| (t.id.as_str(), t)).collect();

        let mut open = Vec::new();
        let mut completed = Vec::new();
        for id in &record.task_ids {
            if record.skipped_task_ids.contains(id) {
                continue;
            }
            match by_id.get(id.as_str()) {
                Some(task) if task.status == TaskStatus::Completed => completed.push(id.clone()),
                Some(task) if task.status.is_closed() => {}
                Some(task) => open.push((*task).clone()),
                None => warn!(session_id = %record.id, task_id = %id, "session task no longer exists"),
            }
        }

        let env = env_for(record.session_type)
            .with_user(record.user_id.clone())
            .with_planned_minutes(record.planned_minutes)
            .with_gate_level(record.gate_level);
        let clock_end = record.paused_at.unwrap_or(now);
        let elapsed = (clock_end - record.started_at) - Duration::milliseconds(record.paused_ms);

        let mut session = Session::begin(record.id.clone(), &env, open, record.started_at);
        session.completed_task_ids = completed;
        session.skipped_task_ids = record.skipped_task_ids.clone();
        let session = session.resumed_from(
            elapsed.max(Duration::zero()),
            record.paused_at,
            record.paused_ms,
            now,
        );

        let mut state = SessionState::armed(session, env, now);
        if state.session.status == SessionStatus::Paused {
            state.sampler.pause(now);
        }
        if let Some(paused_at) = record.paused_at {
            // Resume shifts this anchor by the whole recorded pause.
            state.last_flow_eval_at = paused_at;
        }
        if !state.session.has_remaining_tasks() {
            state.pending_auto_end_at =
                Some(now + Duration::seconds(state.env.auto_end_grace_secs as i64));
        }
        let session_id = self.adopt(state, false, now);
        self.save_snapshot();
        Ok(Some(session_id))
    }

    fn adopt(&mut self, state: SessionState, from_snapshot: bool, now: DateTime<Utc>) -> SessionId {
        let session_id = state.session.id.clone();
        let elapsed_minutes = state.session.elapsed_minutes(now);
        if state.gate.is_armed() {
            self.surface.suppress();
        }
        info!(session_id = %session_id, from_snapshot, elapsed_minutes, "session restored");
        self.events.push(SessionEvent::SessionRestored {
            session_id: session_id.clone(),
            from_snapshot,
            elapsed_minutes,
            at: now,
        });
        self.state = Some(state);
        session_id
    }

    /// Write the durable snapshot now.
    pub fn checkpoint(&self) -> Result<()> {
        match &self.state {
            Some(state) if state.session.status.is_live() => {
                self.snapshots.save_session_snapshot(state)
            }
            _ => Ok(()),
        }
    }

    fn save_snapshot(&self) {
        if let Err(err) = self.checkpoint() {
            warn!(error = %err, "failed to save session snapshot");
        }
    }

    fn mirror_status(&self, task_id: &str, status: TaskStatus) {
        if let Err(err) = self.tasks.set_status(task_id, status) {
            warn!(task_id, %status, error = %err, "failed to mirror task status");
        }
    }
}

struct BreakDue {
    session_id: String,
    elapsed_minutes: u64,
    interval_minutes: u64,
}

fn end_stats(state: &SessionState, reason: EndReason, end_data: EndData, now: DateTime<Utc>) -> EndStats {
    let session = &state.session;
    let open_episode = u32::from(session.flow.in_flow);
    let gate = state.gate.stats();
    EndStats {
        reason,
        ended_at: now,
        elapsed_minutes: session.elapsed_minutes(now),
        completed_task_ids: session.completed_task_ids.clone(),
        skipped_task_ids: session.skipped_task_ids.clone(),
        total_flow_secs: session.total_flow_secs(now),
        flow_episodes: session.flow_episodes.len() as u32 + open_episode,
        average_flow_score: session.average_flow_score(),
        peak_flow_score: session.peak_flow_score(),
        interruptions_queued: session.interruptions_queued,
        interruptions_allowed: session.interruptions_allowed,
        interruptions_released: gate.released + state.gate.queued().len() as u32,
        distractions_flagged: session.distractions_flagged,
        pause_count: session.pause_count,
        end_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{GateLevel, InterruptionSource};
    use crate::ports::{HeadlessSurface, SessionRecord};
    use std::sync::{Arc, Mutex};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[derive(Default)]
    struct Recorded {
        statuses: Vec<(String, TaskStatus)>,
        ends: u32,
        fail_end: bool,
        fail_status: bool,
        snapshot: Option<SessionState>,
    }

    /// In-memory stand-in for every storage port.
    #[derive(Clone, Default)]
    struct Fake(Arc<Mutex<Recorded>>);

    impl TaskStore for Fake {
        fn list_candidates(&self, _filter: &TaskFilter) -> Result<Vec<TaskCandidate>> {
            Ok(Vec::new())
        }
        fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<()> {
            let mut rec = self.0.lock().unwrap();
            if rec.fail_status {
                return Err(CoreError::task_not_found(task_id));
            }
            rec.statuses.push((task_id.to_string(), status));
            Ok(())
        }
    }

    impl SessionPersistence for Fake {
        fn create_session(&self, _draft: &SessionDraft) -> Result<SessionId> {
            Ok("s1".to_string())
        }
        fn get_active_session(&self, _user_id: &str) -> Result<Option<SessionRecord>> {
            Ok(None)
        }
        fn record_pause(&self, _id: &str, _at: DateTime<Utc>) -> Result<()> {
            Ok(())
        }
        fn record_resume(&self, _id: &str, _at: DateTime<Utc>) -> Result<()> {
            Ok(())
        }
        fn record_end(&self, _id: &str, _stats: &EndStats) -> Result<()> {
            let mut rec = self.0.lock().unwrap();
            if rec.fail_end {
                return Err(CoreError::persistence("record end", "backend offline"));
            }
            rec.ends += 1;
            Ok(())
        }
        fn record_skip(&self, _id: &str, _task_id: &str) -> Result<()> {
            Ok(())
        }
        fn record_distraction(&self, _id: &str, _record: &DistractionRecord) -> Result<()> {
            Ok(())
        }
    }

    impl SnapshotStore for Fake {
        fn save_session_snapshot(&self, state: &SessionState) -> Result<()> {
            self.0.lock().unwrap().snapshot = Some(state.clone());
            Ok(())
        }
        fn load_session_snapshot(&self) -> Result<Option<SessionState>> {
            Ok(self.0.lock().unwrap().snapshot.clone())
        }
        fn clear_session_snapshot(&self) -> Result<()> {
            self.0.lock().unwrap().snapshot = None;
            Ok(())
        }
    }

    fn controller() -> (SessionController, Fake, HeadlessSurface) {
        let fake = Fake::default();
        let surface = HeadlessSurface::new();
        let controller =
            SessionController::new(fake.clone(), fake.clone(), surface.clone(), fake.clone());
        (controller, fake, surface)
    }

    fn tasks(n: usize) -> Vec<TaskCandidate> {
        (0..n)
            .map(|i| TaskCandidate::new(format!("t{i}"), format!("Task {i}"), 20))
            .collect()
    }

    fn chat(content: &str) -> InterruptionEvent {
        InterruptionEvent::new(InterruptionSource::Chat, "amy", content, t0())
    }

    #[test]
    fn guards_reject_out_of_state_calls() {
        let (mut c, _, _) = controller();
        let err = c.pause(t0()).unwrap_err();
        assert!(err.is_invalid_state());
        assert!(c.resume(t0()).unwrap_err().is_invalid_state());
        assert!(c.complete_current_task(t0()).unwrap_err().is_invalid_state());
        assert!(c.end(EndReason::UserEnded, EndData::default(), t0())
            .unwrap_err()
            .is_invalid_state());

        assert!(c
            .start(Vec::new(), EnvConfig::default(), t0())
            .unwrap_err()
            .is_invalid_state());

        c.start(tasks(1), EnvConfig::default(), t0()).unwrap();
        assert!(c
            .start(tasks(1), EnvConfig::default(), t0())
            .unwrap_err()
            .is_invalid_state());
        assert!(c.resume(t0()).unwrap_err().is_invalid_state());
    }

    #[test]
    fn start_arms_gate_and_suppresses_surface() {
        let (mut c, fake, surface) = controller();
        let env = EnvConfig::for_type(SessionType::DeepWork);
        let id = c.start(tasks(2), env, t0()).unwrap();

        assert_eq!(id, "s1");
        assert_eq!(c.status(), SessionStatus::Active);
        let state = c.state().unwrap();
        assert_eq!(state.gate().level(), Some(GateLevel::Strict));
        assert!(surface.is_suppressed());
        assert_eq!(
            fake.0.lock().unwrap().statuses,
            [("t0".to_string(), TaskStatus::InProgress)]
        );
        assert!(fake.0.lock().unwrap().snapshot.is_some());

        let kinds: Vec<_> = c.drain_events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, ["SessionStarted", "TaskStarted"]);
    }

    #[test]
    fn duplicate_task_ids_are_dropped() {
        let (mut c, _, _) = controller();
        let mut list = tasks(2);
        list.push(TaskCandidate::new("t0", "again", 10));
        c.start(list, EnvConfig::default(), t0()).unwrap();
        assert_eq!(c.session().unwrap().tracked_task_count(), 2);
    }

    #[test]
    fn task_status_failures_do_not_block() {
        let (mut c, fake, _) = controller();
        c.start(tasks(2), EnvConfig::default(), t0()).unwrap();
        fake.0.lock().unwrap().fail_status = true;

        let next = c.complete_current_task(t0()).unwrap();
        assert_eq!(next.map(|t| t.id), Some("t1".to_string()));
        assert_eq!(c.session().unwrap().completed_task_ids, ["t0"]);
    }

    #[test]
    fn failed_end_leaves_session_retryable() {
        let (mut c, fake, surface) = controller();
        c.start(tasks(1), EnvConfig::for_type(SessionType::DeepWork), t0())
            .unwrap();
        c.handle_interruption(chat("hello"), t0());
        fake.0.lock().unwrap().fail_end = true;

        let err = c
            .end(EndReason::UserEnded, EndData::default(), t0())
            .unwrap_err();
        assert!(matches!(err, CoreError::PersistenceFailure { .. }));
        assert_eq!(c.status(), SessionStatus::Active);
        assert_eq!(c.queued_interruptions().len(), 1);
        assert!(surface.released().is_empty());

        fake.0.lock().unwrap().fail_end = false;
        let stats = c
            .end(EndReason::UserEnded, EndData::default(), t0())
            .unwrap();
        assert_eq!(stats.interruptions_released, 1);
        assert_eq!(surface.released().len(), 1);
        assert!(!surface.is_suppressed());
        assert!(fake.0.lock().unwrap().snapshot.is_none());
    }

    #[test]
    fn auto_end_waits_for_grace_delay() {
        let (mut c, fake, _) = controller();
        c.start(tasks(1), EnvConfig::default(), t0()).unwrap();
        c.complete_current_task(t0()).unwrap();

        let ends_at = c.state().unwrap().pending_auto_end_at().unwrap();
        assert_eq!(ends_at, t0() + Duration::seconds(3));

        c.tick(t0() + Duration::seconds(2));
        assert_eq!(c.status(), SessionStatus::Active);
        c.tick(ends_at);
        assert_eq!(c.status(), SessionStatus::Ended);
        assert_eq!(
            c.session().unwrap().end_stats.as_ref().unwrap().reason,
            EndReason::AllTasksCompleted
        );
        assert_eq!(fake.0.lock().unwrap().ends, 1);
    }

    #[test]
    fn inactivity_is_flagged_on_tick() {
        let (mut c, _, _) = controller();
        c.start(tasks(1), EnvConfig::default(), t0()).unwrap();
        c.drain_events();

        c.tick(t0() + Duration::seconds(31));
        let events = c.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::DistractionDetected { .. })));
        assert_eq!(c.session().unwrap().distractions_flagged, 1);
    }

    #[test]
    fn break_due_is_only_a_recommendation() {
        let (mut c, _, _) = controller();
        let env = EnvConfig::for_type(SessionType::Light);
        c.start(tasks(1), env, t0()).unwrap();
        c.drain_events();

        c.tick(t0() + Duration::minutes(30));
        let events = c.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::BreakDue {
                elapsed_minutes: 30,
                interval_minutes: 30,
                ..
            }
        )));
        assert_eq!(c.status(), SessionStatus::Active);
    }

    #[test]
    fn flow_evaluation_runs_on_interval() {
        let (mut c, _, _) = controller();
        c.start(tasks(1), EnvConfig::default(), t0()).unwrap();
        c.drain_events();

        c.tick(t0() + Duration::seconds(10));
        assert!(c.latest_flow().is_none());
        c.tick(t0() + Duration::seconds(30));
        assert!(c.latest_flow().is_some());
        assert!(c
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::FlowEvaluated { .. })));
        assert_eq!(c.session().unwrap().flow_scores.len(), 1);
    }

    #[test]
    fn paused_time_does_not_count_toward_flow_evaluation() {
        let (mut c, _, _) = controller();
        c.start(tasks(1), EnvConfig::default(), t0()).unwrap();
        c.pause(t0() + Duration::seconds(5)).unwrap();
        c.resume(t0() + Duration::seconds(65)).unwrap();

        c.tick(t0() + Duration::seconds(66));
        c.tick(t0() + Duration::seconds(89));
        assert!(c.latest_flow().is_none());

        // 5s before the pause plus 25s after it.
        c.tick(t0() + Duration::seconds(90));
        assert_eq!(c.session().unwrap().flow_scores.len(), 1);
        assert_eq!(
            c.state().unwrap().last_flow_eval_at(),
            t0() + Duration::seconds(90)
        );
    }

    #[test]
    fn start_is_allowed_again_after_end() {
        let (mut c, _, _) = controller();
        c.start(tasks(1), EnvConfig::default(), t0()).unwrap();
        c.end(EndReason::UserEnded, EndData::default(), t0()).unwrap();

        c.start(tasks(2), EnvConfig::default(), t0() + Duration::minutes(1))
            .unwrap();
        let session = c.session().unwrap();
        assert_eq!(c.status(), SessionStatus::Active);
        assert!(session.end_stats.is_none());
        assert_eq!(session.tracked_task_count(), 2);
    }

    #[test]
    fn interruptions_without_session_pass() {
        let (mut c, _, _) = controller();
        assert_eq!(c.handle_interruption(chat("hi"), t0()), GateDecision::Allow);
    }

    #[test]
    fn emergency_override_keeps_session_running() {
        let (mut c, _, surface) = controller();
        c.start(tasks(1), EnvConfig::for_type(SessionType::DeepWork), t0())
            .unwrap();
        assert!(!c.handle_interruption(chat("ping"), t0()).is_allowed());

        let released = c.emergency_override(t0()).unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(surface.released().len(), 1);
        assert_eq!(c.status(), SessionStatus::Active);
        assert!(c.handle_interruption(chat("pong"), t0()).is_allowed());
    }

    #[test]
    fn restore_prefers_snapshot() {
        let (mut c, fake, _) = controller();
        c.start(tasks(2), EnvConfig::default(), t0()).unwrap();
        c.complete_current_task(t0() + Duration::minutes(5)).unwrap();

        let surface = HeadlessSurface::new();
        let mut fresh =
            SessionController::new(fake.clone(), fake.clone(), surface.clone(), fake.clone());
        let restored = fresh.restore("local", t0() + Duration::minutes(10)).unwrap();
        assert_eq!(restored.as_deref(), Some("s1"));
        let session = fresh.session().unwrap();
        assert_eq!(session.completed_task_ids, ["t0"]);
        assert_eq!(session.elapsed_minutes(t0() + Duration::minutes(10)), 10);
        assert!(surface.is_suppressed());

        assert!(fresh.restore("local", t0()).unwrap_err().is_invalid_state());
    }

    #[test]
    fn restore_without_anything_is_none() {
        let (mut c, _, _) = controller();
        assert_eq!(c.restore("local", t0()).unwrap(), None);
        assert_eq!(c.status(), SessionStatus::Idle);
    }
}
