//! Behavioral signals gathered between two flow evaluations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single interruption observed during a sample window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterruptionMark {
    pub at: DateTime<Utc>,
    /// Self-inflicted (tab switch, idling) rather than an external event.
    #[serde(default)]
    pub self_inflicted: bool,
}

/// Raw signals accumulated since the previous flow evaluation.
///
/// Windows never overlap: the controller takes a sample from the
/// [`SampleAccumulator`] and the accumulator starts a fresh window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorSample {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Paused time inside the window, excluded from rates.
    #[serde(default)]
    pub excluded_minutes: f64,
    #[serde(default)]
    pub keystrokes: Vec<DateTime<Utc>>,
    /// Keystrokes plus pointer events.
    #[serde(default)]
    pub input_events: u32,
    #[serde(default)]
    pub task_switches: u32,
    #[serde(default)]
    pub active_minutes: f64,
    #[serde(default)]
    pub idle_minutes: f64,
    /// Minutes spent on surfaces classified as focus work.
    #[serde(default)]
    pub focus_surface_minutes: f64,
    #[serde(default)]
    pub interruptions: Vec<InterruptionMark>,
    /// Self-reported duration of the window.
    #[serde(default)]
    pub perceived_minutes: Option<f64>,
    /// Difficulty of the current task, 1-10.
    #[serde(default)]
    pub task_difficulty: Option<f64>,
    /// User skill for the current task, 1-10.
    #[serde(default)]
    pub user_skill: Option<f64>,
    #[serde(default)]
    pub tasks_completed: u32,
    #[serde(default)]
    pub tasks_attempted: u32,
}

impl BehaviorSample {
    /// An empty window with no signals.
    pub fn empty(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            window_start,
            window_end,
            excluded_minutes: 0.0,
            keystrokes: Vec::new(),
            input_events: 0,
            task_switches: 0,
            active_minutes: 0.0,
            idle_minutes: 0.0,
            focus_surface_minutes: 0.0,
            interruptions: Vec::new(),
            perceived_minutes: None,
            task_difficulty: None,
            user_skill: None,
            tasks_completed: 0,
            tasks_attempted: 0,
        }
    }

    /// Effective window length in minutes (paused time removed).
    pub fn window_minutes(&self) -> f64 {
        let raw = (self.window_end - self.window_start).num_milliseconds() as f64 / 60_000.0;
        (raw - self.excluded_minutes).max(0.0)
    }

    pub fn window_hours(&self) -> f64 {
        self.window_minutes() / 60.0
    }

    /// Milliseconds between consecutive keystrokes, ignoring long pauses.
    pub fn keystroke_intervals_ms(&self, max_gap_ms: i64) -> Vec<f64> {
        let mut sorted = self.keystrokes.clone();
        sorted.sort();
        sorted
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_milliseconds())
            .filter(|gap| *gap > 0 && *gap <= max_gap_ms)
            .map(|gap| gap as f64)
            .collect()
    }

    /// Completed share of attempted tasks, `None` when nothing was attempted.
    pub fn completion_rate(&self) -> Option<f64> {
        if self.tasks_attempted == 0 {
            return None;
        }
        Some((self.tasks_completed as f64 / self.tasks_attempted as f64).min(1.0))
    }

    pub fn self_inflicted_interruptions(&self) -> usize {
        self.interruptions.iter().filter(|i| i.self_inflicted).count()
    }
}

/// Kind of pointer/keyboard input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Keystroke,
    Pointer,
}

/// A raw activity signal reported by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivitySignal {
    Input { input: InputKind },
    TaskSwitch,
    SurfaceTime { focus: bool, minutes: f64 },
    SelfReport {
        #[serde(default)]
        perceived_minutes: Option<f64>,
        #[serde(default)]
        difficulty: Option<f64>,
        #[serde(default)]
        skill: Option<f64>,
    },
    /// Host window or tab became hidden/visible.
    Visibility { hidden: bool },
}

impl ActivitySignal {
    pub fn keystroke() -> Self {
        ActivitySignal::Input {
            input: InputKind::Keystroke,
        }
    }

    pub fn pointer() -> Self {
        ActivitySignal::Input {
            input: InputKind::Pointer,
        }
    }

    /// Whether the signal proves the user is at the keyboard.
    pub fn is_input(&self) -> bool {
        matches!(self, ActivitySignal::Input { .. })
    }
}

/// Builds [`BehaviorSample`]s from raw signals.
///
/// Gaps between inputs up to `idle_threshold` count as active time; the
/// remainder of a longer gap counts as idle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleAccumulator {
    window_start: DateTime<Utc>,
    idle_threshold_ms: i64,
    last_input: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    excluded_ms: i64,
    keystrokes: Vec<DateTime<Utc>>,
    input_events: u32,
    task_switches: u32,
    active_ms: i64,
    idle_ms: i64,
    focus_ms: i64,
    interruptions: Vec<InterruptionMark>,
    perceived_minutes: Option<f64>,
    task_difficulty: Option<f64>,
    user_skill: Option<f64>,
    tasks_completed: u32,
    tasks_attempted: u32,
}

impl SampleAccumulator {
    pub fn new(window_start: DateTime<Utc>, idle_threshold: Duration) -> Self {
        Self {
            window_start,
            idle_threshold_ms: idle_threshold.num_milliseconds().max(1),
            last_input: None,
            paused_at: None,
            excluded_ms: 0,
            keystrokes: Vec::new(),
            input_events: 0,
            task_switches: 0,
            active_ms: 0,
            idle_ms: 0,
            focus_ms: 0,
            interruptions: Vec::new(),
            perceived_minutes: None,
            task_difficulty: None,
            user_skill: None,
            tasks_completed: 0,
            tasks_attempted: 0,
        }
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    /// Default difficulty/skill pair used when the host never reports one.
    pub fn set_baseline(&mut self, difficulty: Option<f64>, skill: Option<f64>) {
        if self.task_difficulty.is_none() {
            self.task_difficulty = difficulty;
        }
        if self.user_skill.is_none() {
            self.user_skill = skill;
        }
    }

    pub fn record(&mut self, signal: &ActivitySignal, at: DateTime<Utc>) {
        match signal {
            ActivitySignal::Input { input } => {
                self.account_gap(at);
                self.last_input = Some(at);
                self.input_events += 1;
                if *input == InputKind::Keystroke {
                    self.keystrokes.push(at);
                }
            }
            ActivitySignal::TaskSwitch => self.task_switches += 1,
            ActivitySignal::SurfaceTime { focus, minutes } => {
                if *focus && *minutes > 0.0 {
                    self.focus_ms += (minutes * 60_000.0) as i64;
                }
            }
            ActivitySignal::SelfReport {
                perceived_minutes,
                difficulty,
                skill,
            } => {
                if perceived_minutes.is_some() {
                    self.perceived_minutes = *perceived_minutes;
                }
                if difficulty.is_some() {
                    self.task_difficulty = *difficulty;
                }
                if skill.is_some() {
                    self.user_skill = *skill;
                }
            }
            ActivitySignal::Visibility { hidden } => {
                if *hidden {
                    self.record_interruption(at, true);
                }
            }
        }
    }

    pub fn record_interruption(&mut self, at: DateTime<Utc>, self_inflicted: bool) {
        self.interruptions.push(InterruptionMark { at, self_inflicted });
    }

    pub fn record_task_outcome(&mut self, completed: bool) {
        self.tasks_attempted += 1;
        if completed {
            self.tasks_completed += 1;
        }
    }

    /// Stop counting wall-clock time until [`Self::resume`].
    pub fn pause(&mut self, at: DateTime<Utc>) {
        self.account_gap(at);
        self.last_input = Some(at);
        self.paused_at = Some(at);
    }

    pub fn resume(&mut self, at: DateTime<Utc>) {
        if let Some(paused_at) = self.paused_at.take() {
            self.excluded_ms += (at - paused_at).num_milliseconds().max(0);
        }
        self.last_input = Some(at);
    }

    /// Close the current window at `now` and start a new one.
    ///
    /// `attempting` marks a task still in progress as attempted.
    pub fn take(&mut self, now: DateTime<Utc>, attempting: bool) -> BehaviorSample {
        if self.paused_at.is_none() {
            self.account_gap(now);
        }
        let sample = BehaviorSample {
            window_start: self.window_start,
            window_end: now,
            excluded_minutes: self.excluded_ms as f64 / 60_000.0,
            keystrokes: std::mem::take(&mut self.keystrokes),
            input_events: self.input_events,
            task_switches: self.task_switches,
            active_minutes: self.active_ms as f64 / 60_000.0,
            idle_minutes: self.idle_ms as f64 / 60_000.0,
            focus_surface_minutes: self.focus_ms as f64 / 60_000.0,
            interruptions: std::mem::take(&mut self.interruptions),
            perceived_minutes: self.perceived_minutes.take(),
            task_difficulty: self.task_difficulty,
            user_skill: self.user_skill,
            tasks_completed: self.tasks_completed,
            tasks_attempted: self.tasks_attempted + u32::from(attempting),
        };

        self.window_start = now;
        self.last_input = Some(now);
        self.excluded_ms = 0;
        self.input_events = 0;
        self.task_switches = 0;
        self.active_ms = 0;
        self.idle_ms = 0;
        self.focus_ms = 0;
        self.tasks_completed = 0;
        self.tasks_attempted = 0;
        if self.paused_at.is_some() {
            self.paused_at = Some(now);
        }
        sample
    }

    fn account_gap(&mut self, at: DateTime<Utc>) {
        if self.paused_at.is_some() {
            return;
        }
        let reference = self.last_input.unwrap_or(self.window_start);
        let gap = (at - reference).num_milliseconds();
        if gap <= 0 {
            return;
        }
        if gap <= self.idle_threshold_ms {
            self.active_ms += gap;
        } else {
            self.active_ms += self.idle_threshold_ms;
            self.idle_ms += gap - self.idle_threshold_ms;
        }
    }
}
