//! The distraction gate.
//!
//! ## States
//!
//! ```text
//! Disarmed -> Armed(strict | balanced | light) -> Disarmed
//! ```
//!
//! ## Decision policy (armed)
//!
//! 1. `critical` always passes.
//! 2. Blocked sources are queued.
//! 3. In flow, anything below `high` is queued.
//! 4. Otherwise by level: `strict` queues everything, `balanced` queues
//!    `low`, `light` passes.
//!
//! A disarmed gate passes everything. Disarming hands the whole queue back
//! to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use super::classifier::{InterruptionEvent, Urgency, UrgencyClassifier};
use super::inactivity::{DistractionSignal, InactivityMonitor};

/// Strictness outside of flow state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GateLevel {
    Strict,
    Balanced,
    Light,
}

impl Default for GateLevel {
    fn default() -> Self {
        GateLevel::Balanced
    }
}

impl fmt::Display for GateLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateLevel::Strict => "strict",
            GateLevel::Balanced => "balanced",
            GateLevel::Light => "light",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for GateLevel {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(GateLevel::Strict),
            "balanced" => Ok(GateLevel::Balanced),
            "light" => Ok(GateLevel::Light),
            other => Err(crate::error::ValidationError::InvalidValue {
                field: "gate level".into(),
                message: format!("expected strict|balanced|light, got '{other}'"),
            }),
        }
    }
}

/// Gate settings handed over when a session starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    #[serde(default)]
    pub level: GateLevel,
    #[serde(default)]
    pub emergency_contacts: Vec<String>,
    #[serde(default)]
    pub priority_contacts: Vec<String>,
    /// Source names (`chat`, `social`, ...) or sender fragments to hold back.
    #[serde(default)]
    pub blocked_sources: Vec<String>,
    #[serde(default)]
    pub urgent_keywords: Vec<String>,
    #[serde(default = "default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: u64,
}

fn default_inactivity_threshold_secs() -> u64 {
    30
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            level: GateLevel::default(),
            emergency_contacts: Vec::new(),
            priority_contacts: Vec::new(),
            blocked_sources: Vec::new(),
            urgent_keywords: Vec::new(),
            inactivity_threshold_secs: default_inactivity_threshold_secs(),
        }
    }
}

impl GateConfig {
    pub fn with_level(level: GateLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    fn is_blocked(&self, event: &InterruptionEvent) -> bool {
        let source = event.source.as_str();
        let sender = event.sender.to_lowercase();
        self.blocked_sources.iter().any(|blocked| {
            let blocked = blocked.to_lowercase();
            blocked == source || (!blocked.is_empty() && sender.contains(&blocked))
        })
    }
}

/// Why an interruption was held back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueReason {
    FlowProtection,
    StrictLevel,
    LowUrgency,
    BlockedSource,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Allow,
    Queue { reason: QueueReason },
}

impl GateDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

/// Pure decision policy for an armed gate.
pub fn decide(level: GateLevel, urgency: Urgency, blocked: bool, in_flow: bool) -> GateDecision {
    if urgency == Urgency::Critical {
        return GateDecision::Allow;
    }
    if blocked {
        return GateDecision::Queue {
            reason: QueueReason::BlockedSource,
        };
    }
    if in_flow && urgency < Urgency::High {
        return GateDecision::Queue {
            reason: QueueReason::FlowProtection,
        };
    }
    match level {
        GateLevel::Strict => GateDecision::Queue {
            reason: QueueReason::StrictLevel,
        },
        GateLevel::Balanced if urgency == Urgency::Low => GateDecision::Queue {
            reason: QueueReason::LowUrgency,
        },
        GateLevel::Balanced | GateLevel::Light => GateDecision::Allow,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    Disarmed,
    Armed {
        level: GateLevel,
        since: DateTime<Utc>,
    },
}

/// An interruption held by the gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedInterruption {
    pub event: InterruptionEvent,
    pub reason: QueueReason,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateStats {
    pub allowed: u32,
    pub queued: u32,
    pub released: u32,
    pub distractions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistractionGate {
    state: GateState,
    config: GateConfig,
    classifier: UrgencyClassifier,
    queue: Vec<QueuedInterruption>,
    monitor: InactivityMonitor,
    stats: GateStats,
}

impl Default for DistractionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DistractionGate {
    pub fn new() -> Self {
        let config = GateConfig::default();
        Self {
            state: GateState::Disarmed,
            classifier: UrgencyClassifier::default(),
            monitor: InactivityMonitor::new(config.inactivity_threshold_secs),
            config,
            queue: Vec::new(),
            stats: GateStats::default(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, GateState::Armed { .. })
    }

    pub fn level(&self) -> Option<GateLevel> {
        match self.state {
            GateState::Armed { level, .. } => Some(level),
            GateState::Disarmed => None,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn queued(&self) -> &[QueuedInterruption] {
        &self.queue
    }

    pub fn stats(&self) -> GateStats {
        self.stats
    }

    pub fn classify(&self, event: &InterruptionEvent) -> Urgency {
        self.classifier.classify(event)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm the gate and both monitors.
    pub fn start_blocking(&mut self, config: GateConfig, now: DateTime<Utc>) {
        self.classifier = UrgencyClassifier::new(
            &config.emergency_contacts,
            &config.priority_contacts,
            &config.urgent_keywords,
        );
        self.monitor = InactivityMonitor::new(config.inactivity_threshold_secs);
        self.monitor.arm(now);
        self.state = GateState::Armed {
            level: config.level,
            since: now,
        };
        info!(level = %config.level, "distraction gate armed");
        self.config = config;
    }

    /// Classify, decide, and queue when needed.
    pub fn intercept(&mut self, mut event: InterruptionEvent, in_flow: bool) -> GateDecision {
        let urgency = self.classifier.classify(&event);
        event.urgency = Some(urgency);

        let decision = match self.state {
            GateState::Disarmed => GateDecision::Allow,
            GateState::Armed { level, .. } => {
                decide(level, urgency, self.config.is_blocked(&event), in_flow)
            }
        };
        debug!(
            source = %event.source,
            urgency = %urgency,
            in_flow,
            ?decision,
            "interruption intercepted"
        );

        match decision {
            GateDecision::Allow => self.stats.allowed += 1,
            GateDecision::Queue { reason } => {
                self.stats.queued += 1;
                self.queue.push(QueuedInterruption { event, reason });
            }
        }
        decision
    }

    /// Disarm and hand back every queued interruption, oldest first.
    pub fn stop_blocking(&mut self) -> Vec<InterruptionEvent> {
        if self.is_armed() {
            info!(queued = self.queue.len(), "distraction gate disarmed");
        }
        self.state = GateState::Disarmed;
        self.monitor.disarm();
        let released: Vec<InterruptionEvent> =
            self.queue.drain(..).map(|queued| queued.event).collect();
        self.stats.released += released.len() as u32;
        released
    }

    /// Escape hatch: disarm and flush immediately.
    pub fn emergency_override(&mut self) -> Vec<InterruptionEvent> {
        info!("emergency override");
        self.stop_blocking()
    }

    // ── Monitors ─────────────────────────────────────────────────────

    pub fn note_activity(&mut self, now: DateTime<Utc>) {
        self.monitor.note_activity(now);
    }

    pub fn note_visibility(&mut self, hidden: bool, now: DateTime<Utc>) -> Option<DistractionSignal> {
        let signal = self.monitor.note_visibility(hidden, now);
        if signal.is_some() {
            self.stats.distractions += 1;
        }
        signal
    }

    pub fn check_inactivity(&mut self, now: DateTime<Utc>) -> Option<DistractionSignal> {
        let signal = self.monitor.check(now);
        if signal.is_some() {
            self.stats.distractions += 1;
        }
        signal
    }

    /// Resume watching after a pause without flagging the pause itself.
    pub fn skip_inactivity_to(&mut self, now: DateTime<Utc>) {
        self.monitor.skip_to(now);
    }
}
