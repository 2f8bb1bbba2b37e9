//! Distraction gate: urgency classification, interruption queueing, and
//! inactivity detection.

mod blocker;
mod classifier;
mod inactivity;

pub use blocker::{
    decide, DistractionGate, GateConfig, GateDecision, GateLevel, GateState, GateStats,
    QueueReason, QueuedInterruption,
};
pub use classifier::{InterruptionEvent, InterruptionSource, Urgency, UrgencyClassifier};
pub use inactivity::{DistractionSignal, InactivityMonitor};
