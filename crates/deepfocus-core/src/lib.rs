//! # Deepfocus Core Library
//!
//! This library provides the core logic for Deepfocus focus sessions. Like
//! the CLI built on it, hosts drive everything through the same API: the
//! binary is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Session Controller**: A wall-clock-based state machine that requires the
//!   caller to periodically invoke `tick()`; [`SessionRuntime`] does that on tokio
//! - **Flow Detector**: Seven weighted behavioral indicators scored per sample window
//! - **Task Ranker**: Multi-criteria scoring and time-budgeted task selection
//! - **Distraction Gate**: Urgency classification and interruption queueing
//! - **Storage**: SQLite-backed task/session storage and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`SessionController`]: Core session state machine
//! - [`FlowDetector`]: Flow scoring
//! - [`TaskRanker`]: Candidate ranking and selection
//! - [`DistractionGate`]: Interruption policy
//! - [`Database`]: Storage ports backed by SQLite
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod flow;
pub mod gate;
pub mod ports;
pub mod ranker;
pub mod session;
pub mod storage;
pub mod task;

pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use events::SessionEvent;
pub use flow::{ActivitySignal, BehaviorSample, FlowConfig, FlowDetector, FlowSnapshot};
pub use gate::{
    DistractionGate, GateConfig, GateDecision, GateLevel, InterruptionEvent, InterruptionSource,
    Urgency,
};
pub use ports::{
    HeadlessSurface, NotificationSurface, SessionPersistence, SnapshotStore, TaskStore,
};
pub use ranker::{RankedSelection, RankerConfig, RankingContext, TaskRanker};
pub use session::{
    EndData, EndReason, EndStats, EnvConfig, SessionController, SessionHandle, SessionRuntime,
    SessionStatus, SessionType,
};
pub use storage::{Config, Database};
pub use task::{Priority, TaskCandidate, TaskFilter, TaskStatus};
