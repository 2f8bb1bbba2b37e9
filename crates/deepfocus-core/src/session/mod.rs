//! Focus session lifecycle.
//!
//! - [`SessionController`]: the synchronous state machine
//! - [`SessionRuntime`] / [`SessionHandle`]: a tokio actor around it

mod breaks;
mod controller;
mod model;
mod runtime;

pub use breaks::BreakTracker;
pub use controller::{SessionController, SessionState};
pub use model::{
    EndData, EndReason, EndStats, EnvConfig, FlowEpisode, FlowState, Session, SessionStatus,
    SessionType,
};
pub use runtime::{RuntimeTiming, SessionHandle, SessionRuntime};
