//! Tokio host for a [`SessionController`].
//!
//! One task owns the controller and applies commands from an mpsc mailbox
//! one at a time, interleaved with the tick interval. The controller's tick
//! decides when flow evaluation is due. Events are fanned out on a
//! broadcast channel.

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::info;

use super::controller::SessionController;
use super::model::{EndData, EndReason, EndStats, EnvConfig, Session};
use crate::error::{CoreError, Result};
use crate::events::SessionEvent;
use crate::flow::{ActivitySignal, FlowSnapshot};
use crate::gate::{GateDecision, InterruptionEvent};
use crate::ports::SessionId;
use crate::task::TaskCandidate;

const MAILBOX_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// Interval length for the runtime's tick.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeTiming {
    pub tick: Duration,
}

impl Default for RuntimeTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
        }
    }
}

impl RuntimeTiming {
    pub fn from_secs(tick_secs: u64) -> Self {
        Self {
            tick: Duration::from_secs(tick_secs.max(1)),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Start {
        tasks: Vec<TaskCandidate>,
        env: EnvConfig,
        reply: Reply<SessionId>,
    },
    Pause(Reply<()>),
    Resume(Reply<()>),
    Complete(Reply<Option<TaskCandidate>>),
    Skip(Reply<Option<TaskCandidate>>),
    End {
        reason: EndReason,
        data: EndData,
        reply: Reply<EndStats>,
    },
    Activity {
        signal: ActivitySignal,
        reply: Reply<()>,
    },
    Interrupt {
        event: InterruptionEvent,
        reply: oneshot::Sender<GateDecision>,
    },
    Override(Reply<Vec<InterruptionEvent>>),
    EvaluateFlow(Reply<FlowSnapshot>),
    Restore {
        user_id: String,
        reply: Reply<Option<SessionId>>,
    },
    Snapshot(oneshot::Sender<Option<Session>>),
    Checkpoint(Reply<()>),
}

pub struct SessionRuntime;

impl SessionRuntime {
    /// Spawn the actor onto the current tokio runtime.
    pub fn spawn(controller: SessionController, timing: RuntimeTiming) -> SessionHandle {
        let (commands, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        tokio::spawn(run(controller, mailbox, events.clone(), timing));
        SessionHandle { commands, events }
    }
}

async fn run(
    mut controller: SessionController,
    mut mailbox: mpsc::Receiver<Command>,
    events: broadcast::Sender<SessionEvent>,
    timing: RuntimeTiming,
) {
    let mut ticker = time::interval(timing.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let live = controller.status().is_live();
        tokio::select! {
            command = mailbox.recv() => {
                let Some(command) = command else {
                    info!("session handles dropped, runtime stopping");
                    break;
                };
                apply(&mut controller, command);
            }
            _ = ticker.tick(), if live => {
                controller.tick(Utc::now());
            }
        }

        for event in controller.drain_events() {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }
}

fn apply(controller: &mut SessionController, command: Command) {
    let now = Utc::now();
    // A dropped reply receiver means the caller gave up waiting.
    match command {
        Command::Start { tasks, env, reply } => {
            let _ = reply.send(controller.start(tasks, env, now));
        }
        Command::Pause(reply) => {
            let _ = reply.send(controller.pause(now));
        }
        Command::Resume(reply) => {
            let _ = reply.send(controller.resume(now));
        }
        Command::Complete(reply) => {
            let _ = reply.send(controller.complete_current_task(now));
        }
        Command::Skip(reply) => {
            let _ = reply.send(controller.skip_current_task(now));
        }
        Command::End { reason, data, reply } => {
            let _ = reply.send(controller.end(reason, data, now));
        }
        Command::Activity { signal, reply } => {
            let _ = reply.send(controller.record_activity(signal, now));
        }
        Command::Interrupt { event, reply } => {
            let _ = reply.send(controller.handle_interruption(event, now));
        }
        Command::Override(reply) => {
            let _ = reply.send(controller.emergency_override(now));
        }
        Command::EvaluateFlow(reply) => {
            let _ = reply.send(controller.evaluate_flow(now));
        }
        Command::Restore { user_id, reply } => {
            let _ = reply.send(controller.restore(&user_id, now));
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(controller.session().cloned());
        }
        Command::Checkpoint(reply) => {
            let _ = reply.send(controller.checkpoint());
        }
    }
}

/// Cloneable host-facing API of a running [`SessionRuntime`].
///
/// Hosts register for interruptions by forwarding them to
/// [`SessionHandle::interrupt`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| CoreError::RuntimeStopped)?;
        response.await.map_err(|_| CoreError::RuntimeStopped)?
    }

    pub async fn start(&self, tasks: Vec<TaskCandidate>, env: EnvConfig) -> Result<SessionId> {
        self.call(|reply| Command::Start { tasks, env, reply }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.call(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.call(Command::Resume).await
    }

    pub async fn complete_current_task(&self) -> Result<Option<TaskCandidate>> {
        self.call(Command::Complete).await
    }

    pub async fn skip_current_task(&self) -> Result<Option<TaskCandidate>> {
        self.call(Command::Skip).await
    }

    pub async fn end(&self, reason: EndReason, data: EndData) -> Result<EndStats> {
        self.call(|reply| Command::End {
            reason,
            data,
            reply,
        })
        .await
    }

    pub async fn record_activity(&self, signal: ActivitySignal) -> Result<()> {
        self.call(|reply| Command::Activity { signal, reply }).await
    }

    pub async fn interrupt(&self, event: InterruptionEvent) -> Result<GateDecision> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Interrupt { event, reply })
            .await
            .map_err(|_| CoreError::RuntimeStopped)?;
        response.await.map_err(|_| CoreError::RuntimeStopped)
    }

    pub async fn emergency_override(&self) -> Result<Vec<InterruptionEvent>> {
        self.call(Command::Override).await
    }

    pub async fn evaluate_flow(&self) -> Result<FlowSnapshot> {
        self.call(Command::EvaluateFlow).await
    }

    pub async fn restore(&self, user_id: impl Into<String>) -> Result<Option<SessionId>> {
        let user_id = user_id.into();
        self.call(|reply| Command::Restore { user_id, reply }).await
    }

    /// Write the durable snapshot now.
    pub async fn checkpoint(&self) -> Result<()> {
        self.call(Command::Checkpoint).await
    }

    /// Current session, if any.
    pub async fn session(&self) -> Result<Option<Session>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(reply))
            .await
            .map_err(|_| CoreError::RuntimeStopped)?;
        response.await.map_err(|_| CoreError::RuntimeStopped)
    }
}
