//! Focus session commands.
//!
//! Each invocation restores the live session from the database, applies one
//! operation, prints the result with the events it produced, and writes the
//! snapshot back.

use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use deepfocus_core::session::RuntimeTiming;
use deepfocus_core::storage::Database;
use deepfocus_core::{
    ActivitySignal, Config, EndData, EndReason, GateLevel, HeadlessSurface, InterruptionEvent,
    InterruptionSource, SessionController, SessionEvent, SessionRuntime, SessionType, TaskFilter,
    TaskRanker, TaskStore,
};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::rank::ranking_context;
use super::{print_json, split_list, CliResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum ActivityKind {
    Keystroke,
    Pointer,
    Switch,
    Hidden,
    Visible,
}

impl ActivityKind {
    fn signal(self) -> ActivitySignal {
        match self {
            ActivityKind::Keystroke => ActivitySignal::keystroke(),
            ActivityKind::Pointer => ActivitySignal::pointer(),
            ActivityKind::Switch => ActivitySignal::TaskSwitch,
            ActivityKind::Hidden => ActivitySignal::Visibility { hidden: true },
            ActivityKind::Visible => ActivitySignal::Visibility { hidden: false },
        }
    }
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a session
    Start {
        /// Session type: deep_work, regular, light, or creative
        #[arg(long = "type")]
        session_type: Option<SessionType>,
        /// Planned minutes
        #[arg(long)]
        minutes: Option<u32>,
        /// Gate level override: strict, balanced, or light
        #[arg(long)]
        level: Option<GateLevel>,
        /// Comma-separated task IDs (default: ranked selection of open tasks)
        #[arg(long)]
        tasks: Option<String>,
        /// Current energy, 1-10, for the ranked selection
        #[arg(long)]
        energy: Option<u8>,
    },
    /// Pause the session
    Pause,
    /// Resume a paused session
    Resume,
    /// Complete the current task
    Complete,
    /// Skip the current task
    Skip,
    /// End the session
    End {
        /// user_ended, all_tasks_completed, or aborted
        #[arg(long, default_value = "user_ended")]
        reason: EndReason,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Self-rated focus, 1-5
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,
    },
    /// Print the current session as JSON
    Status,
    /// Pass an interruption through the gate
    Interrupt {
        /// mail, chat, call, system_notification, social, calendar, or other
        #[arg(long, default_value = "other")]
        source: InterruptionSource,
        /// Sender
        #[arg(long, default_value = "")]
        sender: String,
        /// Message content
        content: String,
    },
    /// Report user activity
    Activity {
        #[arg(value_enum)]
        kind: ActivityKind,
    },
    /// Run the session clock and stream events as JSON lines
    Watch {
        /// Seconds to watch before exiting
        #[arg(long, default_value = "60")]
        secs: u64,
    },
    /// Restore the live session after a restart
    Restore,
    /// Release every queued interruption
    Override,
}

pub fn run(action: SessionAction) -> CliResult {
    let config = Config::load_or_default();
    let db = Database::open()?;
    let now = Utc::now();

    let mut controller = SessionController::with_database(db.clone(), HeadlessSurface::new());
    let restored = controller.restore_with(&config.session.user_id, now, |session_type| {
        config.env_config(session_type)
    })?;
    controller.tick(now);

    let result: Value = match action {
        SessionAction::Start {
            session_type,
            minutes,
            level,
            tasks,
            energy,
        } => {
            let session_type = session_type.unwrap_or(config.session.default_type);
            let mut env = config.env_config(session_type);
            if let Some(minutes) = minutes {
                env = env.with_planned_minutes(minutes);
            }
            if let Some(level) = level {
                env = env.with_gate_level(level);
            }

            let candidates = match tasks {
                Some(ids) => split_list(&ids)
                    .iter()
                    .map(|id| db.get_task(id))
                    .collect::<Result<Vec<_>, _>>()?,
                None => {
                    let context = ranking_context(
                        &db,
                        &config,
                        Some(env.planned_minutes),
                        energy,
                        session_type,
                    )?;
                    let open = db.list_candidates(&TaskFilter::open())?;
                    TaskRanker::new(config.ranker.clone())
                        .plan(&open, &context)
                        .tasks
                        .into_iter()
                        .map(|ranked| ranked.task)
                        .collect()
                }
            };
            let session_id = controller.start(candidates, env, now)?;
            json!({ "session_id": session_id })
        }
        SessionAction::Pause => {
            controller.pause(now)?;
            Value::Null
        }
        SessionAction::Resume => {
            controller.resume(now)?;
            Value::Null
        }
        SessionAction::Complete => json!({ "next_task": controller.complete_current_task(now)? }),
        SessionAction::Skip => json!({ "next_task": controller.skip_current_task(now)? }),
        SessionAction::End {
            reason,
            notes,
            rating,
        } => {
            let data = EndData {
                notes,
                focus_rating: rating,
            };
            serde_json::to_value(controller.end(reason, data, now)?)?
        }
        SessionAction::Status => json!({
            "latest_flow": controller.latest_flow(),
            "queued": controller.queued_interruptions(),
        }),
        SessionAction::Interrupt {
            source,
            sender,
            content,
        } => {
            let event = InterruptionEvent::new(source, sender, content, now);
            serde_json::to_value(controller.handle_interruption(event, now))?
        }
        SessionAction::Activity { kind } => {
            controller.record_activity(kind.signal(), now)?;
            Value::Null
        }
        SessionAction::Restore => json!({ "restored": restored }),
        SessionAction::Override => json!({ "released": controller.emergency_override(now)? }),
        SessionAction::Watch { secs } => {
            let timing = config.runtime_timing();
            let runtime = tokio::runtime::Runtime::new()?;
            return runtime.block_on(watch(controller, timing, secs));
        }
    };

    let events = controller.drain_events();
    print_json(&json!({
        "result": result,
        "status": controller.status(),
        "session": controller.session(),
        "events": events,
    }))?;
    controller.checkpoint()?;
    Ok(())
}

async fn watch(mut controller: SessionController, timing: RuntimeTiming, secs: u64) -> CliResult {
    for event in controller.drain_events() {
        println!("{}", serde_json::to_string(&event)?);
    }
    if !controller.status().is_live() {
        println!("{}", json!({ "status": controller.status() }));
        return Ok(());
    }

    let handle = SessionRuntime::spawn(controller, timing);
    let mut events = handle.subscribe();
    let deadline = tokio::time::sleep(std::time::Duration::from_secs(secs));
    tokio::pin!(deadline);
    info!(secs, "watching session");

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            received = events.recv() => match received {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if matches!(event, SessionEvent::SessionEnded { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.checkpoint().await?;
    Ok(())
}
