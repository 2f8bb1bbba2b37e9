//! Session runtime actor tests on a real tokio runtime.

use std::time::Duration;

use deepfocus_core::session::{RuntimeTiming, SessionRuntime};
use deepfocus_core::storage::Database;
use deepfocus_core::{
    CoreError, EndData, EndReason, EnvConfig, HeadlessSurface, InterruptionEvent,
    InterruptionSource, SessionController, SessionEvent, SessionStatus, SessionType,
    TaskCandidate,
};
use tokio::sync::broadcast;
use tokio::time::timeout;

fn tasks(n: usize) -> Vec<TaskCandidate> {
    (0..n)
        .map(|i| TaskCandidate::new(format!("t{i}"), format!("Task {i}"), 15))
        .collect()
}

fn spawn() -> deepfocus_core::SessionHandle {
    let db = Database::open_memory().unwrap();
    let controller = SessionController::with_database(db, HeadlessSurface::new());
    SessionRuntime::spawn(controller, RuntimeTiming::from_secs(1))
}

async fn next_matching(
    events: &mut broadcast::Receiver<SessionEvent>,
    kind: &str,
) -> SessionEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.kind() == kind {
                return event;
            }
        }
    })
    .await
    .expect("event not received in time")
}

#[tokio::test]
async fn commands_apply_in_order_and_events_fan_out() {
    let handle = spawn();
    let mut events = handle.subscribe();

    let id = handle
        .start(tasks(2), EnvConfig::for_type(SessionType::DeepWork))
        .await
        .unwrap();
    let started = next_matching(&mut events, "SessionStarted").await;
    assert_eq!(started.session_id(), id);

    let chat = InterruptionEvent::new(InterruptionSource::Chat, "amy", "hi", chrono::Utc::now());
    assert!(!handle.interrupt(chat).await.unwrap().is_allowed());

    handle.pause().await.unwrap();
    let session = handle.session().await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Paused);
    assert!(handle.pause().await.unwrap_err().is_invalid_state());
    handle.resume().await.unwrap();

    let stats = handle
        .end(EndReason::UserEnded, EndData::default())
        .await
        .unwrap();
    assert_eq!(stats.interruptions_released, 1);
    next_matching(&mut events, "SessionEnded").await;

    let again = handle
        .end(EndReason::UserEnded, EndData::default())
        .await
        .unwrap();
    assert_eq!(again, stats);
}

#[tokio::test]
async fn auto_end_fires_from_the_tick() {
    let handle = spawn();
    let mut events = handle.subscribe();
    let mut env = EnvConfig::default();
    env.auto_end_grace_secs = 0;

    handle.start(tasks(1), env).await.unwrap();
    handle.complete_current_task().await.unwrap();
    next_matching(&mut events, "AllTasksCompleted").await;

    match next_matching(&mut events, "SessionEnded").await {
        SessionEvent::SessionEnded { reason, .. } => {
            assert_eq!(reason, EndReason::AllTasksCompleted)
        }
        other => panic!("unexpected event {other:?}"),
    }
    let session = handle.session().await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Ended);
}

#[tokio::test]
async fn dropped_runtime_reports_stopped() {
    let handle = spawn();
    let clone = handle.clone();
    drop(handle);
    // The clone keeps the mailbox alive.
    assert!(clone.session().await.unwrap().is_none());
    assert!(matches!(
        clone.evaluate_flow().await.unwrap_err(),
        CoreError::InvalidSessionState { .. }
    ));
}
