//! Integration tests for the session coordinator, driven directly through
//! its channels with a shortened cadence.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stresswatch::classifier::{ForestParams, StressClassifier};
use stresswatch::events::{ClientEvent, KeyEvent, MouseEvent, ServerMessage};
use stresswatch::{AppContext, CadenceConfig, FixedAppProvider, SessionCoordinator, Storage};
use tokio::sync::mpsc;

fn test_db_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "stresswatch-session-test-{}.db",
        uuid::Uuid::new_v4()
    ))
}

fn test_classifier() -> Arc<StressClassifier> {
    let params = ForestParams {
        n_trees: 5,
        max_depth: 6,
        min_samples_split: 8,
        features_per_split: 3,
    };
    Arc::new(StressClassifier::train(params).expect("Failed to train classifier"))
}

fn fast_cadence() -> CadenceConfig {
    CadenceConfig {
        prediction_interval_secs: 0,
        app_check_interval_secs: 0,
        heartbeat_interval_secs: 1,
        min_key_events: 3,
        window_size: 100,
    }
}

fn key_event(key: &str, offset_ms: i64) -> ClientEvent {
    ClientEvent::Keyboard(KeyEvent {
        timestamp: Utc::now() + chrono::Duration::milliseconds(offset_ms),
        key_pressed: Some(key.to_string()),
        key_released: None,
        press_duration: Some(0.08 + (offset_ms % 7) as f64 * 0.01),
    })
}

fn mouse_event(x: f64, y: f64, offset_ms: i64) -> ClientEvent {
    ClientEvent::Mouse(MouseEvent {
        timestamp: Utc::now() + chrono::Duration::milliseconds(offset_ms),
        x,
        y,
        movement_speed: Some(120.0),
        click_type: None,
        scroll_delta: None,
    })
}

struct TestSession {
    session_id: uuid::Uuid,
    event_tx: mpsc::Sender<ClientEvent>,
    outbound_rx: mpsc::Receiver<ServerMessage>,
    task: tokio::task::JoinHandle<()>,
    storage: Storage,
}

fn start_session() -> TestSession {
    let storage = Storage::open(test_db_path()).expect("Failed to open storage");
    let provider = Arc::new(FixedAppProvider::new(AppContext::new(
        "chrome",
        "Google Chrome",
        "browser",
    )));

    let (event_tx, event_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);

    let coordinator = SessionCoordinator::new(
        test_classifier(),
        storage.clone(),
        provider,
        fast_cadence(),
        outbound_tx,
    );
    let session_id = coordinator.id();
    let task = tokio::spawn(coordinator.run(event_rx));

    TestSession {
        session_id,
        event_tx,
        outbound_rx,
        task,
        storage,
    }
}

fn drain(outbound_rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = outbound_rx.try_recv() {
        messages.push(message);
    }
    messages
}

#[tokio::test]
async fn session_emits_connection_established_first() {
    let mut session = start_session();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let messages = drain(&mut session.outbound_rx);

    assert!(!messages.is_empty());
    match &messages[0] {
        ServerMessage::ConnectionEstablished { session_id, .. } => {
            assert_eq!(*session_id, session.session_id);
        }
        other => panic!("expected connection_established first, got {other:?}"),
    }

    drop(session.event_tx);
    let _ = session.task.await;
}

#[tokio::test]
async fn buffered_events_produce_a_prediction_cycle() {
    let mut session = start_session();

    for i in 0..12 {
        session
            .event_tx
            .send(key_event("a", i * 100))
            .await
            .expect("send");
    }
    for i in 0..6 {
        session
            .event_tx
            .send(mouse_event(10.0 * i as f64, 5.0 * i as f64, i * 100))
            .await
            .expect("send");
    }

    // Two cadence ticks at the shortened interval
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let messages = drain(&mut session.outbound_rx);

    let prediction = messages.iter().find_map(|m| match m {
        ServerMessage::Prediction {
            prediction,
            session_id,
            ..
        } => Some((prediction, *session_id)),
        _ => None,
    });
    let (prediction, session_id) = prediction.expect("no prediction message emitted");
    assert_eq!(session_id, session.session_id);
    assert!((0.0..=1.0).contains(&prediction.confidence));
    assert!(prediction.level_index <= 4);

    let app_update = messages.iter().any(|m| {
        matches!(m, ServerMessage::AppUpdate { current_app, .. } if current_app.app_id == "chrome")
    });
    assert!(app_update, "expected an app_update message");

    let heartbeat = messages.iter().find_map(|m| match m {
        ServerMessage::Heartbeat { session_stats, .. } => Some(session_stats),
        _ => None,
    });
    let stats = heartbeat.expect("expected a heartbeat message");
    assert_eq!(stats.key_events, 12);
    assert_eq!(stats.mouse_events, 6);

    drop(session.event_tx);
    let _ = session.task.await;
}

#[tokio::test]
async fn predictions_are_persisted() {
    let session = start_session();
    let session_id = session.session_id;

    for i in 0..10 {
        session
            .event_tx
            .send(key_event("b", i * 100))
            .await
            .expect("send");
    }

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let aggregate = session
        .storage
        .read_predictions_since(session_id, Utc::now() - chrono::Duration::hours(1))
        .await
        .expect("aggregate");
    assert!(aggregate.count >= 1, "no predictions persisted");

    drop(session.event_tx);
    let _ = session.task.await;
}

#[tokio::test]
async fn prediction_row_is_readable_when_the_message_arrives() {
    let mut session = start_session();

    for i in 0..10 {
        session
            .event_tx
            .send(key_event("d", i * 100))
            .await
            .expect("send");
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match session.outbound_rx.recv().await {
                Some(ServerMessage::Prediction { .. }) => break,
                Some(_) => continue,
                None => panic!("session closed before a prediction was emitted"),
            }
        }
    })
    .await
    .expect("no prediction within deadline");

    // The insert is enqueued ahead of the message, so the row is already
    // visible the moment the client hears about the prediction
    let aggregate = session
        .storage
        .read_predictions_since(session.session_id, Utc::now() - chrono::Duration::hours(1))
        .await
        .expect("aggregate");
    assert!(
        aggregate.count >= 1,
        "prediction message emitted before its row was persisted"
    );

    drop(session.event_tx);
    let _ = session.task.await;
}

#[tokio::test]
async fn disconnect_persists_app_usage_segment() {
    let session = start_session();
    let session_id = session.session_id;

    // Let the app check register the active app, then disconnect
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(session.event_tx);
    session.task.await.expect("session task");

    let segment: Option<(String, i64)> = session
        .storage
        .execute(move |conn| {
            use rusqlite::OptionalExtension;
            conn.query_row(
                "SELECT app_id, duration_secs FROM app_usage WHERE session_id = ?1",
                rusqlite::params![session_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(Into::into)
        })
        .await
        .expect("query");

    let (app_id, duration) = segment.expect("app usage segment not persisted");
    assert_eq!(app_id, "chrome");
    assert!(duration >= 0);
}

#[tokio::test]
async fn disconnect_finalizes_session_summary() {
    let session = start_session();
    let session_id = session.session_id;

    for i in 0..5 {
        session
            .event_tx
            .send(key_event("c", i * 100))
            .await
            .expect("send");
    }

    // Let the events be ingested, then disconnect
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(session.event_tx);
    session.task.await.expect("session task");

    let summary: Option<(String, i64)> = session
        .storage
        .execute(move |conn| {
            use rusqlite::OptionalExtension;
            conn.query_row(
                "SELECT stress_level, duration_secs FROM sessions WHERE session_id = ?1",
                rusqlite::params![session_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(Into::into)
        })
        .await
        .expect("query");

    let (level, duration) = summary.expect("session summary not persisted");
    assert!(!level.is_empty());
    assert!(duration >= 0);
}

#[tokio::test]
async fn feedback_events_update_recommendations() {
    let session = start_session();
    let session_id = session.session_id;

    // Seed a recommendation row directly, then deliver feedback for it
    let recommendation = stresswatch::Recommendation {
        kind: "movement".to_string(),
        title: "Movement Break".to_string(),
        message: "Time to move".to_string(),
        actions: vec!["Stretch".to_string()],
        duration: 90,
        urgency: stresswatch::wellness::Urgency::Medium,
    };
    let recommendation_id = session
        .storage
        .append_recommendation(session_id, Utc::now(), 1, "chrome", &recommendation)
        .await
        .expect("append");

    session
        .event_tx
        .send(ClientEvent::WellnessFeedback(
            stresswatch::events::FeedbackEvent {
                recommendation_id,
                accepted: true,
                completed: false,
                effectiveness: 3,
            },
        ))
        .await
        .expect("send");

    tokio::time::sleep(Duration::from_millis(300)).await;

    let accepted: bool = session
        .storage
        .execute(move |conn| {
            conn.query_row(
                "SELECT accepted FROM wellness_recommendations WHERE recommendation_id = ?1",
                rusqlite::params![recommendation_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
        })
        .await
        .expect("query");
    assert!(accepted);

    drop(session.event_tx);
    let _ = session.task.await;
}
