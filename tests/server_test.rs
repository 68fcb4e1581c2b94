//! Integration tests for the stresswatch HTTP server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stresswatch::classifier::{ForestParams, StressClassifier};
use stresswatch::server::{run, ServerConfig};
use stresswatch::{AppContext, CadenceConfig, FixedAppProvider, Storage};

fn test_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("stresswatch-server-test-{}.db", uuid::Uuid::new_v4()))
}

fn test_params() -> ForestParams {
    ForestParams {
        n_trees: 5,
        max_depth: 6,
        min_samples_split: 8,
        features_per_split: 3,
    }
}

async fn start_test_server() -> (
    std::net::SocketAddr,
    tokio::sync::oneshot::Sender<()>,
    Storage,
) {
    let classifier =
        Arc::new(StressClassifier::train(test_params()).expect("Failed to train classifier"));
    let storage = Storage::open(test_db_path()).expect("Failed to open storage");
    let provider = Arc::new(FixedAppProvider::new(AppContext::new(
        "chrome",
        "Google Chrome",
        "browser",
    )));

    let config = ServerConfig {
        port: 0,
        cadence: CadenceConfig::default(),
    };

    let (addr, shutdown_tx) = run(config, classifier, storage.clone(), provider)
        .await
        .expect("Failed to start server");
    (addr, shutdown_tx, storage)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, shutdown_tx, _storage) = start_test_server().await;

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert!(body["version"].as_str().is_some());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_ws_track_requires_upgrade() {
    let (addr, shutdown_tx, _storage) = start_test_server().await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    // A plain GET without the upgrade handshake is rejected
    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/ws/track", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_client_error());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_cors_headers() {
    let (addr, shutdown_tx, _storage) = start_test_server().await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .request(reqwest::Method::OPTIONS, format!("http://{}/health", addr))
        .header("Origin", "http://localhost")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await
        .expect("Failed to send request");

    assert!(
        response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
        "CORS preflight failed: {}",
        response.status()
    );

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_history_endpoint() {
    let (addr, shutdown_tx, storage) = start_test_server().await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let older = uuid::Uuid::new_v4();
    let newer = uuid::Uuid::new_v4();
    let now = chrono::Utc::now();
    storage
        .append_session_summary(
            older,
            now - chrono::Duration::hours(2),
            now - chrono::Duration::hours(1),
            "Calm",
            0.9,
        )
        .await
        .expect("Failed to seed session");
    storage
        .append_session_summary(
            newer,
            now - chrono::Duration::minutes(5),
            now,
            "High Stress",
            0.8,
        )
        .await
        .expect("Failed to seed session");

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/api/history?limit=10", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let sessions = body.as_array().expect("expected a JSON array");
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["session_id"], newer.to_string());
    assert_eq!(sessions[0]["stress_level"], "High Stress");
    assert_eq!(sessions[1]["session_id"], older.to_string());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_wellness_recommendations_endpoint() {
    let (addr, shutdown_tx, storage) = start_test_server().await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let session_id = uuid::Uuid::new_v4();
    let recommendation = stresswatch::Recommendation {
        kind: "hydration".to_string(),
        title: "Hydration Check".to_string(),
        message: "Time for a glass of water".to_string(),
        actions: vec!["Drink water".to_string()],
        duration: 30,
        urgency: stresswatch::wellness::Urgency::Medium,
    };

    storage
        .append_recommendation(session_id, chrono::Utc::now(), 2, "chrome", &recommendation)
        .await
        .expect("Failed to seed recommendation");
    let accepted_id = storage
        .append_recommendation(session_id, chrono::Utc::now(), 2, "chrome", &recommendation)
        .await
        .expect("Failed to seed recommendation");
    storage
        .record_feedback(&stresswatch::events::FeedbackEvent {
            recommendation_id: accepted_id,
            accepted: true,
            completed: false,
            effectiveness: 0,
        })
        .await
        .expect("Failed to record feedback");

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/api/wellness/recommendations", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    // Accepted rows are excluded, so only the pending one comes back
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let recommendations = body.as_array().expect("expected a JSON array");
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0]["type"], "hydration");
    assert_eq!(recommendations[0]["duration"], 30);

    let _ = shutdown_tx.send(());
}
