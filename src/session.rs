//! Per-connection session coordination.
//!
//! Each WebSocket connection gets one [`SessionCoordinator`] task that owns
//! the session's buffers and recommendation state. The task multiplexes
//! inbound events with a one-second cadence tick that drives app re-checks,
//! classification cycles, and heartbeats. A failure in any one session never
//! affects another.

use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::appctx::{AppContext, AppContextProvider};
use crate::classifier::{Prediction, StressClassifier};
use crate::core::buffer::{EventBuffer, DEFAULT_WINDOW_SIZE};
use crate::core::features::{extract, FeatureVector};
use crate::events::{ClientEvent, ServerMessage, SessionStats};
use crate::storage::Storage;
use crate::wellness::{EvalContext, RecommendationEngine};
use crate::wellness::patterns::{detect_ergonomic_issues, detect_eye_strain};

/// Timing knobs for the session loop.
#[derive(Debug, Clone, Copy)]
pub struct CadenceConfig {
    pub prediction_interval_secs: i64,
    pub app_check_interval_secs: i64,
    pub heartbeat_interval_secs: i64,
    /// Minimum buffered key events before a classification cycle runs
    pub min_key_events: usize,
    /// Events per kind considered by one extraction
    pub window_size: usize,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            prediction_interval_secs: 30,
            app_check_interval_secs: 5,
            heartbeat_interval_secs: 10,
            min_key_events: 10,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

/// State and collaborators for one tracking session.
pub struct SessionCoordinator {
    id: Uuid,
    start_time: DateTime<Utc>,
    key_buffer: EventBuffer<crate::events::KeyEvent>,
    mouse_buffer: EventBuffer<crate::events::MouseEvent>,
    total_key_events: u64,
    total_mouse_events: u64,
    last_prediction: DateTime<Utc>,
    last_app_check: Option<DateTime<Utc>>,
    last_heartbeat: DateTime<Utc>,
    current_app: Option<AppContext>,
    current_app_since: Option<DateTime<Utc>>,
    engine: RecommendationEngine,
    classifier: Arc<StressClassifier>,
    storage: Storage,
    provider: Arc<dyn AppContextProvider>,
    outbound: mpsc::Sender<ServerMessage>,
    cadence: CadenceConfig,
}

impl SessionCoordinator {
    pub fn new(
        classifier: Arc<StressClassifier>,
        storage: Storage,
        provider: Arc<dyn AppContextProvider>,
        cadence: CadenceConfig,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            start_time: now,
            key_buffer: EventBuffer::new(cadence.window_size),
            mouse_buffer: EventBuffer::new(cadence.window_size),
            total_key_events: 0,
            total_mouse_events: 0,
            last_prediction: now,
            last_app_check: None,
            last_heartbeat: now,
            current_app: None,
            current_app_since: None,
            engine: RecommendationEngine::new(),
            classifier,
            storage,
            provider,
            outbound,
            cadence,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drive the session until the event channel closes, then finalize.
    pub async fn run(mut self, mut events: mpsc::Receiver<ClientEvent>) {
        tracing::info!(session_id = %self.id, "session started");

        self.send(ServerMessage::ConnectionEstablished {
            session_id: self.id,
            message: "Stress tracking session started".to_string(),
            timestamp: self.start_time,
        })
        .await;

        let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => self.ingest(event),
                    None => break,
                },
                _ = tick.tick() => self.on_tick().await,
            }
        }

        self.finalize().await;
    }

    fn ingest(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Keyboard(key_event) => {
                self.total_key_events += 1;
                self.key_buffer.push(key_event.clone());

                let storage = self.storage.clone();
                let session_id = self.id;
                tokio::spawn(async move {
                    if let Err(e) = storage.append_key_event(session_id, &key_event).await {
                        tracing::warn!(session_id = %session_id, "failed to persist key event: {e}");
                    }
                });
            }
            ClientEvent::Mouse(mouse_event) => {
                self.total_mouse_events += 1;
                self.mouse_buffer.push(mouse_event.clone());

                let storage = self.storage.clone();
                let session_id = self.id;
                tokio::spawn(async move {
                    if let Err(e) = storage.append_mouse_event(session_id, &mouse_event).await {
                        tracing::warn!(session_id = %session_id, "failed to persist mouse event: {e}");
                    }
                });
            }
            ClientEvent::WellnessFeedback(feedback) => {
                let storage = self.storage.clone();
                let session_id = self.id;
                tokio::spawn(async move {
                    if let Err(e) = storage.record_feedback(&feedback).await {
                        tracing::warn!(session_id = %session_id, "failed to record feedback: {e}");
                    }
                });
            }
        }
    }

    async fn on_tick(&mut self) {
        let now = Utc::now();

        let app_check_due = match self.last_app_check {
            None => true,
            Some(last) => (now - last).num_seconds() >= self.cadence.app_check_interval_secs,
        };
        if app_check_due {
            self.check_app(now).await;
        }

        let prediction_due = (now - self.last_prediction).num_seconds()
            >= self.cadence.prediction_interval_secs
            && self.key_buffer.len() >= self.cadence.min_key_events;
        if prediction_due {
            self.run_classification(now).await;
        }

        if (now - self.last_heartbeat).num_seconds() >= self.cadence.heartbeat_interval_secs {
            self.last_heartbeat = now;
            self.send(ServerMessage::Heartbeat {
                session_stats: self.stats(now),
                timestamp: now,
            })
            .await;
        }
    }

    async fn check_app(&mut self, now: DateTime<Utc>) {
        self.last_app_check = Some(now);

        let probed = self.provider.current_context();
        if self.current_app.as_ref() == Some(&probed) {
            return;
        }

        // Close out the segment for the app being left
        if let (Some(previous), Some(since)) =
            (self.current_app.take(), self.current_app_since.take())
        {
            self.persist_app_usage(previous, since, now);
        }

        tracing::debug!(session_id = %self.id, app = %probed.app_id, "app context changed");
        self.current_app = Some(probed.clone());
        self.current_app_since = Some(now);
        self.send(ServerMessage::AppUpdate {
            current_app: probed,
            timestamp: now,
        })
        .await;
    }

    async fn run_classification(&mut self, now: DateTime<Utc>) {
        // Cadence advances on failed cycles too, so a broken model does not
        // retry every second
        self.last_prediction = now;

        let keys = self.key_buffer.snapshot(self.cadence.window_size);
        let mice = self.mouse_buffer.snapshot(self.cadence.window_size);
        let features = extract(&keys, &mice);

        let prediction = match self.classifier.predict(&features) {
            Ok(prediction) => prediction,
            Err(e) => {
                tracing::warn!(session_id = %self.id, "classification failed: {e}");
                self.send(ServerMessage::error(format!("classification failed: {e}")))
                    .await;
                return;
            }
        };

        // Awaited so the detector reads below already see this cycle's row;
        // the worker thread applies commands in arrival order
        self.persist_prediction(now, &features, &prediction).await;

        let app = self
            .current_app
            .clone()
            .unwrap_or_else(AppContext::unknown);
        let local_hour = chrono::Local::now().hour();

        let recommendations = self.engine.evaluate(&EvalContext {
            level: prediction.level,
            confidence: prediction.confidence,
            app: &app,
            now,
            local_hour,
        });

        for recommendation in &recommendations {
            let storage = self.storage.clone();
            let session_id = self.id;
            let level_index = prediction.level.index() as u8;
            let app_id = app.app_id.clone();
            let record = recommendation.clone();
            tokio::spawn(async move {
                if let Err(e) = storage
                    .append_recommendation(session_id, now, level_index, &app_id, &record)
                    .await
                {
                    tracing::warn!(session_id = %session_id, "failed to persist recommendation: {e}");
                }
            });
        }

        self.run_detectors(now, &app, &prediction).await;

        self.send(ServerMessage::Prediction {
            prediction: (&prediction).into(),
            features,
            session_id: self.id,
            timestamp: now,
        })
        .await;

        if !recommendations.is_empty() {
            self.send(ServerMessage::WellnessRecommendations {
                recommendations,
                timestamp: now,
            })
            .await;
        }
    }

    async fn run_detectors(
        &self,
        now: DateTime<Utc>,
        app: &AppContext,
        prediction: &Prediction,
    ) {
        match self
            .storage
            .read_predictions_since(self.id, now - Duration::hours(1))
            .await
        {
            Ok(aggregate) => {
                if let Some(pattern) = detect_eye_strain(&aggregate, app, prediction.level, now) {
                    let storage = self.storage.clone();
                    let session_id = self.id;
                    tokio::spawn(async move {
                        if let Err(e) =
                            storage.append_eye_strain_pattern(session_id, &pattern).await
                        {
                            tracing::warn!(session_id = %session_id, "failed to persist eye strain pattern: {e}");
                        }
                    });
                }
            }
            Err(e) => tracing::warn!(session_id = %self.id, "failed to read hourly aggregate: {e}"),
        }

        match self
            .storage
            .read_predictions_since(self.id, now - Duration::minutes(30))
            .await
        {
            Ok(aggregate) => {
                for issue in detect_ergonomic_issues(&aggregate, prediction.level) {
                    let storage = self.storage.clone();
                    let session_id = self.id;
                    tokio::spawn(async move {
                        if let Err(e) = storage.append_ergonomic_issue(session_id, now, &issue).await
                        {
                            tracing::warn!(session_id = %session_id, "failed to persist ergonomic issue: {e}");
                        }
                    });
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, "failed to read half-hour aggregate: {e}")
            }
        }
    }

    async fn persist_prediction(
        &self,
        now: DateTime<Utc>,
        features: &FeatureVector,
        prediction: &Prediction,
    ) {
        if let Err(e) = self
            .storage
            .append_prediction(
                self.id,
                now,
                features,
                prediction.level.display_name(),
                prediction.confidence,
            )
            .await
        {
            tracing::warn!(session_id = %self.id, "failed to persist prediction: {e}");
        }
    }

    fn persist_app_usage(&self, app: AppContext, start: DateTime<Utc>, end: DateTime<Utc>) {
        let storage = self.storage.clone();
        let session_id = self.id;
        tokio::spawn(async move {
            if let Err(e) = storage.append_app_usage(session_id, &app, start, end).await {
                tracing::warn!(session_id = %session_id, "failed to persist app usage segment: {e}");
            }
        });
    }

    async fn finalize(self) {
        let now = Utc::now();

        // The segment for the app still in focus ends with the session
        if let (Some(app), Some(since)) = (self.current_app.clone(), self.current_app_since) {
            if let Err(e) = self.storage.append_app_usage(self.id, &app, since, now).await {
                tracing::warn!(session_id = %self.id, "failed to persist app usage segment: {e}");
            }
        }

        let presses = self
            .key_buffer
            .snapshot(self.cadence.window_size)
            .iter()
            .filter(|e| e.key_pressed.is_some())
            .count();

        if presses >= 2 {
            let keys = self.key_buffer.snapshot(self.cadence.window_size);
            let mice = self.mouse_buffer.snapshot(self.cadence.window_size);
            let features = extract(&keys, &mice);

            match self.classifier.predict(&features) {
                Ok(prediction) => {
                    self.persist_prediction(now, &features, &prediction).await;
                    if let Err(e) = self
                        .storage
                        .append_session_summary(
                            self.id,
                            self.start_time,
                            now,
                            prediction.level.display_name(),
                            prediction.confidence,
                        )
                        .await
                    {
                        tracing::warn!(session_id = %self.id, "failed to persist session summary: {e}");
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.id, "final classification failed: {e}")
                }
            }
        }

        tracing::info!(
            session_id = %self.id,
            duration_secs = (now - self.start_time).num_seconds(),
            key_events = self.total_key_events,
            mouse_events = self.total_mouse_events,
            "session ended"
        );
    }

    fn stats(&self, now: DateTime<Utc>) -> SessionStats {
        SessionStats {
            key_events: self.total_key_events,
            mouse_events: self.total_mouse_events,
            session_duration_secs: (now - self.start_time).num_seconds(),
        }
    }

    async fn send(&self, message: ServerMessage) {
        // A send failure means the transport side is gone; the loop will
        // observe the closed event channel and wind down
        if self.outbound.send(message).await.is_err() {
            tracing::debug!(session_id = %self.id, "outbound channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cadence_matches_service_constants() {
        let cadence = CadenceConfig::default();
        assert_eq!(cadence.prediction_interval_secs, 30);
        assert_eq!(cadence.app_check_interval_secs, 5);
        assert_eq!(cadence.heartbeat_interval_secs, 10);
        assert_eq!(cadence.min_key_events, 10);
        assert_eq!(cadence.window_size, DEFAULT_WINDOW_SIZE);
    }
}
