//! Wire types for the client protocol.
//!
//! Inbound events arrive as tagged JSON objects over the WebSocket transport
//! and are validated here before entering the core pipeline. Outbound
//! messages mirror the same tagged style.

use crate::appctx::AppContext;
use crate::classifier::Prediction;
use crate::core::features::FeatureVector;
use crate::wellness::Recommendation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single keyboard interaction. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEvent {
    /// When the event occurred; stamped by the server if the client omits it.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Key name when this event is a press, e.g. "a" or "Backspace"
    pub key_pressed: Option<String>,
    /// Key name when this event is a release
    pub key_released: Option<String>,
    /// How long the key was held, in seconds
    pub press_duration: Option<f64>,
}

/// A single mouse interaction. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MouseEvent {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    /// Cursor speed reported by the client, in pixels per second
    pub movement_speed: Option<f64>,
    /// "left", "right", etc. when this event is a click
    pub click_type: Option<String>,
    pub scroll_delta: Option<i32>,
}

/// Client feedback on a previously delivered recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub recommendation_id: i64,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub completed: bool,
    /// Self-reported effectiveness, 0-5
    #[serde(default)]
    pub effectiveness: i32,
}

/// All inbound event kinds, validated at the transport boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Keyboard(KeyEvent),
    Mouse(MouseEvent),
    WellnessFeedback(FeedbackEvent),
}

/// Rejection reason for a malformed inbound event.
#[derive(Debug)]
pub enum EventError {
    InvalidJson(String),
    InvalidField(&'static str),
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventError::InvalidJson(e) => write!(f, "invalid JSON: {e}"),
            EventError::InvalidField(field) => write!(f, "invalid field: {field}"),
        }
    }
}

impl std::error::Error for EventError {}

impl ClientEvent {
    /// Parse and validate a raw text frame.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let event: ClientEvent =
            serde_json::from_str(text).map_err(|e| EventError::InvalidJson(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<(), EventError> {
        match self {
            ClientEvent::Keyboard(e) => {
                if let Some(d) = e.press_duration {
                    if !d.is_finite() || d < 0.0 {
                        return Err(EventError::InvalidField("press_duration"));
                    }
                }
                if e.key_pressed.is_none() && e.key_released.is_none() {
                    return Err(EventError::InvalidField("key_pressed"));
                }
            }
            ClientEvent::Mouse(e) => {
                if !e.x.is_finite() || !e.y.is_finite() {
                    return Err(EventError::InvalidField("x"));
                }
                if let Some(s) = e.movement_speed {
                    if !s.is_finite() || s < 0.0 {
                        return Err(EventError::InvalidField("movement_speed"));
                    }
                }
            }
            ClientEvent::WellnessFeedback(e) => {
                if !(0..=5).contains(&e.effectiveness) {
                    return Err(EventError::InvalidField("effectiveness"));
                }
            }
        }
        Ok(())
    }
}

/// Prediction payload pushed to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionPayload {
    /// Display name, e.g. "High Stress"
    pub stress_level: String,
    /// Ordinal index 0-4
    pub level_index: u8,
    /// Probability of the predicted level, 0-1
    pub confidence: f64,
    /// Full distribution keyed by level display name
    pub probabilities: BTreeMap<String, f64>,
}

impl From<&Prediction> for PredictionPayload {
    fn from(prediction: &Prediction) -> Self {
        Self {
            stress_level: prediction.level.display_name().to_string(),
            level_index: prediction.level.index() as u8,
            confidence: prediction.confidence,
            probabilities: prediction
                .probabilities
                .iter()
                .map(|(level, p)| (level.display_name().to_string(), *p))
                .collect(),
        }
    }
}

/// Per-session counters carried by heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub key_events: u64,
    pub mouse_events: u64,
    pub session_duration_secs: i64,
}

/// All outbound message kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        session_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Prediction {
        prediction: PredictionPayload,
        features: FeatureVector,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    AppUpdate {
        current_app: AppContext,
        timestamp: DateTime<Utc>,
    },
    WellnessRecommendations {
        recommendations: Vec<Recommendation>,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        session_stats: SessionStats,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keyboard_event() {
        let event =
            ClientEvent::parse(r#"{"type":"keyboard","key_pressed":"a","press_duration":0.08}"#)
                .expect("valid event");
        match event {
            ClientEvent::Keyboard(e) => {
                assert_eq!(e.key_pressed.as_deref(), Some("a"));
                assert_eq!(e.press_duration, Some(0.08));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parses_mouse_event() {
        let event = ClientEvent::parse(
            r#"{"type":"mouse","x":100.0,"y":200.0,"click_type":"left"}"#,
        )
        .expect("valid event");
        match event {
            ClientEvent::Mouse(e) => {
                assert_eq!(e.x, 100.0);
                assert_eq!(e.click_type.as_deref(), Some("left"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(ClientEvent::parse(r#"{"type":"telemetry"}"#).is_err());
    }

    #[test]
    fn rejects_mouse_event_without_coordinates() {
        assert!(ClientEvent::parse(r#"{"type":"mouse","click_type":"left"}"#).is_err());
    }

    #[test]
    fn rejects_negative_press_duration() {
        let result =
            ClientEvent::parse(r#"{"type":"keyboard","key_pressed":"a","press_duration":-1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn server_message_serializes_with_type_tag() {
        let json = serde_json::to_value(ServerMessage::error("bad event")).expect("serialize");
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "bad event");
    }
}
