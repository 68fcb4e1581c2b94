//! Behavioral feature extraction from event windows.
//!
//! Six numeric signals are derived from a snapshot of the session's keyboard
//! and mouse buffers. Every function tolerates degenerate input: windows below
//! the minimum size yield 0.0 for the corresponding feature, never an error.

use crate::events::{KeyEvent, MouseEvent};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Feature names in the fixed order the classifier consumes them.
pub const FEATURE_NAMES: [&str; 6] = [
    "typing_speed",
    "key_press_variance",
    "mouse_randomness",
    "click_frequency",
    "backspace_ratio",
    "mouse_speed_variance",
];

/// The 6-dimensional numeric summary of recent interaction behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Words per minute, 5-characters-per-word heuristic
    pub typing_speed: f64,
    /// Population variance of key hold durations
    pub key_press_variance: f64,
    /// Variance of direction changes between successive cursor displacements
    pub mouse_randomness: f64,
    /// Clicks per minute
    pub click_frequency: f64,
    /// Share of key presses that are Backspace or Delete
    pub backspace_ratio: f64,
    /// Population variance of reported cursor speeds
    pub mouse_speed_variance: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order.
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.typing_speed,
            self.key_press_variance,
            self.mouse_randomness,
            self.click_frequency,
            self.backspace_ratio,
            self.mouse_speed_variance,
        ]
    }
}

/// Derive all six features from window snapshots.
pub fn extract(key_events: &[KeyEvent], mouse_events: &[MouseEvent]) -> FeatureVector {
    FeatureVector {
        typing_speed: typing_speed(key_events),
        key_press_variance: key_press_variance(key_events),
        mouse_randomness: mouse_randomness(mouse_events),
        click_frequency: click_frequency(mouse_events),
        backspace_ratio: backspace_ratio(key_events),
        mouse_speed_variance: mouse_speed_variance(mouse_events),
    }
}

/// Words per minute over the key-press events in the window.
pub fn typing_speed(key_events: &[KeyEvent]) -> f64 {
    let presses: Vec<&KeyEvent> = key_events
        .iter()
        .filter(|e| e.key_pressed.is_some())
        .collect();

    if presses.len() < 2 {
        return 0.0;
    }

    let elapsed = (presses[presses.len() - 1].timestamp - presses[0].timestamp)
        .num_milliseconds() as f64
        / 1000.0;
    if elapsed <= 0.0 {
        return 0.0;
    }

    // Characters per minute, 5 characters per word
    (presses.len() as f64 / elapsed) * 60.0 / 5.0
}

/// Population variance of positive key hold durations.
pub fn key_press_variance(key_events: &[KeyEvent]) -> f64 {
    let durations: Vec<f64> = key_events
        .iter()
        .filter_map(|e| e.press_duration)
        .filter(|&d| d > 0.0)
        .collect();

    if durations.len() < 2 {
        return 0.0;
    }

    durations.iter().population_variance()
}

/// Variance of the angles between consecutive cursor displacement vectors.
///
/// Higher variance means more erratic movement. Straight-line movement yields
/// identical angles and therefore 0.
pub fn mouse_randomness(mouse_events: &[MouseEvent]) -> f64 {
    if mouse_events.len() < 3 {
        return 0.0;
    }

    let movements: Vec<(f64, f64)> = mouse_events
        .windows(2)
        .map(|pair| (pair[1].x - pair[0].x, pair[1].y - pair[0].y))
        .collect();

    let mut angle_changes = Vec::new();
    for pair in movements.windows(2) {
        let (x1, y1) = pair[0];
        let (x2, y2) = pair[1];

        let norm1 = (x1 * x1 + y1 * y1).sqrt();
        let norm2 = (x2 * x2 + y2 * y2).sqrt();
        if norm1 * norm2 == 0.0 {
            continue;
        }

        // Clamp to avoid acos domain errors from rounding
        let cos_angle = ((x1 * x2 + y1 * y2) / (norm1 * norm2)).clamp(-1.0, 1.0);
        angle_changes.push(cos_angle.acos());
    }

    if angle_changes.is_empty() {
        return 0.0;
    }

    angle_changes.iter().population_variance()
}

/// Clicks per minute over the span of the mouse window.
pub fn click_frequency(mouse_events: &[MouseEvent]) -> f64 {
    let clicks = mouse_events
        .iter()
        .filter(|e| e.click_type.is_some())
        .count();

    if clicks < 2 {
        return 0.0;
    }

    let elapsed = (mouse_events[mouse_events.len() - 1].timestamp - mouse_events[0].timestamp)
        .num_milliseconds() as f64
        / 1000.0;
    if elapsed <= 0.0 {
        return 0.0;
    }

    (clicks as f64 / elapsed) * 60.0
}

/// Share of key presses that are corrections (Backspace or Delete).
pub fn backspace_ratio(key_events: &[KeyEvent]) -> f64 {
    let mut presses = 0usize;
    let mut corrections = 0usize;

    for event in key_events {
        if let Some(key) = &event.key_pressed {
            presses += 1;
            if key == "Backspace" || key == "Delete" {
                corrections += 1;
            }
        }
    }

    if presses == 0 {
        return 0.0;
    }

    corrections as f64 / presses as f64
}

/// Population variance of positive reported cursor speeds.
pub fn mouse_speed_variance(mouse_events: &[MouseEvent]) -> f64 {
    let speeds: Vec<f64> = mouse_events
        .iter()
        .filter_map(|e| e.movement_speed)
        .filter(|&s| s > 0.0)
        .collect();

    if speeds.len() < 2 {
        return 0.0;
    }

    speeds.iter().population_variance()
}
