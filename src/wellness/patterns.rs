//! Longer-horizon pattern detectors over persisted prediction aggregates.
//!
//! Unlike the rule engine these are not cooldown-gated; they run each
//! classification cycle and their hits are persisted for later review.

use crate::appctx::AppContext;
use crate::classifier::StressLevel;
use crate::storage::PredictionAggregate;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// App categories that imply sustained screen focus.
pub const VISUAL_CATEGORIES: &[&str] = &["browser", "development", "design"];

/// Minimum predictions in the lookback hour before eye strain is considered.
const EYE_STRAIN_MIN_SAMPLES: u32 = 4;

/// A detected hour-long window of likely eye strain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EyeStrainPattern {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_secs: u32,
    pub avg_typing_speed: f64,
    pub avg_mouse_randomness: f64,
    pub likely_eye_strain: bool,
}

/// Kind of ergonomic problem inferred from recent behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErgonomicKind {
    RepetitiveStrain,
    Posture,
}

impl ErgonomicKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErgonomicKind::RepetitiveStrain => "repetitive_strain",
            ErgonomicKind::Posture => "posture",
        }
    }
}

/// A detected ergonomic issue with a severity of 1-5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErgonomicIssue {
    pub kind: ErgonomicKind,
    pub severity: u8,
    pub suggestion: String,
}

/// Flag an hour of likely eye strain: enough readings, a visually intensive
/// app in focus, erratic mouse movement, and high stress all at once.
pub fn detect_eye_strain(
    aggregate: &PredictionAggregate,
    app: &AppContext,
    level: StressLevel,
    now: DateTime<Utc>,
) -> Option<EyeStrainPattern> {
    if aggregate.count < EYE_STRAIN_MIN_SAMPLES {
        return None;
    }

    let visually_intensive = VISUAL_CATEGORIES.contains(&app.category.as_str());
    let likely = visually_intensive
        && level >= StressLevel::High
        && aggregate.avg_mouse_randomness > 0.3;

    if !likely {
        return None;
    }

    Some(EyeStrainPattern {
        start: now - Duration::hours(1),
        end: now,
        duration_secs: 3600,
        avg_typing_speed: aggregate.avg_typing_speed,
        avg_mouse_randomness: aggregate.avg_mouse_randomness,
        likely_eye_strain: true,
    })
}

/// Scan the last half hour of aggregates for ergonomic problems.
pub fn detect_ergonomic_issues(
    aggregate: &PredictionAggregate,
    level: StressLevel,
) -> Vec<ErgonomicIssue> {
    let mut issues = Vec::new();

    // Sustained rapid clicking under stress suggests RSI risk
    if aggregate.avg_click_frequency > 20.0 && level >= StressLevel::High {
        let severity = ((aggregate.avg_click_frequency / 5.0) as u8).min(5);
        issues.push(ErgonomicIssue {
            kind: ErgonomicKind::RepetitiveStrain,
            severity,
            suggestion: "Consider using keyboard shortcuts more often. Take 1-minute hand \
                         stretches every 20 minutes."
                .to_string(),
        });
    }

    // Erratic mouse movement under moderate stress suggests poor posture
    if aggregate.avg_mouse_randomness > 0.4 && level >= StressLevel::Moderate {
        issues.push(ErgonomicIssue {
            kind: ErgonomicKind::Posture,
            severity: 3,
            suggestion: "Check your sitting posture: feet flat, back supported, elbows at 90 \
                         degrees."
                .to_string(),
        });
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn aggregate(
        count: u32,
        avg_typing_speed: f64,
        avg_mouse_randomness: f64,
        avg_click_frequency: f64,
    ) -> PredictionAggregate {
        PredictionAggregate {
            count,
            avg_typing_speed,
            avg_mouse_randomness,
            avg_click_frequency,
        }
    }

    fn browser() -> AppContext {
        AppContext::new("chrome", "Google Chrome", "browser")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn eye_strain_fires_when_all_conditions_hold() {
        let agg = aggregate(6, 80.0, 0.45, 5.0);
        let pattern = detect_eye_strain(&agg, &browser(), StressLevel::High, now())
            .expect("pattern");

        assert!(pattern.likely_eye_strain);
        assert_eq!(pattern.duration_secs, 3600);
        assert_eq!(pattern.end - pattern.start, Duration::hours(1));
        assert!((pattern.avg_mouse_randomness - 0.45).abs() < 1e-9);
    }

    #[test]
    fn eye_strain_needs_enough_samples() {
        let agg = aggregate(3, 80.0, 0.45, 5.0);
        assert!(detect_eye_strain(&agg, &browser(), StressLevel::Extreme, now()).is_none());
    }

    #[test]
    fn eye_strain_skips_non_visual_apps() {
        let app = AppContext::new("slack", "Slack", "communication");
        let agg = aggregate(6, 80.0, 0.45, 5.0);
        assert!(detect_eye_strain(&agg, &app, StressLevel::Extreme, now()).is_none());
    }

    #[test]
    fn eye_strain_needs_high_stress_and_erratic_mouse() {
        let calm_agg = aggregate(6, 80.0, 0.45, 5.0);
        assert!(detect_eye_strain(&calm_agg, &browser(), StressLevel::Moderate, now()).is_none());

        let steady_agg = aggregate(6, 80.0, 0.2, 5.0);
        assert!(detect_eye_strain(&steady_agg, &browser(), StressLevel::High, now()).is_none());
    }

    #[test]
    fn repetitive_strain_severity_scales_with_click_rate() {
        let agg = aggregate(6, 80.0, 0.1, 22.0);
        let issues = detect_ergonomic_issues(&agg, StressLevel::High);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, ErgonomicKind::RepetitiveStrain);
        assert_eq!(issues[0].severity, 4);

        // Severity is capped at 5
        let agg = aggregate(6, 80.0, 0.1, 60.0);
        let issues = detect_ergonomic_issues(&agg, StressLevel::High);
        assert_eq!(issues[0].severity, 5);
    }

    #[test]
    fn posture_issue_fires_at_moderate_stress() {
        let agg = aggregate(6, 80.0, 0.5, 5.0);
        let issues = detect_ergonomic_issues(&agg, StressLevel::Moderate);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, ErgonomicKind::Posture);
        assert_eq!(issues[0].severity, 3);
    }

    #[test]
    fn both_issues_can_fire_in_one_scan() {
        let agg = aggregate(6, 80.0, 0.5, 30.0);
        let issues = detect_ergonomic_issues(&agg, StressLevel::Extreme);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn calm_behavior_raises_no_issues() {
        let agg = aggregate(6, 60.0, 0.1, 2.0);
        assert!(detect_ergonomic_issues(&agg, StressLevel::Calm).is_empty());
    }
}
