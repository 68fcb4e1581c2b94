//! Wellness recommendation engine.
//!
//! Each classification cycle feeds the engine the latest stress level and app
//! context; the engine evaluates its rules and emits recommendations, with a
//! per-rule cooldown so the same nudge is never repeated too soon.

pub mod patterns;

use crate::appctx::AppContext;
use crate::classifier::StressLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The four recommendation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    MicroBreak,
    Hydration,
    EyeCare,
    Movement,
}

impl RuleKind {
    pub const ALL: [RuleKind; 4] = [
        RuleKind::MicroBreak,
        RuleKind::Hydration,
        RuleKind::EyeCare,
        RuleKind::Movement,
    ];

    /// Wire and storage identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::MicroBreak => "micro_break",
            RuleKind::Hydration => "hydration",
            RuleKind::EyeCare => "eye_care",
            RuleKind::Movement => "movement",
        }
    }

    /// Minimum minutes between two firings of the same rule.
    fn cooldown_minutes(self) -> i64 {
        match self {
            RuleKind::MicroBreak => 10,
            RuleKind::Hydration => 60,
            RuleKind::EyeCare => 30,
            RuleKind::Movement => 45,
        }
    }
}

/// How pressing a recommendation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// A concrete wellness nudge sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub actions: Vec<String>,
    /// Suggested activity duration in seconds
    pub duration: u32,
    pub urgency: Urgency,
}

/// Inputs for one evaluation pass.
pub struct EvalContext<'a> {
    pub level: StressLevel,
    pub confidence: f64,
    pub app: &'a AppContext,
    pub now: DateTime<Utc>,
    /// Hour of day in the server's local timezone, 0-23
    pub local_hour: u32,
}

/// Stateful rule evaluator. One instance per session, so cooldowns are scoped
/// to the session that receives the recommendations.
pub struct RecommendationEngine {
    last_fired: HashMap<RuleKind, DateTime<Utc>>,
}

impl RecommendationEngine {
    pub fn new() -> Self {
        Self {
            last_fired: HashMap::new(),
        }
    }

    /// Evaluate all rules against the current context. Rules still inside
    /// their cooldown window are skipped; fired rules have their cooldown
    /// reset to `ctx.now`.
    pub fn evaluate(&mut self, ctx: &EvalContext<'_>) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        for kind in RuleKind::ALL {
            if !self.off_cooldown(kind, ctx.now) {
                continue;
            }
            if let Some(recommendation) = build_if_triggered(kind, ctx) {
                self.last_fired.insert(kind, ctx.now);
                recommendations.push(recommendation);
            }
        }

        recommendations
    }

    fn off_cooldown(&self, kind: RuleKind, now: DateTime<Utc>) -> bool {
        match self.last_fired.get(&kind) {
            None => true,
            Some(last) => (now - *last).num_minutes() >= kind.cooldown_minutes(),
        }
    }
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn build_if_triggered(kind: RuleKind, ctx: &EvalContext<'_>) -> Option<Recommendation> {
    match kind {
        RuleKind::MicroBreak => {
            if ctx.level < StressLevel::High {
                return None;
            }
            Some(Recommendation {
                kind: kind.as_str().to_string(),
                title: "Stress Break Needed".to_string(),
                message: "You seem stressed. Take a 60-second break:".to_string(),
                actions: vec![
                    "Look away from screen for 20 seconds".to_string(),
                    "Do 3 deep breaths (inhale 4s, hold 4s, exhale 6s)".to_string(),
                    "Stand up and stretch your arms overhead".to_string(),
                ],
                duration: 60,
                urgency: Urgency::High,
            })
        }
        RuleKind::Hydration => {
            // Afternoon slump window
            if !(14..=16).contains(&ctx.local_hour) {
                return None;
            }
            Some(Recommendation {
                kind: kind.as_str().to_string(),
                title: "Hydration Reminder".to_string(),
                message: "Afternoon energy dip detected. Dehydration increases stress hormones."
                    .to_string(),
                actions: vec![
                    "Drink a glass of water".to_string(),
                    "Stand up while drinking".to_string(),
                ],
                duration: 30,
                urgency: Urgency::Medium,
            })
        }
        RuleKind::EyeCare => {
            if ctx.app.category != "browser" || ctx.level < StressLevel::Moderate {
                return None;
            }
            Some(Recommendation {
                kind: kind.as_str().to_string(),
                title: "Eye Strain Alert".to_string(),
                message: "Extended browser use detected. Follow the 20-20-20 rule:".to_string(),
                actions: vec![
                    "Look at something 20 feet away for 20 seconds".to_string(),
                    "Blink consciously 10 times".to_string(),
                    "Adjust screen brightness if needed".to_string(),
                ],
                duration: 40,
                urgency: Urgency::Medium,
            })
        }
        RuleKind::Movement => {
            // Fires on any cycle once the cooldown allows; acts as a periodic
            // prolonged-sitting reminder
            Some(Recommendation {
                kind: kind.as_str().to_string(),
                title: "Movement Break".to_string(),
                message: "You have been sitting for a while. Time to move:".to_string(),
                actions: vec![
                    "March in place for 30 seconds".to_string(),
                    "Do 5 shoulder rolls each direction".to_string(),
                    "Touch your toes (or reach toward them)".to_string(),
                ],
                duration: 90,
                urgency: Urgency::Medium,
            })
        }
    }
}
