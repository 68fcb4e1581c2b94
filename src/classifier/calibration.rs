//! Synthetic calibration corpus for bootstrapping the classifier.
//!
//! When no trained model artifact exists, the classifier is fitted on a
//! deterministic corpus of labeled feature vectors. Each stress level draws
//! its six features from level-specific normal distributions whose means and
//! spreads grow with the level, so stronger signals map to higher inferred
//! stress.

use crate::classifier::forest::{NUM_CLASSES, NUM_FEATURES};
use crate::classifier::ClassifierError;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Normal;

/// Fixed seed so regeneration always produces the same corpus.
pub const CALIBRATION_SEED: u64 = 42;

/// Labeled samples generated per stress level.
pub const SAMPLES_PER_LEVEL: usize = 200;

/// One labeled calibration sample.
#[derive(Debug, Clone)]
pub struct CalibrationSample {
    pub features: [f64; NUM_FEATURES],
    pub level: usize,
}

/// Class-conditional (mean, std dev) per feature, indexed by stress level.
///
/// Feature order: typing_speed, key_press_variance, mouse_randomness,
/// click_frequency, backspace_ratio, mouse_speed_variance. Means are
/// monotonically non-decreasing across levels.
const LEVEL_FEATURE_PARAMS: [[(f64, f64); NUM_FEATURES]; NUM_CLASSES] = [
    // Calm
    [
        (60.0, 10.0),
        (0.05, 0.01),
        (0.1, 0.02),
        (2.0, 0.5),
        (0.02, 0.005),
        (5.0, 1.0),
    ],
    // Mild
    [
        (70.0, 15.0),
        (0.08, 0.02),
        (0.15, 0.03),
        (3.0, 0.8),
        (0.05, 0.01),
        (8.0, 2.0),
    ],
    // Moderate
    [
        (85.0, 20.0),
        (0.12, 0.03),
        (0.25, 0.05),
        (5.0, 1.2),
        (0.1, 0.02),
        (15.0, 3.0),
    ],
    // High
    [
        (95.0, 25.0),
        (0.2, 0.05),
        (0.4, 0.08),
        (8.0, 2.0),
        (0.2, 0.05),
        (25.0, 5.0),
    ],
    // Extreme
    [
        (110.0, 30.0),
        (0.3, 0.08),
        (0.6, 0.12),
        (12.0, 3.0),
        (0.3, 0.08),
        (40.0, 8.0),
    ],
];

/// The configured generator mean for one (level, feature) pair.
pub fn generator_mean(level: usize, feature: usize) -> f64 {
    LEVEL_FEATURE_PARAMS[level][feature].0
}

/// Generate the deterministic labeled corpus, grouped by level.
pub fn generate_corpus() -> Result<Vec<CalibrationSample>, ClassifierError> {
    let mut rng = StdRng::seed_from_u64(CALIBRATION_SEED);
    let mut corpus = Vec::with_capacity(NUM_CLASSES * SAMPLES_PER_LEVEL);

    for (level, params) in LEVEL_FEATURE_PARAMS.iter().enumerate() {
        let mut distributions = Vec::with_capacity(NUM_FEATURES);
        for &(mean, std_dev) in params {
            let normal = Normal::new(mean, std_dev)
                .map_err(|e| ClassifierError::Calibration(e.to_string()))?;
            distributions.push(normal);
        }

        for _ in 0..SAMPLES_PER_LEVEL {
            let mut features = [0.0; NUM_FEATURES];
            for (value, normal) in features.iter_mut().zip(distributions.iter()) {
                *value = normal.sample(&mut rng);
            }
            corpus.push(CalibrationSample { features, level });
        }
    }

    Ok(corpus)
}
