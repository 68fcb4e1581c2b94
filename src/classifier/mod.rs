//! Stress classification.
//!
//! The classifier maps a [`FeatureVector`] to one of five ordinal stress
//! levels with a calibrated probability distribution. On startup it loads a
//! persisted model artifact; if the artifact is missing or unusable it fits a
//! fresh ensemble on the synthetic calibration corpus and persists the result.
//! Once constructed the classifier is read-only and safe to share across
//! sessions.

pub mod calibration;
pub mod forest;

use crate::core::features::{FeatureVector, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

pub use forest::{ForestParams, StressForest, NUM_CLASSES, NUM_FEATURES};

/// Version of the persisted artifact layout.
pub const MODEL_SCHEMA_VERSION: u32 = 1;

/// Ordinal stress classes, Calm through Extreme.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StressLevel {
    Calm,
    Mild,
    Moderate,
    High,
    Extreme,
}

impl StressLevel {
    pub const ALL: [StressLevel; NUM_CLASSES] = [
        StressLevel::Calm,
        StressLevel::Mild,
        StressLevel::Moderate,
        StressLevel::High,
        StressLevel::Extreme,
    ];

    /// Ordinal index 0-4.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Display name used on the wire and in persisted records.
    pub fn display_name(self) -> &'static str {
        match self {
            StressLevel::Calm => "Calm",
            StressLevel::Mild => "Mild Stress",
            StressLevel::Moderate => "Moderate Stress",
            StressLevel::High => "High Stress",
            StressLevel::Extreme => "Extreme Stress",
        }
    }
}

/// Output of one inference call.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub level: StressLevel,
    /// Probability of the predicted level, 0-1
    pub confidence: f64,
    /// Full distribution over all levels; sums to 1
    pub probabilities: BTreeMap<StressLevel, f64>,
}

/// Per-feature standardization parameters fitted on the training corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    means: [f64; NUM_FEATURES],
    std_devs: [f64; NUM_FEATURES],
}

impl FeatureScaler {
    fn fit(samples: &[[f64; NUM_FEATURES]]) -> Self {
        let n = samples.len().max(1) as f64;
        let mut means = [0.0; NUM_FEATURES];
        for sample in samples {
            for (mean, value) in means.iter_mut().zip(sample.iter()) {
                *mean += value / n;
            }
        }

        let mut std_devs = [0.0; NUM_FEATURES];
        for sample in samples {
            for (i, value) in sample.iter().enumerate() {
                let d = value - means[i];
                std_devs[i] += d * d / n;
            }
        }
        for std_dev in &mut std_devs {
            *std_dev = std_dev.sqrt();
            // Constant features scale to zero offset instead of dividing by 0
            if *std_dev == 0.0 {
                *std_dev = 1.0;
            }
        }

        Self { means, std_devs }
    }

    fn transform(&self, x: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
        let mut scaled = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            scaled[i] = (x[i] - self.means[i]) / self.std_devs[i];
        }
        scaled
    }
}

/// Serialized model artifact: fitted ensemble plus scaling parameters and
/// the declared feature/label order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub feature_names: Vec<String>,
    pub level_names: Vec<String>,
    pub scaler: FeatureScaler,
    pub forest: StressForest,
}

/// Classifier lifecycle and inference errors.
#[derive(Debug)]
pub enum ClassifierError {
    /// Artifact could not be read or parsed
    Load(String),
    /// Artifact was written by an incompatible version
    SchemaMismatch { expected: u32, found: u32 },
    /// Artifact scaling parameters do not match the extractor's feature order
    FeatureMismatch(String),
    /// Synthetic corpus generation failed
    Calibration(String),
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::Load(e) => write!(f, "model load error: {e}"),
            ClassifierError::SchemaMismatch { expected, found } => {
                write!(f, "model schema mismatch: expected v{expected}, found v{found}")
            }
            ClassifierError::FeatureMismatch(e) => write!(f, "feature mismatch: {e}"),
            ClassifierError::Calibration(e) => write!(f, "calibration error: {e}"),
        }
    }
}

impl std::error::Error for ClassifierError {}

/// Opaque storage for the serialized model artifact.
pub trait ModelStore: Send + Sync {
    fn load(&self) -> Result<String, ModelStoreError>;
    fn save(&self, artifact_json: &str) -> Result<(), ModelStoreError>;
}

/// Model store errors.
#[derive(Debug)]
pub enum ModelStoreError {
    NotFound,
    Io(String),
}

impl std::fmt::Display for ModelStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelStoreError::NotFound => write!(f, "no model artifact found"),
            ModelStoreError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for ModelStoreError {}

/// File-backed model store.
pub struct FsModelStore {
    path: PathBuf,
}

impl FsModelStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ModelStore for FsModelStore {
    fn load(&self) -> Result<String, ModelStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ModelStoreError::NotFound),
            Err(e) => Err(ModelStoreError::Io(e.to_string())),
        }
    }

    fn save(&self, artifact_json: &str) -> Result<(), ModelStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ModelStoreError::Io(e.to_string()))?;
        }
        std::fs::write(&self.path, artifact_json).map_err(|e| ModelStoreError::Io(e.to_string()))
    }
}

/// In-memory model store for tests and ephemeral deployments.
pub struct MemoryModelStore {
    cell: Mutex<Option<String>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.cell.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemoryModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStore for MemoryModelStore {
    fn load(&self) -> Result<String, ModelStoreError> {
        self.lock().clone().ok_or(ModelStoreError::NotFound)
    }

    fn save(&self, artifact_json: &str) -> Result<(), ModelStoreError> {
        *self.lock() = Some(artifact_json.to_string());
        Ok(())
    }
}

/// Fitted stress classifier. Read-only after construction.
pub struct StressClassifier {
    feature_names: Vec<String>,
    level_names: Vec<String>,
    scaler: FeatureScaler,
    forest: StressForest,
}

impl StressClassifier {
    /// Load the persisted artifact, or fit a fresh model from the calibration
    /// corpus when the artifact is missing, corrupt, or incompatible.
    ///
    /// Only a failure in the calibration/fit path is fatal.
    pub fn load_or_train(store: &dyn ModelStore) -> Result<Self, ClassifierError> {
        match Self::load(store) {
            Ok(classifier) => {
                tracing::info!("loaded stress model artifact");
                Ok(classifier)
            }
            Err(e) => {
                tracing::warn!("could not load stress model ({e}); fitting from calibration corpus");
                let classifier = Self::train(ForestParams::default())?;
                match classifier.to_artifact_json() {
                    Ok(json) => {
                        if let Err(e) = store.save(&json) {
                            tracing::warn!("could not persist fitted model: {e}");
                        }
                    }
                    Err(e) => tracing::warn!("could not serialize fitted model: {e}"),
                }
                Ok(classifier)
            }
        }
    }

    fn load(store: &dyn ModelStore) -> Result<Self, ClassifierError> {
        let json = store.load().map_err(|e| ClassifierError::Load(e.to_string()))?;
        let artifact: ModelArtifact =
            serde_json::from_str(&json).map_err(|e| ClassifierError::Load(e.to_string()))?;
        Self::from_artifact(artifact)
    }

    /// Fit a classifier on the synthetic calibration corpus.
    pub fn train(params: ForestParams) -> Result<Self, ClassifierError> {
        let corpus = calibration::generate_corpus()?;

        let samples: Vec<[f64; NUM_FEATURES]> = corpus.iter().map(|s| s.features).collect();
        let labels: Vec<usize> = corpus.iter().map(|s| s.level).collect();

        let scaler = FeatureScaler::fit(&samples);
        let scaled: Vec<[f64; NUM_FEATURES]> =
            samples.iter().map(|s| scaler.transform(s)).collect();

        let forest = StressForest::fit(&scaled, &labels, params, calibration::CALIBRATION_SEED);

        Ok(Self {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            level_names: StressLevel::ALL
                .iter()
                .map(|l| l.display_name().to_string())
                .collect(),
            scaler,
            forest,
        })
    }

    fn from_artifact(artifact: ModelArtifact) -> Result<Self, ClassifierError> {
        if artifact.schema_version != MODEL_SCHEMA_VERSION {
            return Err(ClassifierError::SchemaMismatch {
                expected: MODEL_SCHEMA_VERSION,
                found: artifact.schema_version,
            });
        }
        if artifact.feature_names != FEATURE_NAMES {
            return Err(ClassifierError::FeatureMismatch(format!(
                "artifact features {:?} do not match extractor order {:?}",
                artifact.feature_names, FEATURE_NAMES
            )));
        }
        if artifact.level_names.len() != NUM_CLASSES {
            return Err(ClassifierError::FeatureMismatch(format!(
                "artifact declares {} levels, expected {NUM_CLASSES}",
                artifact.level_names.len()
            )));
        }

        Ok(Self {
            feature_names: artifact.feature_names,
            level_names: artifact.level_names,
            scaler: artifact.scaler,
            forest: artifact.forest,
        })
    }

    /// Serialize the fitted model for persistence.
    pub fn to_artifact_json(&self) -> Result<String, ClassifierError> {
        let artifact = ModelArtifact {
            schema_version: MODEL_SCHEMA_VERSION,
            feature_names: self.feature_names.clone(),
            level_names: self.level_names.clone(),
            scaler: self.scaler.clone(),
            forest: self.forest.clone(),
        };
        serde_json::to_string(&artifact).map_err(|e| ClassifierError::Load(e.to_string()))
    }

    /// Classify a feature vector.
    ///
    /// The scaling parameters are keyed by declared feature order; a vector
    /// produced by any other extractor layout is a contract violation and is
    /// rejected rather than silently zero-filled.
    pub fn predict(&self, features: &FeatureVector) -> Result<Prediction, ClassifierError> {
        if self.feature_names != FEATURE_NAMES {
            return Err(ClassifierError::FeatureMismatch(
                "classifier scaling parameters do not match extractor feature order".to_string(),
            ));
        }

        let scaled = self.scaler.transform(&features.as_array());
        let raw = self.forest.predict_proba(&scaled);

        let mut argmax = 0;
        for (i, &p) in raw.iter().enumerate() {
            if p > raw[argmax] {
                argmax = i;
            }
        }

        let level = StressLevel::ALL[argmax];
        let probabilities: BTreeMap<StressLevel, f64> = StressLevel::ALL
            .iter()
            .copied()
            .zip(raw.iter().copied())
            .collect();

        Ok(Prediction {
            level,
            confidence: raw[argmax],
            probabilities,
        })
    }
}
