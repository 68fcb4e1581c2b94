//! Core pipeline for stress detection.
//!
//! This module contains:
//! - Bounded event buffers holding each session's recent activity
//! - Feature extraction over buffer snapshots

pub mod buffer;
pub mod features;

// Re-export commonly used types
pub use buffer::{EventBuffer, DEFAULT_WINDOW_SIZE};
pub use features::{extract, FeatureVector, FEATURE_NAMES};
