//! Stresswatch - real-time stress detection from interaction behavior.
//!
//! This library ingests raw keyboard and mouse events per WebSocket session,
//! derives behavioral features over a sliding window, classifies stress with
//! a bagged decision-tree ensemble, and emits cooldown-gated wellness
//! recommendations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Stresswatch                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌────────────┐             │
//! │  │  Server   │──▶│  Session  │──▶│  Features  │             │
//! │  │ (ws/track)│   │ (buffers) │   │ (extract)  │             │
//! │  └───────────┘   └───────────┘   └────────────┘             │
//! │        │               │                │                   │
//! │        ▼               ▼                ▼                   │
//! │  ┌───────────┐   ┌───────────┐   ┌────────────┐             │
//! │  │  Storage  │   │ Wellness  │◀──│ Classifier │             │
//! │  │ (sqlite)  │   │  (rules)  │   │  (forest)  │             │
//! │  └───────────┘   └───────────┘   └────────────┘             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use stresswatch::classifier::{MemoryModelStore, StressClassifier};
//! use stresswatch::core::extract;
//!
//! let store = MemoryModelStore::new();
//! let classifier = StressClassifier::load_or_train(&store).expect("model");
//!
//! let features = extract(&[], &[]);
//! let prediction = classifier.predict(&features).expect("prediction");
//! println!("{}", prediction.level.display_name());
//! ```

pub mod appctx;
pub mod classifier;
pub mod config;
pub mod core;
pub mod events;
pub mod server;
pub mod session;
pub mod storage;
pub mod wellness;

// Re-export key types at crate root for convenience
pub use appctx::{AppContext, AppContextProvider, FixedAppProvider, SimulatedAppProvider};
pub use classifier::{Prediction, StressClassifier, StressLevel};
pub use config::Config;
pub use core::{extract, EventBuffer, FeatureVector};
pub use events::{ClientEvent, ServerMessage};
pub use session::{CadenceConfig, SessionCoordinator};
pub use storage::Storage;
pub use wellness::{Recommendation, RecommendationEngine};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
