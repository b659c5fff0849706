//! Core analysis pipeline of the stress monitor.
//!
//! This module contains:
//! - Baseline calibration at the start of a session
//! - Window collection at a fixed sampling rate
//! - Feature extraction from a window
//! - Stress classification (tree ensemble or rules)

pub mod baseline;
pub mod classifier;
pub mod ensemble;
pub mod features;
pub mod windowing;

// Re-export commonly used types
pub use baseline::{BaselineCalibrator, BaselineRecord, BaselineSource, CalibrationConfig};
pub use classifier::{
    ClassifierMode, Prediction, PredictionMode, PredictionStats, Predictor, RuleBasedModel,
    RuleParams, StressClassifier, StressLabel,
};
pub use ensemble::EnsembleModel;
pub use features::{extract_features, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use windowing::{DataWindow, WindowCollector, WindowSample};
