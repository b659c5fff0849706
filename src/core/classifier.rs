//! Stress classification.
//!
//! Two predictors share one contract: a pre-trained [`EnsembleModel`] and a
//! rule-based scorer over the GSR and HR means. The mode is chosen once at
//! startup; a model that fails to load leaves the classifier in rule-based
//! mode for the rest of the run.

use super::baseline::{BaselineRecord, BaselineSource};
use super::ensemble::EnsembleModel;
use super::features::FeatureVector;
use crate::transparency::SharedTelemetry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Binary stress label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLabel {
    Stress,
    NoStress,
}

impl StressLabel {
    /// Playlist category used for this label.
    pub fn category(self) -> &'static str {
        match self {
            StressLabel::Stress => "stress_relief",
            StressLabel::NoStress => "calming",
        }
    }
}

impl fmt::Display for StressLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StressLabel::Stress => write!(f, "stress"),
            StressLabel::NoStress => write!(f, "no_stress"),
        }
    }
}

/// Which predictor produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMode {
    RuleBased,
    Ensemble,
}

impl fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionMode::RuleBased => write!(f, "rule-based"),
            PredictionMode::Ensemble => write!(f, "ensemble"),
        }
    }
}

/// One classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: StressLabel,
    /// Always within [0, 1]
    pub confidence: f64,
    /// Combined rule score, when the rule-based predictor ran
    pub score: Option<f64>,
    pub mode: PredictionMode,
    pub timestamp: DateTime<Utc>,
}

/// Low/high pair for piecewise-linear scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// 0 at or below `low`, 1 at or above `high`, linear in between.
    pub fn score(&self, x: f64) -> f64 {
        if !x.is_finite() || x <= self.low {
            0.0
        } else if x >= self.high {
            1.0
        } else {
            (x - self.low) / (self.high - self.low)
        }
    }
}

/// Thresholds for one channel under each normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelRule {
    /// Raw mean, used without a usable baseline
    pub absolute: Thresholds,
    /// Mean minus baseline, used when the baseline spread is unknown
    pub delta: Thresholds,
    /// (mean - baseline) / spread
    pub zscore: Thresholds,
}

impl ChannelRule {
    /// Normalize `mean` against a baseline and score it.
    pub fn score(&self, mean: f64, baseline: Option<(f64, f64, BaselineSource)>) -> f64 {
        match baseline {
            None | Some((_, _, BaselineSource::Default)) => self.absolute.score(mean),
            Some((base, spread, _)) if spread > 0.0 => self.zscore.score((mean - base) / spread),
            Some((base, _, _)) => self.delta.score(mean - base),
        }
    }
}

/// Parameters of the rule-based predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleParams {
    pub gsr: ChannelRule,
    pub hr: ChannelRule,
    pub gsr_weight: f64,
    pub hr_weight: f64,
}

impl Default for RuleParams {
    fn default() -> Self {
        Self {
            gsr: ChannelRule {
                absolute: Thresholds::new(5.0, 25.0),
                delta: Thresholds::new(0.0, 10.0),
                zscore: Thresholds::new(0.0, 3.0),
            },
            hr: ChannelRule {
                absolute: Thresholds::new(60.0, 100.0),
                delta: Thresholds::new(0.0, 30.0),
                zscore: Thresholds::new(0.0, 3.0),
            },
            gsr_weight: 0.6,
            hr_weight: 0.4,
        }
    }
}

/// Map a combined score to a label and confidence.
pub fn score_band(score: f64) -> (StressLabel, f64) {
    if score <= 0.2 {
        (StressLabel::NoStress, 0.8)
    } else if score <= 0.4 {
        (StressLabel::NoStress, 0.7)
    } else if score <= 0.6 {
        (StressLabel::NoStress, 0.6)
    } else if score <= 0.8 {
        (StressLabel::Stress, 0.7)
    } else {
        (StressLabel::Stress, 0.8)
    }
}

/// Common contract of the two predictors.
pub trait Predictor {
    fn mode(&self) -> PredictionMode;

    fn predict(&self, features: &FeatureVector, baseline: Option<&BaselineRecord>) -> Prediction;
}

/// Rule-based predictor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RuleBasedModel {
    pub params: RuleParams,
}

impl RuleBasedModel {
    pub fn new(params: RuleParams) -> Self {
        Self { params }
    }

    /// Combined weighted score in [0, 1].
    pub fn score(&self, eda_mean: f64, hr_mean: f64, baseline: Option<&BaselineRecord>) -> f64 {
        let gsr_base = baseline.map(|b| (b.gsr_baseline, b.gsr_spread, b.source));
        let hr_base = baseline.map(|b| (b.hr_baseline, b.hr_spread, b.hr_source));

        let gsr = self.params.gsr.score(eda_mean, gsr_base);
        let hr = self.params.hr.score(hr_mean, hr_base);
        let weights = self.params.gsr_weight + self.params.hr_weight;
        let combined = if weights > 0.0 {
            (self.params.gsr_weight * gsr + self.params.hr_weight * hr) / weights
        } else {
            0.0
        };
        debug!(gsr, hr, combined, "Rule scores");
        combined.clamp(0.0, 1.0)
    }
}

impl Predictor for RuleBasedModel {
    fn mode(&self) -> PredictionMode {
        PredictionMode::RuleBased
    }

    fn predict(&self, features: &FeatureVector, baseline: Option<&BaselineRecord>) -> Prediction {
        let score = self.score(features.eda_mean(), features.hr_mean(), baseline);
        let (label, confidence) = score_band(score);
        Prediction {
            label,
            confidence,
            score: Some(score),
            mode: PredictionMode::RuleBased,
            timestamp: Utc::now(),
        }
    }
}

impl Predictor for EnsembleModel {
    fn mode(&self) -> PredictionMode {
        PredictionMode::Ensemble
    }

    fn predict(&self, features: &FeatureVector, _baseline: Option<&BaselineRecord>) -> Prediction {
        let vote = self.vote(features);
        debug!(
            stress_votes = vote.stress_votes,
            trees = vote.trees,
            "Ensemble vote"
        );
        Prediction {
            label: if vote.stress {
                StressLabel::Stress
            } else {
                StressLabel::NoStress
            },
            confidence: vote.confidence,
            score: None,
            mode: PredictionMode::Ensemble,
            timestamp: Utc::now(),
        }
    }
}

/// Predictor selected at startup.
#[derive(Debug, Clone)]
pub enum ClassifierMode {
    RuleBased(RuleParams),
    Ensemble(EnsembleModel),
}

impl ClassifierMode {
    /// Load the model at `path`, or fall back to rules.
    ///
    /// The second value is true when a model was requested but could not be
    /// used.
    pub fn load_or_rules(path: Option<&Path>, rules: RuleParams) -> (Self, bool) {
        let Some(path) = path else {
            return (ClassifierMode::RuleBased(rules), false);
        };
        match EnsembleModel::load(path) {
            Ok(model) => {
                info!(path = %path.display(), trees = model.trees.len(), "Ensemble model loaded");
                (ClassifierMode::Ensemble(model), false)
            }
            Err(e) => {
                warn!(error = %e, "Ensemble model unavailable, using rule-based classifier");
                (ClassifierMode::RuleBased(rules), true)
            }
        }
    }

    pub fn kind(&self) -> PredictionMode {
        match self {
            ClassifierMode::RuleBased(_) => PredictionMode::RuleBased,
            ClassifierMode::Ensemble(_) => PredictionMode::Ensemble,
        }
    }
}

impl Predictor for ClassifierMode {
    fn mode(&self) -> PredictionMode {
        self.kind()
    }

    fn predict(&self, features: &FeatureVector, baseline: Option<&BaselineRecord>) -> Prediction {
        match self {
            ClassifierMode::RuleBased(params) => {
                RuleBasedModel::new(*params).predict(features, baseline)
            }
            ClassifierMode::Ensemble(model) => model.predict(features, baseline),
        }
    }
}

/// Summary of the prediction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionStats {
    pub count: usize,
    pub stress: usize,
    pub no_stress: usize,
    pub average_confidence: f64,
    pub most_common: Option<StressLabel>,
}

/// The classifier used by a session: mode, baseline and bounded history.
pub struct StressClassifier {
    mode: ClassifierMode,
    baseline: Option<BaselineRecord>,
    history: VecDeque<Prediction>,
    capacity: usize,
    telemetry: SharedTelemetry,
}

impl StressClassifier {
    pub fn new(mode: ClassifierMode, capacity: usize, telemetry: SharedTelemetry) -> Self {
        info!(mode = %mode.kind(), "Stress classifier ready");
        Self {
            mode,
            baseline: None,
            history: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            telemetry,
        }
    }

    /// Build from an optional model path, degrading to rules on failure.
    pub fn load(
        model_path: Option<&Path>,
        rules: RuleParams,
        capacity: usize,
        telemetry: SharedTelemetry,
    ) -> Self {
        let (mode, fell_back) = ClassifierMode::load_or_rules(model_path, rules);
        if fell_back {
            telemetry.record_classifier_fallback();
        }
        Self::new(mode, capacity, telemetry)
    }

    pub fn mode(&self) -> PredictionMode {
        self.mode.kind()
    }

    pub fn set_baseline(&mut self, baseline: Option<BaselineRecord>) {
        self.baseline = baseline;
    }

    pub fn baseline(&self) -> Option<&BaselineRecord> {
        self.baseline.as_ref()
    }

    /// Classify one vector and record the result.
    pub fn predict(&mut self, features: &FeatureVector) -> Prediction {
        let prediction = self.mode.predict(features, self.baseline.as_ref());

        info!(
            label = %prediction.label,
            confidence = prediction.confidence,
            mode = %prediction.mode,
            "Prediction"
        );
        self.telemetry.record_prediction(prediction.mode);

        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(prediction.clone());
        prediction
    }

    pub fn history(&self) -> impl Iterator<Item = &Prediction> {
        self.history.iter()
    }

    pub fn last(&self) -> Option<&Prediction> {
        self.history.back()
    }

    pub fn statistics(&self) -> PredictionStats {
        let count = self.history.len();
        let stress = self
            .history
            .iter()
            .filter(|p| p.label == StressLabel::Stress)
            .count();
        let no_stress = count - stress;
        let average_confidence = if count == 0 {
            0.0
        } else {
            self.history.iter().map(|p| p.confidence).sum::<f64>() / count as f64
        };
        let most_common = match (count, stress.cmp(&no_stress)) {
            (0, _) => None,
            (_, std::cmp::Ordering::Greater) => Some(StressLabel::Stress),
            // Ties resolve to the calmer label
            _ => Some(StressLabel::NoStress),
        };
        PredictionStats {
            count,
            stress,
            no_stress,
            average_confidence,
            most_common,
        }
    }

    /// Fraction of stress labels among the last `n` predictions.
    pub fn trend(&self, n: usize) -> Option<f64> {
        let take = n.min(self.history.len());
        if take == 0 {
            return None;
        }
        let stress = self
            .history
            .iter()
            .rev()
            .take(take)
            .filter(|p| p.label == StressLabel::Stress)
            .count();
        Some(stress as f64 / take as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ensemble::tests::{model, stump};
    use crate::transparency::create_shared_telemetry;

    fn features(eda_mean: f64, hr_mean: f64) -> FeatureVector {
        FeatureVector::validated([("eda_mean", eda_mean), ("hr_mean", hr_mean)])
    }

    fn baseline(gsr: f64, gsr_spread: f64, hr: f64, source: BaselineSource) -> BaselineRecord {
        BaselineRecord {
            gsr_baseline: gsr,
            hr_baseline: hr,
            gsr_spread,
            hr_spread: 0.0,
            source,
            hr_source: source,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_resting_values_score_low() {
        let rules = RuleBasedModel::default();
        let p = rules.predict(&features(5.0, 70.0), None);
        assert!((p.score.unwrap() - 0.1).abs() < 1e-9);
        assert_eq!(p.label, StressLabel::NoStress);
        assert_eq!(p.confidence, 0.8);
    }

    #[test]
    fn test_high_values_score_one() {
        let rules = RuleBasedModel::default();
        let p = rules.predict(&features(30.0, 110.0), None);
        assert_eq!(p.score, Some(1.0));
        assert_eq!(p.label, StressLabel::Stress);
        assert_eq!(p.confidence, 0.8);
    }

    #[test]
    fn test_score_monotone_and_bounded() {
        let rules = RuleBasedModel::default();
        let mut last = 0.0;
        for i in 0..=40 {
            let gsr = f64::from(i);
            let s = rules.score(gsr, 80.0, None);
            assert!(s >= last - 1e-12);
            last = s;
        }
        let mut last = 0.0;
        for i in 40..=130 {
            let s = rules.score(10.0, f64::from(i), None);
            assert!(s >= last - 1e-12);
            last = s;
        }
        assert_eq!(rules.score(5.0, 60.0, None), 0.0);
        assert_eq!(rules.score(25.0, 100.0, None), 1.0);
    }

    #[test]
    fn test_bands() {
        assert_eq!(score_band(0.2), (StressLabel::NoStress, 0.8));
        assert_eq!(score_band(0.3), (StressLabel::NoStress, 0.7));
        assert_eq!(score_band(0.6), (StressLabel::NoStress, 0.6));
        assert_eq!(score_band(0.61), (StressLabel::Stress, 0.7));
        assert_eq!(score_band(0.81), (StressLabel::Stress, 0.8));
    }

    #[test]
    fn test_baseline_normalization() {
        let rules = RuleBasedModel::default();

        // Default-provenance baseline behaves like no baseline
        let defaults = baseline(0.0, 0.0, 70.0, BaselineSource::Default);
        assert_eq!(
            rules.score(5.0, 70.0, Some(&defaults)),
            rules.score(5.0, 70.0, None)
        );

        // Device baseline without spread: mean subtraction
        let device = baseline(10.0, 0.0, 70.0, BaselineSource::DeviceReported);
        // GSR delta 5 of 10 -> 0.5, HR delta 15 of 30 -> 0.5
        assert!((rules.score(15.0, 85.0, Some(&device)) - 0.5).abs() < 1e-9);

        // Computed baseline with spread: z-score
        let computed = baseline(10.0, 2.0, 70.0, BaselineSource::Computed);
        // GSR z = 3 -> 1.0, HR delta 0 -> 0
        assert!((rules.score(16.0, 70.0, Some(&computed)) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_classifier_history_and_stats() {
        let telemetry = create_shared_telemetry();
        let mut classifier = StressClassifier::new(
            ClassifierMode::RuleBased(RuleParams::default()),
            3,
            telemetry.clone(),
        );
        classifier.predict(&features(30.0, 110.0));
        classifier.predict(&features(5.0, 70.0));
        classifier.predict(&features(30.0, 110.0));
        classifier.predict(&features(30.0, 110.0));

        let stats = classifier.statistics();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.stress, 2);
        assert_eq!(stats.most_common, Some(StressLabel::Stress));
        assert!((stats.average_confidence - 0.8).abs() < 1e-12);
        assert_eq!(classifier.trend(2), Some(1.0));
        assert_eq!(classifier.trend(3), Some(2.0 / 3.0));
        assert_eq!(telemetry.stats().rule_predictions, 4);
    }

    #[test]
    fn test_ensemble_mode() {
        let m = model(vec![stump(7, 10.0, [0.9, 0.1], [0.2, 0.8])]);
        let mut classifier =
            StressClassifier::new(ClassifierMode::Ensemble(m), 10, create_shared_telemetry());
        let p = classifier.predict(&features(20.0, 70.0));
        assert_eq!(p.mode, PredictionMode::Ensemble);
        assert_eq!(p.label, StressLabel::Stress);
        assert!((0.0..=1.0).contains(&p.confidence));
        assert_eq!(p.score, None);
    }

    #[test]
    fn test_missing_model_falls_back() {
        let telemetry = create_shared_telemetry();
        let classifier = StressClassifier::load(
            Some(Path::new("/nonexistent/model.json")),
            RuleParams::default(),
            10,
            telemetry.clone(),
        );
        assert_eq!(classifier.mode(), PredictionMode::RuleBased);
        assert_eq!(telemetry.stats().classifier_fallbacks, 1);
    }

    #[test]
    fn test_categories() {
        assert_eq!(StressLabel::Stress.category(), "stress_relief");
        assert_eq!(StressLabel::NoStress.category(), "calming");
    }
}
