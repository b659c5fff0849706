//! Feature extraction from data windows.
//!
//! A window is reduced to 15 statistics in a fixed order: seven for heart
//! rate, eight for electrodermal activity. A channel without valid samples
//! contributes zeros, and any statistic that is undefined for its input
//! (too few samples, zero variance) is reported as zero.

use super::windowing::DataWindow;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Number of features in a vector.
pub const FEATURE_COUNT: usize = 15;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "hr_mean",
    "hr_std",
    "hr_min",
    "hr_max",
    "hr_range",
    "hr_skew",
    "hr_kurtosis",
    "eda_mean",
    "eda_std",
    "eda_min",
    "eda_max",
    "eda_range",
    "eda_skew",
    "eda_kurtosis",
    "eda_slope",
];

/// Index of a feature by name.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Fixed-order feature vector. All values are finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn zeros() -> Self {
        Self([0.0; FEATURE_COUNT])
    }

    /// Build a vector from named entries.
    ///
    /// Missing names and non-finite values become 0.0 with a warning; unknown
    /// names are ignored. Never fails.
    pub fn validated<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut values = [None; FEATURE_COUNT];
        for (name, value) in entries {
            match feature_index(name.as_ref()) {
                Some(i) => values[i] = Some(value),
                None => debug!(feature = name.as_ref(), "Ignoring unknown feature"),
            }
        }

        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in values.iter().enumerate() {
            out[i] = match value {
                Some(v) if v.is_finite() => *v,
                Some(v) => {
                    warn!(feature = FEATURE_NAMES[i], value = %v, "Non-finite feature replaced with 0");
                    0.0
                }
                None => {
                    warn!(feature = FEATURE_NAMES[i], "Missing feature replaced with 0");
                    0.0
                }
            };
        }
        Self(out)
    }

    /// Build from an ordered array, sanitizing non-finite values.
    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self::validated(FEATURE_NAMES.iter().copied().zip(values))
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|i| self.0[i])
    }

    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// (name, value) pairs in vector order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.0.iter().copied())
    }

    pub fn hr_mean(&self) -> f64 {
        self.0[0]
    }

    pub fn eda_mean(&self) -> f64 {
        self.0[7]
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FeatureVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Non-numeric entries are treated as missing
        let raw = HashMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(Self::validated(
            raw.into_iter()
                .map(|(name, value)| (name, value.as_f64().unwrap_or(f64::NAN))),
        ))
    }
}

/// Per-channel summary statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub skew: f64,
    pub kurtosis: f64,
}

/// Compute the statistics of one channel. Empty input gives all zeros.
pub fn channel_stats(values: &[f64]) -> ChannelStats {
    if values.is_empty() {
        return ChannelStats::default();
    }

    let mean = values.iter().mean();
    let min = Statistics::min(values.iter());
    let max = Statistics::max(values.iter());
    let std = if values.len() > 1 {
        finite_or_zero(values.iter().std_dev())
    } else {
        0.0
    };

    ChannelStats {
        mean,
        std,
        min,
        max,
        range: max - min,
        skew: skewness(values, mean),
        kurtosis: excess_kurtosis(values, mean),
    }
}

/// Population central moment of order `k`.
fn central_moment(values: &[f64], mean: f64, k: i32) -> f64 {
    values.iter().map(|v| (v - mean).powi(k)).sum::<f64>() / values.len() as f64
}

/// Biased Fisher-Pearson skewness.
fn skewness(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m2 = central_moment(values, mean, 2);
    if m2 <= f64::EPSILON * mean.abs().max(1.0) {
        return 0.0;
    }
    finite_or_zero(central_moment(values, mean, 3) / m2.powf(1.5))
}

/// Biased Fisher (excess) kurtosis.
fn excess_kurtosis(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m2 = central_moment(values, mean, 2);
    if m2 <= f64::EPSILON * mean.abs().max(1.0) {
        return 0.0;
    }
    finite_or_zero(central_moment(values, mean, 4) / (m2 * m2) - 3.0)
}

/// Ordinary least squares slope of `ys` against `xs`.
pub fn ols_slope(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let x_mean = xs.iter().mean();
    let y_mean = ys.iter().mean();

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxx += (x - x_mean) * (x - x_mean);
        sxy += (x - x_mean) * (y - y_mean);
    }
    if sxx <= f64::EPSILON {
        return 0.0;
    }
    finite_or_zero(sxy / sxx)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Reduce a window to its feature vector. The window is consumed.
pub fn extract_features(window: DataWindow) -> FeatureVector {
    let mut hr = Vec::with_capacity(window.len());
    let mut eda = Vec::with_capacity(window.len());
    let mut eda_secs = Vec::with_capacity(window.len());

    for sample in &window.samples {
        if let Some(value) = sample.hr.and_then(|r| r.valid_value()) {
            hr.push(value);
        }
        if let Some(value) = sample.gsr.and_then(|r| r.valid_value()) {
            eda.push(value);
            eda_secs.push(window.elapsed_secs(sample.at));
        }
    }

    debug!(hr = hr.len(), eda = eda.len(), ticks = window.len(), "Extracting features");

    let h = channel_stats(&hr);
    let e = channel_stats(&eda);
    let slope = ols_slope(&eda_secs, &eda);

    FeatureVector::from_array([
        h.mean, h.std, h.min, h.max, h.range, h.skew, h.kurtosis, e.mean, e.std, e.min, e.max,
        e.range, e.skew, e.kurtosis, slope,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::windowing::WindowSample;
    use crate::sensors::SensorReading;
    use chrono::Utc;
    use std::time::{Duration, Instant};

    fn reading(value: f64, valid: bool, at: Instant) -> SensorReading {
        SensorReading {
            value,
            at,
            valid,
            contact: true,
        }
    }

    fn window(gsr: &[(f64, bool)], hr: &[(f64, bool)]) -> DataWindow {
        let start = Instant::now();
        let n = gsr.len().max(hr.len());
        let samples = (0..n)
            .map(|i| {
                let at = start + Duration::from_millis(100 * i as u64);
                WindowSample {
                    gsr: gsr.get(i).map(|&(v, ok)| reading(v, ok, at)),
                    hr: hr.get(i).map(|&(v, ok)| reading(v, ok, at)),
                    at,
                }
            })
            .collect();
        DataWindow {
            samples,
            start,
            end: start + Duration::from_millis(100 * n as u64),
            started_at: Utc::now(),
            duration: Duration::from_millis(100 * n as u64),
            baseline: None,
        }
    }

    #[test]
    fn test_all_invalid_window_is_zero_vector() {
        let features = extract_features(window(&[(5.0, false); 10], &[(70.0, false); 10]));
        assert_eq!(features, FeatureVector::zeros());
        assert_eq!(features.iter().count(), 15);
    }

    #[test]
    fn test_empty_window_is_zero_vector() {
        assert_eq!(extract_features(window(&[], &[])), FeatureVector::zeros());
    }

    #[test]
    fn test_basic_statistics() {
        let stats = channel_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        // Bessel-corrected: sqrt(32 / 7)
        assert!((stats.std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.range, 7.0);
    }

    #[test]
    fn test_skew_and_kurtosis() {
        // Symmetric data has zero skew
        let symmetric = channel_stats(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(symmetric.skew.abs() < 1e-12);
        // Uniform-like spacing: m4/m2^2 = 6.8/4 = 1.7, excess = -1.3
        assert!((symmetric.kurtosis + 1.3).abs() < 1e-12);

        // Right tail gives positive skew: m3/m2^1.5 = 0.6/0.6^1.5
        let skewed = channel_stats(&[1.0, 1.0, 1.0, 1.0, 3.0]);
        let m2: f64 = 0.64;
        let m3: f64 = (4.0 * (-0.4f64).powi(3) + 1.6f64.powi(3)) / 5.0;
        assert!((skewed.skew - m3 / m2.powf(1.5)).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_statistics_are_zero() {
        let single = channel_stats(&[4.2]);
        assert_eq!(single.std, 0.0);
        assert_eq!(single.skew, 0.0);
        assert_eq!(single.kurtosis, 0.0);
        assert_eq!(single.mean, 4.2);

        let flat = channel_stats(&[3.0; 10]);
        assert_eq!(flat.std, 0.0);
        assert_eq!(flat.skew, 0.0);
        assert_eq!(flat.kurtosis, 0.0);
    }

    #[test]
    fn test_eda_slope() {
        // 0.1 s ticks, value rising 0.5 per tick = 5 per second
        let gsr: Vec<(f64, bool)> = (0..10).map(|i| (1.0 + 0.5 * f64::from(i), true)).collect();
        let features = extract_features(window(&gsr, &[]));
        assert!((features.get("eda_slope").unwrap() - 5.0).abs() < 1e-6);
        assert_eq!(features.hr_mean(), 0.0);
        assert!((features.eda_mean() - 3.25).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_samples_excluded() {
        let features = extract_features(window(
            &[(5.0, true), (500.0, false), (7.0, true)],
            &[(70.0, true), (72.0, true), (0.0, false)],
        ));
        assert_eq!(features.get("eda_max"), Some(7.0));
        assert_eq!(features.get("hr_mean"), Some(71.0));
    }

    #[test]
    fn test_validation_substitutes_zero() {
        let features = FeatureVector::validated([("hr_mean", f64::NAN), ("eda_mean", 4.0)]);
        assert_eq!(features.get("hr_mean"), Some(0.0));
        assert_eq!(features.get("eda_mean"), Some(4.0));
        assert_eq!(features.get("eda_slope"), Some(0.0));
        assert_eq!(features.get("nonsense"), None);
    }

    #[test]
    fn test_json_keeps_order_and_tolerates_gaps() {
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = 72.0;
        let json = serde_json::to_string(&FeatureVector::from_array(values)).unwrap();
        assert!(json.starts_with("{\"hr_mean\":72.0,\"hr_std\""));
        assert!(json.ends_with("\"eda_slope\":0.0}"));

        let parsed: FeatureVector =
            serde_json::from_str(r#"{"eda_mean": 12.5, "hr_mean": null}"#).unwrap();
        assert_eq!(parsed.eda_mean(), 12.5);
        assert_eq!(parsed.hr_mean(), 0.0);
    }
}
