//! Pipeline telemetry.
//!
//! Counts what the monitor has done (frames, readings, windows, predictions,
//! sessions) with lock-free counters so every worker can record without
//! contending. No sample values are stored here, only tallies and the
//! provenance of the latest baseline.

use crate::core::baseline::BaselineSource;
use crate::core::classifier::PredictionMode;
use crate::sensors::SignalKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const NO_BASELINE: u8 = u8::MAX;

/// Running counters for the whole pipeline.
#[derive(Debug)]
pub struct Telemetry {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    gsr_readings: AtomicU64,
    hr_readings: AtomicU64,
    out_of_range: AtomicU64,
    transport_errors: AtomicU64,
    button_events: AtomicU64,
    buttons_dropped: AtomicU64,
    windows_completed: AtomicU64,
    rule_predictions: AtomicU64,
    ensemble_predictions: AtomicU64,
    classifier_fallbacks: AtomicU64,
    reevaluations: AtomicU64,
    sessions: AtomicU64,
    /// Provenance of the last GSR baseline, `NO_BASELINE` until calibrated
    gsr_baseline_source: AtomicU8,
    hr_baseline_source: AtomicU8,
    /// When counting started
    started: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            gsr_readings: AtomicU64::new(0),
            hr_readings: AtomicU64::new(0),
            out_of_range: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            button_events: AtomicU64::new(0),
            buttons_dropped: AtomicU64::new(0),
            windows_completed: AtomicU64::new(0),
            rule_predictions: AtomicU64::new(0),
            ensemble_predictions: AtomicU64::new(0),
            classifier_fallbacks: AtomicU64::new(0),
            reevaluations: AtomicU64::new(0),
            sessions: AtomicU64::new(0),
            gsr_baseline_source: AtomicU8::new(NO_BASELINE),
            hr_baseline_source: AtomicU8::new(NO_BASELINE),
            started: Utc::now(),
            persist_path: None,
        }
    }

    /// Create telemetry that persists to (and resumes from) `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut telemetry = Self::new();
        telemetry.persist_path = Some(path);

        if let Err(e) = telemetry.load() {
            warn!(error = %e, "Could not load previous telemetry");
        }

        telemetry
    }

    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame that failed framing or parsing.
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reading(&self, kind: SignalKind) {
        match kind {
            SignalKind::Gsr => self.gsr_readings.fetch_add(1, Ordering::Relaxed),
            SignalKind::Hr => self.hr_readings.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_out_of_range(&self) {
        self.out_of_range.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_button_event(&self) {
        self.button_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_button_dropped(&self) {
        self.buttons_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_completed(&self) {
        self.windows_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction(&self, mode: PredictionMode) {
        match mode {
            PredictionMode::RuleBased => self.rule_predictions.fetch_add(1, Ordering::Relaxed),
            PredictionMode::Ensemble => self.ensemble_predictions.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// The ensemble model could not be loaded and rules took over.
    pub fn record_classifier_fallback(&self) {
        self.classifier_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reevaluation(&self) {
        self.reevaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Remember where the latest baseline came from.
    pub fn record_baseline(&self, gsr: BaselineSource, hr: BaselineSource) {
        self.gsr_baseline_source.store(gsr.to_code(), Ordering::Relaxed);
        self.hr_baseline_source.store(hr.to_code(), Ordering::Relaxed);
        debug!(gsr = %gsr, hr = %hr, "Baseline provenance recorded");
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            gsr_readings: self.gsr_readings.load(Ordering::Relaxed),
            hr_readings: self.hr_readings.load(Ordering::Relaxed),
            out_of_range: self.out_of_range.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            button_events: self.button_events.load(Ordering::Relaxed),
            buttons_dropped: self.buttons_dropped.load(Ordering::Relaxed),
            windows_completed: self.windows_completed.load(Ordering::Relaxed),
            rule_predictions: self.rule_predictions.load(Ordering::Relaxed),
            ensemble_predictions: self.ensemble_predictions.load(Ordering::Relaxed),
            classifier_fallbacks: self.classifier_fallbacks.load(Ordering::Relaxed),
            reevaluations: self.reevaluations.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
            gsr_baseline_source: BaselineSource::from_code(
                self.gsr_baseline_source.load(Ordering::Relaxed),
            ),
            hr_baseline_source: BaselineSource::from_code(
                self.hr_baseline_source.load(Ordering::Relaxed),
            ),
            started: self.started,
            uptime_secs: (Utc::now() - self.started).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let provenance = |source: Option<BaselineSource>| {
            source.map_or_else(|| "not calibrated".to_string(), |s| s.to_string())
        };
        format!(
            "Monitor Statistics:\n\
             - Frames received: {} ({} dropped)\n\
             - GSR readings: {}\n\
             - HR readings: {}\n\
             - Out-of-range samples: {}\n\
             - Transport errors: {}\n\
             - Button events: {} ({} dropped)\n\
             - Windows completed: {}\n\
             - Predictions: {} rule-based, {} ensemble\n\
             - Classifier fallbacks: {}\n\
             - Re-evaluations: {}\n\
             - Sessions: {}\n\
             - Last baseline: GSR {}, HR {}\n\
             - Uptime: {} seconds",
            stats.frames_received,
            stats.frames_dropped,
            stats.gsr_readings,
            stats.hr_readings,
            stats.out_of_range,
            stats.transport_errors,
            stats.button_events,
            stats.buttons_dropped,
            stats.windows_completed,
            stats.rule_predictions,
            stats.ensemble_predictions,
            stats.classifier_fallbacks,
            stats.reevaluations,
            stats.sessions,
            provenance(stats.gsr_baseline_source),
            provenance(stats.hr_baseline_source),
            stats.uptime_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedTelemetry {
                frames_received: stats.frames_received,
                frames_dropped: stats.frames_dropped,
                gsr_readings: stats.gsr_readings,
                hr_readings: stats.hr_readings,
                windows_completed: stats.windows_completed,
                rule_predictions: stats.rule_predictions,
                ensemble_predictions: stats.ensemble_predictions,
                reevaluations: stats.reevaluations,
                sessions: stats.sessions,
                gsr_baseline_source: stats.gsr_baseline_source,
                hr_baseline_source: stats.hr_baseline_source,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedTelemetry =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_received
                    .store(persisted.frames_received, Ordering::Relaxed);
                self.frames_dropped
                    .store(persisted.frames_dropped, Ordering::Relaxed);
                self.gsr_readings
                    .store(persisted.gsr_readings, Ordering::Relaxed);
                self.hr_readings
                    .store(persisted.hr_readings, Ordering::Relaxed);
                self.windows_completed
                    .store(persisted.windows_completed, Ordering::Relaxed);
                self.rule_predictions
                    .store(persisted.rule_predictions, Ordering::Relaxed);
                self.ensemble_predictions
                    .store(persisted.ensemble_predictions, Ordering::Relaxed);
                self.reevaluations
                    .store(persisted.reevaluations, Ordering::Relaxed);
                self.sessions.store(persisted.sessions, Ordering::Relaxed);
                if let (Some(gsr), Some(hr)) =
                    (persisted.gsr_baseline_source, persisted.hr_baseline_source)
                {
                    self.gsr_baseline_source
                        .store(gsr.to_code(), Ordering::Relaxed);
                    self.hr_baseline_source.store(hr.to_code(), Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.frames_received,
            &self.frames_dropped,
            &self.gsr_readings,
            &self.hr_readings,
            &self.out_of_range,
            &self.transport_errors,
            &self.button_events,
            &self.buttons_dropped,
            &self.windows_completed,
            &self.rule_predictions,
            &self.ensemble_predictions,
            &self.classifier_fallbacks,
            &self.reevaluations,
            &self.sessions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.gsr_baseline_source.store(NO_BASELINE, Ordering::Relaxed);
        self.hr_baseline_source.store(NO_BASELINE, Ordering::Relaxed);
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of telemetry counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub gsr_readings: u64,
    pub hr_readings: u64,
    pub out_of_range: u64,
    pub transport_errors: u64,
    pub button_events: u64,
    pub buttons_dropped: u64,
    pub windows_completed: u64,
    pub rule_predictions: u64,
    pub ensemble_predictions: u64,
    pub classifier_fallbacks: u64,
    pub reevaluations: u64,
    pub sessions: u64,
    pub gsr_baseline_source: Option<BaselineSource>,
    pub hr_baseline_source: Option<BaselineSource>,
    pub started: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Persisted subset; error counters restart per process.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTelemetry {
    frames_received: u64,
    frames_dropped: u64,
    gsr_readings: u64,
    hr_readings: u64,
    windows_completed: u64,
    rule_predictions: u64,
    ensemble_predictions: u64,
    reevaluations: u64,
    sessions: u64,
    gsr_baseline_source: Option<BaselineSource>,
    hr_baseline_source: Option<BaselineSource>,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared telemetry.
pub type SharedTelemetry = Arc<Telemetry>;

pub fn create_shared_telemetry() -> SharedTelemetry {
    Arc::new(Telemetry::new())
}

pub fn create_shared_telemetry_with_persistence(path: PathBuf) -> SharedTelemetry {
    Arc::new(Telemetry::with_persistence(path))
}
