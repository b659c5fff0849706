//! Per-session JSON report.

use crate::core::{BaselineRecord, Prediction, PredictionMode};
use crate::error::ReportError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What triggered a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    /// Full window before choosing a track
    Window,
    /// Quick window during playback
    Reevaluation,
}

/// A prediction with its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub kind: PredictionKind,
    pub prediction: Prediction,
    /// Item played after this prediction, if any
    pub item: Option<String>,
}

/// Everything worth keeping about one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub classifier: PredictionMode,
    pub baseline: Option<BaselineRecord>,
    pub predictions: Vec<ReportEntry>,
    pub reevaluations: u32,
    pub tracks_played: u32,
    pub stopped_by_user: bool,
}

impl SessionReport {
    pub fn new(classifier: PredictionMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            classifier,
            baseline: None,
            predictions: Vec::new(),
            reevaluations: 0,
            tracks_played: 0,
            stopped_by_user: false,
        }
    }

    pub fn record(&mut self, kind: PredictionKind, prediction: Prediction) {
        if kind == PredictionKind::Reevaluation {
            self.reevaluations += 1;
        }
        self.predictions.push(ReportEntry {
            kind,
            prediction,
            item: None,
        });
    }

    /// Attach the item played to the latest prediction.
    pub fn record_item(&mut self, item: &str) {
        self.tracks_played += 1;
        if let Some(entry) = self.predictions.last_mut() {
            entry.item = Some(item.to_string());
        }
    }

    pub fn finish(&mut self, stopped_by_user: bool) {
        self.ended_at = Some(Utc::now());
        self.stopped_by_user = stopped_by_user;
    }

    /// File name used inside the export directory.
    pub fn file_name(&self) -> String {
        format!("session_{}.json", self.started_at.format("%Y%m%d_%H%M%S"))
    }

    /// Write the report into `dir` and return the file path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(dir)?;
        let mut path = dir.join(self.file_name());
        if path.exists() {
            // Two sessions in the same second
            path = dir.join(format!(
                "session_{}_{}.json",
                self.started_at.format("%Y%m%d_%H%M%S"),
                self.id.simple()
            ));
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StressLabel;

    fn prediction(label: StressLabel) -> Prediction {
        Prediction {
            label,
            confidence: 0.7,
            score: Some(0.65),
            mode: PredictionMode::RuleBased,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_report_bookkeeping() {
        let mut report = SessionReport::new(PredictionMode::RuleBased);
        report.record(PredictionKind::Window, prediction(StressLabel::Stress));
        report.record_item("track-1");
        report.record(PredictionKind::Reevaluation, prediction(StressLabel::NoStress));
        report.finish(true);

        assert_eq!(report.reevaluations, 1);
        assert_eq!(report.tracks_played, 1);
        assert_eq!(report.predictions[0].item.as_deref(), Some("track-1"));
        assert!(report.predictions[1].item.is_none());
        assert!(report.ended_at.is_some());
        assert!(report.stopped_by_user);
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = SessionReport::new(PredictionMode::Ensemble);
        report.record(PredictionKind::Window, prediction(StressLabel::NoStress));
        report.finish(false);

        let first = report.write(dir.path()).unwrap();
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("session_"));
        assert_eq!(SessionReport::load(&first).unwrap(), report);

        // Same start second does not overwrite
        let second = report.write(dir.path()).unwrap();
        assert_ne!(first, second);
    }
}
