//! Session orchestration.
//!
//! The state machine is the single owner of [`SessionState`]. It runs on one
//! thread: button events are drained from a bounded queue once per tick, and
//! the blocking phases (calibration, window collection, playback monitoring)
//! poll the same queue so a Stop press is honored within one tick.

use super::collaborators::{Display, Library, NoopObserver, Playback, SessionObserver};
use super::reevaluation::ReEvaluationSchedule;
use super::report::{PredictionKind, SessionReport};
use super::texts;
use crate::core::{
    extract_features, BaselineCalibrator, BaselineSource, DataWindow, Prediction,
    StressClassifier, WindowCollector,
};
use crate::link::{BaselineMailbox, ButtonKind, ButtonReceiver};
use crate::transparency::SharedTelemetry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle state of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Calibrating,
    SessionActive,
    Stopping,
}

impl SessionState {
    /// Whether a Stop press applies in this state.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Calibrating | SessionState::SessionActive)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Calibrating => "calibrating",
            SessionState::SessionActive => "session_active",
            SessionState::Stopping => "stopping",
        };
        write!(f, "{name}")
    }
}

/// Timing of the control loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Idle loop tick
    pub tick: Duration,
    /// Re-evaluate this long before a track ends
    pub reevaluation_lead: Duration,
    /// Extra time a track may overrun its duration before being stopped
    pub playback_grace: Duration,
    /// Playback monitor poll interval
    pub playback_poll: Duration,
    /// Classification window
    pub window: Duration,
    /// Re-evaluation window
    pub quick_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            reevaluation_lead: Duration::from_secs(60),
            playback_grace: Duration::from_secs(10),
            playback_poll: Duration::from_millis(100),
            window: Duration::from_secs(60),
            quick_window: Duration::from_secs(10),
        }
    }
}

/// Analysis stages a session drives.
pub struct SessionPipeline {
    pub calibrator: BaselineCalibrator,
    pub collector: WindowCollector,
    pub classifier: StressClassifier,
    pub mailbox: BaselineMailbox,
    pub telemetry: SharedTelemetry,
}

/// Why an active phase returned early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    User,
    Shutdown,
}

/// Button-driven session controller.
pub struct SessionStateMachine<P: Playback, L: Library, O: SessionObserver = NoopObserver> {
    config: SessionConfig,
    state: SessionState,
    pipeline: SessionPipeline,
    buttons: ButtonReceiver,
    display: Arc<dyn Display>,
    playback: P,
    library: L,
    observer: O,
    export_path: Option<PathBuf>,
    last_report: Option<SessionReport>,
}

impl<P: Playback, L: Library> SessionStateMachine<P, L, NoopObserver> {
    pub fn new(
        config: SessionConfig,
        pipeline: SessionPipeline,
        buttons: ButtonReceiver,
        display: Arc<dyn Display>,
        playback: P,
        library: L,
    ) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            pipeline,
            buttons,
            display,
            playback,
            library,
            observer: NoopObserver,
            export_path: None,
            last_report: None,
        }
    }
}

impl<P: Playback, L: Library, O: SessionObserver> SessionStateMachine<P, L, O> {
    /// Replace the observer.
    pub fn with_observer<O2: SessionObserver>(self, observer: O2) -> SessionStateMachine<P, L, O2> {
        SessionStateMachine {
            config: self.config,
            state: self.state,
            pipeline: self.pipeline,
            buttons: self.buttons,
            display: self.display,
            playback: self.playback,
            library: self.library,
            observer,
            export_path: self.export_path,
            last_report: self.last_report,
        }
    }

    /// Write a report into `dir` after every session.
    pub fn with_export_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_path = Some(dir.into());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn classifier(&self) -> &StressClassifier {
        &self.pipeline.classifier
    }

    pub fn playback(&self) -> &P {
        &self.playback
    }

    /// Report of the most recent session.
    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }

    /// Run the control loop until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!("Session controller started");
        self.display.show(texts::READY);

        while !shutdown.load(Ordering::SeqCst) {
            self.step(shutdown);
            std::thread::sleep(self.config.tick);
        }

        if self.playback.is_playing() {
            self.playback.stop();
        }
        self.display.show(texts::SHUTTING_DOWN);
        info!("Session controller stopped");
    }

    /// Handle at most one pending button event.
    ///
    /// A Start press in `Idle` runs a whole session before returning.
    pub fn step(&mut self, shutdown: &AtomicBool) {
        let Some(event) = self.buttons.poll() else {
            return;
        };
        match (self.state, event.kind) {
            (SessionState::Idle, ButtonKind::Start) => {
                self.run_session(shutdown);
            }
            (state, kind) => {
                debug!(%state, ?kind, "Button ignored");
            }
        }
    }

    /// Calibrate, then classify and play until stopped.
    pub fn run_session(&mut self, shutdown: &AtomicBool) -> &SessionReport {
        // A baseline left over from an earlier calibration is stale
        if self.pipeline.mailbox.take().is_some() {
            debug!("Discarded stale device baseline");
        }
        self.pipeline.telemetry.record_session();
        let mut report = SessionReport::new(self.pipeline.classifier.mode());
        info!(session = %report.id, "Session starting");

        self.transition(SessionState::Calibrating);
        self.display.show(texts::CALIBRATION_START);

        let halt = match self.calibrate(shutdown) {
            Ok(()) => {
                report.baseline = self.pipeline.classifier.baseline().cloned();
                self.transition(SessionState::SessionActive);
                self.display.show(texts::SESSION_START);
                self.classify_loop(shutdown, &mut report)
            }
            Err(halt) => halt,
        };

        self.finish(report, halt)
    }

    fn calibrate(&mut self, shutdown: &AtomicBool) -> Result<(), Halt> {
        let record = self
            .pipeline
            .calibrator
            .calibrate_default(&mut || stop_requested(&self.buttons, shutdown))
            .ok_or_else(|| halt_cause(shutdown))?;

        if record.source == BaselineSource::Default && record.hr_source == BaselineSource::Default {
            self.display.show(texts::CALIBRATION_DEFAULTS);
        } else {
            self.display.show(texts::CALIBRATION_COMPLETE);
            self.display
                .show(&texts::baseline_data(record.gsr_baseline, record.hr_baseline));
        }
        self.pipeline.classifier.set_baseline(Some(record));
        Ok(())
    }

    /// Window → features → prediction → item → playback, repeated.
    fn classify_loop(&mut self, shutdown: &AtomicBool, report: &mut SessionReport) -> Halt {
        loop {
            let window = self.collect(self.config.window, shutdown);
            let Some(window) = window else {
                return halt_cause(shutdown);
            };
            let prediction = self.classify(window, PredictionKind::Window, report);

            let category = prediction.label.category();
            let Some(item) = self.library.select(category) else {
                warn!(category, "No items in category, collecting another window");
                self.display.show(&texts::empty_category(category));
                continue;
            };

            self.display
                .show(&texts::prediction(prediction.label, prediction.confidence));
            let duration = match self.playback.play(&item) {
                Ok(duration) => duration,
                Err(e) => {
                    error!(item = %item, error = %e, "Playback failed");
                    continue;
                }
            };
            info!(item = %item, duration_s = duration.as_secs_f64(), category, "Playing");
            report.record_item(&item);

            if let Err(halt) = self.monitor_playback(duration, shutdown, report) {
                return halt;
            }
        }
    }

    /// Wait for the current item to end, re-evaluating once near the end.
    fn monitor_playback(
        &mut self,
        duration: Duration,
        shutdown: &AtomicBool,
        report: &mut SessionReport,
    ) -> Result<(), Halt> {
        let started = Instant::now();
        let ceiling = duration + self.config.playback_grace;
        let mut schedule = ReEvaluationSchedule::new(duration, self.config.reevaluation_lead);
        if let Some(due) = schedule.due_at() {
            debug!(due_s = due.as_secs_f64(), "Re-evaluation scheduled");
        }

        loop {
            if stop_requested(&self.buttons, shutdown) {
                return Err(halt_cause(shutdown));
            }

            let elapsed = started.elapsed();
            if !self.playback.is_playing() {
                debug!(elapsed_s = elapsed.as_secs_f64(), "Item finished");
                return Ok(());
            }
            if elapsed >= ceiling {
                warn!(elapsed_s = elapsed.as_secs_f64(), "Item overran its duration, stopping it");
                self.playback.stop();
                return Ok(());
            }

            if schedule.poll(elapsed) {
                info!("Re-evaluating during playback");
                self.display.show(texts::REEVALUATING);
                self.pipeline.telemetry.record_reevaluation();
                let window = self.collect(self.config.quick_window, shutdown);
                let Some(window) = window else {
                    return Err(halt_cause(shutdown));
                };
                let prediction = self.classify(window, PredictionKind::Reevaluation, report);
                self.display
                    .show(&texts::prediction(prediction.label, prediction.confidence));
                continue;
            }

            std::thread::sleep(self.config.playback_poll);
        }
    }

    fn collect(&self, length: Duration, shutdown: &AtomicBool) -> Option<DataWindow> {
        let collector = &self.pipeline.collector;
        let baseline = self.pipeline.classifier.baseline();
        let mut interrupt = || stop_requested(&self.buttons, shutdown);
        collector.collect(length, collector.sampling_rate(), baseline, &mut interrupt)
    }

    fn classify(
        &mut self,
        window: DataWindow,
        kind: PredictionKind,
        report: &mut SessionReport,
    ) -> Prediction {
        let features = extract_features(window);
        let prediction = self.pipeline.classifier.predict(&features);
        self.observer
            .on_prediction(prediction.label, prediction.confidence);
        report.record(kind, prediction.clone());
        prediction
    }

    fn finish(&mut self, mut report: SessionReport, halt: Halt) -> &SessionReport {
        self.transition(SessionState::Stopping);
        if self.playback.is_playing() {
            self.playback.stop();
        }
        report.finish(halt == Halt::User);
        self.display.show(texts::SESSION_STOPPED);

        if let Some(dir) = &self.export_path {
            write_report(&report, dir);
        }
        info!(
            session = %report.id,
            predictions = report.predictions.len(),
            reevaluations = report.reevaluations,
            "Session ended"
        );

        // Presses queued during the session do not carry over
        self.buttons.clear();
        self.transition(SessionState::Idle);
        self.last_report.insert(report)
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "State change");
            self.state = next;
            self.observer.on_state_change(next);
        }
    }
}

fn stop_requested(buttons: &ButtonReceiver, shutdown: &AtomicBool) -> bool {
    shutdown.load(Ordering::SeqCst) || buttons.poll_stop()
}

fn halt_cause(shutdown: &AtomicBool) -> Halt {
    if shutdown.load(Ordering::SeqCst) {
        Halt::Shutdown
    } else {
        Halt::User
    }
}

fn write_report(report: &SessionReport, dir: &Path) {
    match report.write(dir) {
        Ok(path) => info!(path = %path.display(), "Session report written"),
        Err(e) => warn!(error = %e, "Failed to write session report"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::SessionActive.to_string(), "session_active");
        assert_eq!(
            serde_json::to_string(&SessionState::Idle).unwrap(),
            "\"idle\""
        );
    }

    #[test]
    fn test_active_states() {
        assert!(SessionState::Calibrating.is_active());
        assert!(SessionState::SessionActive.is_active());
        assert!(!SessionState::Idle.is_active());
        assert!(!SessionState::Stopping.is_active());
    }

    #[test]
    fn test_default_timing() {
        let config = SessionConfig::default();
        assert_eq!(config.tick, Duration::from_millis(50));
        assert_eq!(config.reevaluation_lead, Duration::from_secs(60));
        assert_eq!(config.quick_window, Duration::from_secs(10));
    }
}
