//! Integration tests for the session state machine driven over a replayed link

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use stress_monitor::config::Config;
use stress_monitor::core::{BaselineSource, StressLabel};
use stress_monitor::link::ReplayTransport;
use stress_monitor::session::{
    texts, Catalog, CatalogItem, CatalogLibrary, Display, Playback, PredictionKind,
    SessionObserver, SessionState, SimulatedPlayback,
};
use stress_monitor::transparency::create_shared_telemetry;
use stress_monitor::{Monitor, SharedTelemetry};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Prediction(StressLabel, f64),
    State(SessionState),
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn states(&self) -> Vec<SessionState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::State(s) => Some(s),
                Event::Prediction(..) => None,
            })
            .collect()
    }

    fn predictions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Prediction(..)))
            .count()
    }
}

impl SessionObserver for Recorder {
    fn on_prediction(&self, label: StressLabel, confidence: f64) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Prediction(label, confidence));
    }

    fn on_state_change(&self, state: SessionState) {
        self.events.lock().unwrap().push(Event::State(state));
    }
}

#[derive(Default)]
struct RecordingDisplay {
    shown: Mutex<Vec<String>>,
}

impl RecordingDisplay {
    fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }
}

impl Display for RecordingDisplay {
    fn show(&self, text: &str) {
        self.shown.lock().unwrap().push(text.to_string());
    }
}

fn fast_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.export_path = dir.join("sessions");
    config.data_path = dir.to_path_buf();
    config.calibration.device_wait = Duration::from_millis(1500);
    config.calibration.poll_interval = Duration::from_millis(5);
    config.window.window = Duration::from_millis(300);
    config.window.quick_window = Duration::from_millis(100);
    config.window.sampling_rate_hz = 20.0;
    config.session.tick = Duration::from_millis(5);
    config.session.reevaluation_lead = Duration::from_millis(200);
    config.session.playback_grace = Duration::from_millis(200);
    config.session.playback_poll = Duration::from_millis(5);
    config
}

fn catalog(with_items: bool) -> Catalog {
    let mut catalog = Catalog::new();
    for (category, id) in [("calming", "calm-1"), ("stress_relief", "relief-1")] {
        let items = if with_items {
            vec![CatalogItem {
                id: id.to_string(),
                duration_secs: 0.5,
            }]
        } else {
            Vec::new()
        };
        catalog.insert(category.to_string(), items);
    }
    catalog
}

fn device_script(before_baseline: usize, after_baseline: usize, stop: bool) -> ReplayTransport {
    let mut lines = vec!["BUTTON:START".to_string()];
    lines.extend((0..before_baseline).map(|_| "GSR_CONDUCTANCE:5.0".to_string()));
    lines.push("BASELINE:GSR:5.0,HR:70.0".to_string());
    lines.extend((0..after_baseline).map(|_| "GSR_CONDUCTANCE:5.0".to_string()));
    if stop {
        lines.push("BUTTON:STOP".to_string());
    }
    ReplayTransport::from_lines(lines).with_pace(Duration::from_millis(10))
}

struct Rig {
    monitor: Monitor<SimulatedPlayback, CatalogLibrary, Recorder>,
    recorder: Recorder,
    display: Arc<RecordingDisplay>,
    telemetry: SharedTelemetry,
}

fn rig(config: &Config, transport: ReplayTransport, catalog: Catalog) -> Rig {
    let recorder = Recorder::default();
    let display = Arc::new(RecordingDisplay::default());
    let telemetry = create_shared_telemetry();
    let playback = SimulatedPlayback::from_catalog(&catalog);
    let library = CatalogLibrary::new(catalog).with_seed(1);
    let monitor = Monitor::assemble(
        config,
        transport,
        None::<ReplayTransport>,
        display.clone(),
        playback,
        library,
        telemetry.clone(),
    )
    .with_observer(recorder.clone());
    Rig {
        monitor,
        recorder,
        display,
        telemetry,
    }
}

/// Run the monitor until `done` holds for the recorded events, or 10 s pass.
fn run_until(rig: &mut Rig, done: impl Fn(&Recorder) -> bool + Send + 'static) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let watcher = {
        let shutdown = shutdown.clone();
        let recorder = rig.recorder.clone();
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline && !done(&recorder) {
                thread::sleep(Duration::from_millis(5));
            }
            shutdown.store(true, Ordering::SeqCst);
        })
    };
    rig.monitor.run(&shutdown).unwrap();
    watcher.join().unwrap();
}

fn session_ended(recorder: &Recorder) -> bool {
    recorder.states().ends_with(&[SessionState::Stopping, SessionState::Idle])
}

#[test]
fn test_full_session_with_reevaluation() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());
    let mut rig = rig(&config, device_script(10, 150, true), catalog(true));

    run_until(&mut rig, session_ended);

    assert_eq!(
        rig.recorder.states(),
        vec![
            SessionState::Calibrating,
            SessionState::SessionActive,
            SessionState::Stopping,
            SessionState::Idle,
        ]
    );
    assert_eq!(rig.monitor.machine().state(), SessionState::Idle);
    assert!(!rig.monitor.machine().playback().is_playing());

    let report = rig.monitor.machine().last_report().unwrap();
    assert!(report.stopped_by_user);
    let baseline = report.baseline.as_ref().unwrap();
    assert_eq!(baseline.source, BaselineSource::DeviceReported);
    assert_eq!(baseline.gsr_baseline, 5.0);

    // Resting values at baseline classify as relaxed
    let first = &report.predictions[0];
    assert_eq!(first.kind, PredictionKind::Window);
    assert_eq!(first.prediction.label, StressLabel::NoStress);
    assert_eq!(first.prediction.confidence, 0.8);
    assert_eq!(first.item.as_deref(), Some("calm-1"));
    assert!(report.reevaluations >= 1);
    assert!(report
        .predictions
        .iter()
        .any(|p| p.kind == PredictionKind::Reevaluation));
    assert!(rig
        .recorder
        .events()
        .contains(&Event::Prediction(StressLabel::NoStress, 0.8)));

    let shown = rig.display.shown();
    assert!(shown[0].starts_with("Sensors: GSR"));
    assert!(shown.iter().any(|t| t == texts::READY));
    assert!(shown.iter().any(|t| t == texts::CALIBRATION_COMPLETE));
    assert!(shown
        .iter()
        .any(|t| t == "Relaxed state (0.8)\nPlaying gentle music"));
    assert!(shown.iter().any(|t| t == texts::REEVALUATING));
    assert!(shown.iter().any(|t| t == texts::SESSION_STOPPED));

    let stats = rig.telemetry.stats();
    assert_eq!(stats.sessions, 1);
    assert!(stats.reevaluations >= 1);
    assert_eq!(stats.gsr_baseline_source, Some(BaselineSource::DeviceReported));

    let written: Vec<_> = std::fs::read_dir(&config.export_path)
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(written.len(), 1);
    assert!(written[0]
        .file_name()
        .to_string_lossy()
        .starts_with("session_"));
}

#[test]
fn test_stop_during_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(dir.path());
    config.calibration.device_wait = Duration::from_secs(30);

    let transport = ReplayTransport::from_lines([
        "BUTTON:START",
        "LCD:Hello there",
        "GSR_CONDUCTANCE:5.0",
        "GSR_CONDUCTANCE:5.1",
        "BUTTON:STOP",
    ])
    .with_pace(Duration::from_millis(20));
    let mut rig = rig(&config, transport, catalog(true));

    let started = Instant::now();
    run_until(&mut rig, session_ended);
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(
        rig.recorder.states(),
        vec![
            SessionState::Calibrating,
            SessionState::Stopping,
            SessionState::Idle,
        ]
    );
    let report = rig.monitor.machine().last_report().unwrap();
    assert!(report.stopped_by_user);
    assert!(report.baseline.is_none());
    assert!(report.predictions.is_empty());

    // Device LCD text goes to the display verbatim
    assert!(rig.display.shown().iter().any(|t| t == "Hello there"));
}

#[test]
fn test_empty_category_keeps_classifying() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());

    // Stop in Idle is ignored; the session starts on the following Start
    let transport = ReplayTransport::from_lines(["BUTTON:STOP"])
        .then_lines(["BUTTON:START", "BASELINE:GSR:5.0,HR:70.0"])
        .then_lines(vec!["GSR_CONDUCTANCE:5.0"; 100])
        .with_pace(Duration::from_millis(10));
    let mut rig = rig(&config, transport, catalog(false));

    run_until(&mut rig, |recorder| recorder.predictions() >= 2);

    let report = rig.monitor.machine().last_report().unwrap();
    // Ended by shutdown, not by the user
    assert!(!report.stopped_by_user);
    assert!(report.predictions.len() >= 2);
    assert_eq!(report.tracks_played, 0);
    assert!(report.predictions.iter().all(|p| p.item.is_none()));
    assert!(rig
        .display
        .shown()
        .iter()
        .any(|t| t == &texts::empty_category("calming")));
    assert_eq!(rig.monitor.machine().state(), SessionState::Idle);
    assert!(rig.monitor.machine().playback().played().is_empty());
}
