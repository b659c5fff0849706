//! Integration tests for the acquisition and analysis pipeline

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use stress_monitor::core::{
    extract_features, BaselineCalibrator, BaselineSource, CalibrationConfig, ClassifierMode,
    DataWindow, RuleParams, StressClassifier, StressLabel, WindowCollector, WindowSample,
    FEATURE_NAMES,
};
use stress_monitor::link::{
    button_queue, BaselineMailbox, ButtonKind, ButtonReceiver, DeviceMirror, Framer,
    ReplayTransport, Router, MESSAGE_PREFIXES,
};
use stress_monitor::sensors::{
    ChannelConfig, DeviceLinkSource, HrBridgeSource, RawSample, SensorChannel, SensorFeed,
    SensorReading, SignalKind,
};
use stress_monitor::transparency::{create_shared_telemetry, SharedTelemetry};

struct DeviceRig {
    channel: SensorChannel,
    buttons: ButtonReceiver,
    mailbox: BaselineMailbox,
    telemetry: SharedTelemetry,
}

fn device_rig(transport: ReplayTransport) -> DeviceRig {
    let telemetry = create_shared_telemetry();
    let (tx, rx) = button_queue(8, telemetry.clone());
    let mailbox = BaselineMailbox::new();
    let router = Router::new(
        tx,
        mailbox.clone(),
        Arc::new(DeviceMirror::new()),
        telemetry.clone(),
    );
    let source = DeviceLinkSource::new(transport, Framer::new(MESSAGE_PREFIXES), router);
    let channel = SensorChannel::new(ChannelConfig::gsr(), Box::new(source), telemetry.clone());
    DeviceRig {
        channel,
        buttons: rx,
        mailbox,
        telemetry,
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn reading(kind: SignalKind, value: f64) -> SensorReading {
    let range = match kind {
        SignalKind::Gsr => ChannelConfig::gsr().range,
        SignalKind::Hr => ChannelConfig::hr().range,
    };
    SensorReading::from_raw(kind, RawSample::new(value), &range, Instant::now())
}

fn window_of(gsr: &[f64], hr: &[f64]) -> DataWindow {
    let now = Instant::now();
    let samples = gsr
        .iter()
        .zip(hr)
        .map(|(g, h)| WindowSample {
            gsr: Some(reading(SignalKind::Gsr, *g)),
            hr: Some(reading(SignalKind::Hr, *h)),
            at: now,
        })
        .collect();
    DataWindow {
        samples,
        start: now,
        end: now,
        started_at: chrono::Utc::now(),
        duration: Duration::from_secs(1),
        baseline: None,
    }
}

fn rule_classifier() -> StressClassifier {
    StressClassifier::new(
        ClassifierMode::RuleBased(RuleParams::default()),
        16,
        create_shared_telemetry(),
    )
}

#[test]
fn test_conductance_frames_reach_channel() {
    let transport = ReplayTransport::from_lines(["GSR_CONDUCTANCE:7.34", "GSR_CONDUCTANCE:12.5"]);
    let mut rig = device_rig(transport);
    rig.channel.start().unwrap();

    assert!(wait_for(|| rig
        .channel
        .read_latest()
        .is_some_and(|r| r.value == 12.5)));
    assert!(rig.channel.is_connected());
    assert_eq!(rig.telemetry.stats().gsr_readings, 2);
    rig.channel.stop();
}

#[test]
fn test_concatenated_frames_split() {
    let transport = ReplayTransport::from_chunks(["GSR_CONDUCTANCE:7.34GSR_CONDUCTANCE:8.1\n"]);
    let mut rig = device_rig(transport);
    rig.channel.start().unwrap();

    let feed = rig.channel.feed();
    assert!(wait_for(|| feed.history_len() == 2));
    let values: Vec<f64> = feed
        .readings_since(Duration::from_secs(10))
        .iter()
        .map(|r| r.value)
        .collect();
    assert_eq!(values, vec![7.34, 8.1]);
    rig.channel.stop();
}

#[test]
fn test_control_messages_routed() {
    let transport = ReplayTransport::from_chunks([
        "BUTTON:START\nBASELINE:GSR:4.5,HR:72.0\n",
        "garbage line\nGSR_CONDUCTANCE:abc\n",
        "BUTTON:STOP\n",
    ]);
    let mut rig = device_rig(transport);
    rig.channel.start().unwrap();

    assert!(wait_for(|| rig.buttons.pending() == 2));
    assert_eq!(rig.buttons.poll().map(|e| e.kind), Some(ButtonKind::Start));
    assert_eq!(rig.buttons.poll().map(|e| e.kind), Some(ButtonKind::Stop));

    let baseline = rig.mailbox.take().unwrap();
    assert_eq!((baseline.gsr, baseline.hr), (4.5, 72.0));

    // Malformed and unknown frames never become readings
    assert!(rig.channel.read_latest().is_none());
    assert!(rig.telemetry.stats().frames_dropped >= 1);
    rig.channel.stop();
}

#[test]
fn test_split_lines_across_reads() {
    let transport = ReplayTransport::from_chunks(["GSR_CONDUC", "TANCE:9.", "75\n"]);
    let mut rig = device_rig(transport);
    rig.channel.start().unwrap();

    assert!(wait_for(|| rig
        .channel
        .read_latest()
        .is_some_and(|r| r.value == 9.75)));
    rig.channel.stop();
}

#[test]
fn test_hr_bridge_contact() {
    let telemetry = create_shared_telemetry();
    let transport = ReplayTransport::from_lines(["HR:72", "HR:80,CONTACT:0", "HR:300"]);
    let source = HrBridgeSource::new(transport, 128, telemetry.clone());
    let mut channel = SensorChannel::new(ChannelConfig::hr(), Box::new(source), telemetry);
    channel.start().unwrap();

    let feed = channel.feed();
    assert!(wait_for(|| feed.history_len() == 3));
    let readings = feed.readings_since(Duration::from_secs(10));
    assert!(readings[0].valid && readings[0].contact);
    assert!(!readings[1].valid && !readings[1].contact);
    assert!(!readings[2].valid);
    channel.stop();
}

#[test]
fn test_invalid_window_gives_zero_vector() {
    let telemetry = create_shared_telemetry();
    let gsr = SensorChannel::unconnected(ChannelConfig::gsr(), telemetry.clone());
    let hr = SensorChannel::unconnected(ChannelConfig::hr(), telemetry.clone());
    let collector = WindowCollector::new(
        Arc::new(gsr.feed()),
        Arc::new(hr.feed()),
        50.0,
        Duration::from_millis(40),
        telemetry.clone(),
    );

    let window = collector
        .collect_window(Duration::from_millis(100), None, &mut || false)
        .unwrap();
    assert_eq!(window.len(), 5);
    assert_eq!(window.complete_ticks(), 0);

    let features = extract_features(window);
    assert_eq!(features.iter().count(), FEATURE_NAMES.len());
    assert!(features.iter().all(|(_, v)| v == 0.0));
    assert_eq!(telemetry.stats().windows_completed, 1);
}

#[test]
fn test_relaxed_window_without_baseline() {
    let features = extract_features(window_of(&[5.0; 10], &[70.0; 10]));
    let mut classifier = rule_classifier();
    let prediction = classifier.predict(&features);

    assert!((prediction.score.unwrap() - 0.1).abs() < 1e-9);
    assert_eq!(prediction.label, StressLabel::NoStress);
    assert_eq!(prediction.confidence, 0.8);
}

#[test]
fn test_stressed_window_without_baseline() {
    let features = extract_features(window_of(&[30.0; 10], &[110.0; 10]));
    let mut classifier = rule_classifier();
    let prediction = classifier.predict(&features);

    assert_eq!(prediction.score, Some(1.0));
    assert_eq!(prediction.label, StressLabel::Stress);
    assert_eq!(prediction.confidence, 0.8);
}

#[test]
fn test_calibration_falls_back_to_defaults() {
    let telemetry = create_shared_telemetry();
    let transport = ReplayTransport::from_lines(["GSR_CONDUCTANCE:6.0"; 4]);
    let mut rig = device_rig(transport);
    rig.channel.start().unwrap();
    assert!(wait_for(|| rig.channel.feed().history_len() == 4));

    let hr = SensorChannel::unconnected(ChannelConfig::hr(), telemetry.clone());
    let config = CalibrationConfig {
        device_wait: Duration::from_millis(50),
        poll_interval: Duration::from_millis(5),
        ..CalibrationConfig::default()
    };
    let calibrator = BaselineCalibrator::new(
        config,
        Arc::new(rig.channel.feed()),
        Arc::new(hr.feed()),
        rig.mailbox.clone(),
        telemetry.clone(),
    );

    let record = calibrator.calibrate_default(&mut || false).unwrap();
    assert_eq!(record.source, BaselineSource::Default);
    assert_eq!(record.hr_source, BaselineSource::Default);
    assert_eq!(record.gsr_baseline, 0.0);
    assert_eq!(record.hr_baseline, 70.0);
    rig.channel.stop();
}

#[test]
fn test_calibration_uses_device_report() {
    let telemetry = create_shared_telemetry();
    let transport = ReplayTransport::from_lines(["BASELINE:GSR:4.2,HR:68.5"]);
    let mut rig = device_rig(transport);
    rig.channel.start().unwrap();

    let hr = SensorChannel::unconnected(ChannelConfig::hr(), telemetry.clone());
    let config = CalibrationConfig {
        device_wait: Duration::from_secs(2),
        poll_interval: Duration::from_millis(5),
        ..CalibrationConfig::default()
    };
    let calibrator = BaselineCalibrator::new(
        config,
        Arc::new(rig.channel.feed()),
        Arc::new(hr.feed()),
        rig.mailbox.clone(),
        telemetry,
    );

    let record = calibrator.calibrate_default(&mut || false).unwrap();
    assert_eq!(record.source, BaselineSource::DeviceReported);
    assert_eq!(record.gsr_baseline, 4.2);
    // HR is not connected, so the device value is used
    assert_eq!(record.hr_source, BaselineSource::DeviceReported);
    assert_eq!(record.hr_baseline, 68.5);
    rig.channel.stop();
}
