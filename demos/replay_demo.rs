//! Demonstration of the stress monitor on a synthetic recording.
//!
//! This example shows how to:
//! 1. Build a replayed device link and heart-rate bridge
//! 2. Wire them into a monitor with console and simulated collaborators
//! 3. Run one session from a START press through classification and playback
//! 4. Read the session report and telemetry afterwards
//!
//! Run with: cargo run --example replay_demo

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stress_monitor::{
    config::Config,
    link::ReplayTransport,
    session::{Catalog, CatalogItem, CatalogLibrary, ConsoleDisplay, SimulatedPlayback},
    transparency::create_shared_telemetry,
    Monitor, DATA_NOTICE,
};

const PACE: Duration = Duration::from_millis(50);
const RUN_FOR: Duration = Duration::from_secs(12);

/// A calm start that turns into rising arousal.
fn device_lines() -> Vec<String> {
    let mut lines = vec!["BUTTON:START".to_string(), "CALIBRATION:STARTED".to_string()];
    for i in 0..=10 {
        lines.push(format!("BASELINE_PROGRESS:{i}/10"));
        lines.push("GSR_CONDUCTANCE:6.0".to_string());
    }
    lines.push("CALIBRATION:COMPLETE".to_string());
    lines.push("BASELINE:GSR:6.0,HR:68.0".to_string());
    lines.push("SESSION:STARTED".to_string());
    for i in 0..200 {
        let gsr = 6.0 + f64::from(i) * 0.1;
        lines.push(format!("GSR_CONDUCTANCE:{gsr:.2}"));
    }
    lines
}

fn hr_lines() -> Vec<String> {
    (0..240)
        .map(|i| format!("HR:{:.0},CONTACT:1", 68.0 + f64::from(i) * 0.15))
        .collect()
}

fn demo_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.insert(
        "calming".to_string(),
        vec![CatalogItem {
            id: "gentle-piano".to_string(),
            duration_secs: 3.0,
        }],
    );
    catalog.insert(
        "stress_relief".to_string(),
        vec![CatalogItem {
            id: "slow-strings".to_string(),
            duration_secs: 3.0,
        }],
    );
    catalog
}

fn main() {
    println!("Stress Monitor - Replay Demo");
    println!("============================");
    println!("{DATA_NOTICE}");

    let mut config = Config::default();
    config.export_path = std::env::temp_dir().join("stress-monitor-demo");
    config.calibration.device_wait = Duration::from_secs(3);
    config.calibration.hr_wait = Duration::from_secs(2);
    config.calibration.hr_subwindow = Duration::from_secs(1);
    config.window.window = Duration::from_secs(2);
    config.window.quick_window = Duration::from_millis(500);
    config.session.reevaluation_lead = Duration::from_secs(1);

    let catalog = demo_catalog();
    let telemetry = create_shared_telemetry();
    let mut monitor = Monitor::assemble(
        &config,
        ReplayTransport::from_lines(device_lines()).with_pace(PACE),
        Some(ReplayTransport::from_lines(hr_lines()).with_pace(PACE)),
        Arc::new(ConsoleDisplay),
        SimulatedPlayback::from_catalog(&catalog),
        CatalogLibrary::new(catalog),
        telemetry.clone(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            thread::sleep(RUN_FOR);
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    println!("Running for {}s...", RUN_FOR.as_secs());
    println!();
    if let Err(e) = monitor.run(&shutdown) {
        eprintln!("Error: {e}");
        return;
    }

    println!();
    if let Some(report) = monitor.machine().last_report() {
        println!("Session {}", report.id);
        if let Some(baseline) = &report.baseline {
            println!(
                "  Baseline: GSR {:.1} µS ({}), HR {:.1} BPM ({})",
                baseline.gsr_baseline, baseline.source, baseline.hr_baseline, baseline.hr_source
            );
        }
        for entry in &report.predictions {
            println!(
                "  {:?}: {} ({:.1}) -> {}",
                entry.kind,
                entry.prediction.label,
                entry.prediction.confidence,
                entry.item.as_deref().unwrap_or("-")
            );
        }
    }

    let stats = monitor.machine().classifier().statistics();
    println!();
    println!(
        "Predictions: {} (stress {}, no stress {})",
        stats.count, stats.stress, stats.no_stress
    );
    println!();
    println!("{}", telemetry.summary());
}
