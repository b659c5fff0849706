//! Display texts. Lines are separated by `\n`.

use crate::core::StressLabel;

/// Width of progress bars, in glyphs.
pub const BAR_WIDTH: usize = 15;

/// Device-side calibration length the countdown bar is scaled to.
const DEVICE_CALIBRATION_SECS: u32 = 10;

pub const READY: &str = "System Ready\nPress START to begin";
pub const CALIBRATION_START: &str = "Starting Calibration\nPlease remain still...";
pub const CALIBRATION_COMPLETE: &str = "Calibration complete!\nStarting session...";
pub const CALIBRATION_DEFAULTS: &str = "Calibration complete!\nUsing default values";
pub const SESSION_START: &str = "Therapy session started\nAnalyzing your state...";
pub const REEVALUATING: &str = "Re-evaluating your state...";
pub const SESSION_STOPPED: &str = "Session stopped.\nPress START for new session";
pub const SHUTTING_DOWN: &str = "System shutting down...";

/// `█` for the filled part, `░` for the rest.
pub fn progress_bar(filled: usize) -> String {
    let filled = filled.min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

/// Outcome of a classification.
pub fn prediction(label: StressLabel, confidence: f64) -> String {
    match label {
        StressLabel::Stress => format!("Stress detected ({confidence:.1})\nPlaying calming music"),
        StressLabel::NoStress => format!("Relaxed state ({confidence:.1})\nPlaying gentle music"),
    }
}

/// Device baseline collection progress.
pub fn baseline_collection(current: u32, total: u32) -> String {
    if total == 0 {
        return format!("Collecting Data\nSamples: {current}");
    }
    let percentage = f64::from(current) / f64::from(total) * 100.0;
    let filled = (percentage * 0.15).max(0.0) as usize;
    format!("Collecting Data\n[{}] {current}/{total}", progress_bar(filled))
}

/// Calibration countdown.
pub fn calibration_progress(remaining_secs: u32) -> String {
    if remaining_secs == 0 {
        return "Calibration\nComplete!".to_string();
    }
    let elapsed = DEVICE_CALIBRATION_SECS.saturating_sub(remaining_secs);
    let filled = (f64::from(elapsed) * 1.5) as usize;
    format!("Calibrating...\n[{}] {remaining_secs}s", progress_bar(filled))
}

pub fn baseline_data(gsr: f64, hr: f64) -> String {
    format!("Baseline Data\nGSR: {gsr:.1}μS\nHR: {hr:.1} BPM")
}

pub fn sensor_status(gsr_connected: bool, hr_connected: bool) -> String {
    let mark = |ok: bool| if ok { "✓" } else { "✗" };
    format!(
        "Sensors: GSR{} HR{}\nSystem Ready",
        mark(gsr_connected),
        mark(hr_connected)
    )
}

pub fn empty_category(category: &str) -> String {
    format!("No music available\n{category}")
}

/// Expand a device LCD command (the payload of `LCD:`) into display text.
///
/// Returns `None` for free text that is not a known command.
pub fn device_command(payload: &str) -> Option<String> {
    match payload {
        "CALIBRATION_IN_PROGRESS" => Some(CALIBRATION_START.to_string()),
        "CALIBRATION_COMPLETE" => Some("Calibration Complete!\nStarting session...".to_string()),
        "SESSION_ACTIVE" => Some("Session Active\nMonitoring".to_string()),
        "READY" => Some(READY.to_string()),
        other => other
            .strip_prefix("CALIBRATION_PROGRESS:")
            .and_then(|secs| secs.trim().parse::<u32>().ok())
            .map(calibration_progress),
    }
}
