//! Resting-state baseline calibration.
//!
//! The device computes its own baseline and reports it with `BASELINE:`.
//! When that report never arrives the calibrator falls back to the mean of
//! the GSR readings seen while waiting, and finally to fixed defaults. Heart
//! rate has a parallel path gated on finger contact.

use crate::error::InsufficientDataError;
use crate::link::mailbox::{BaselineMailbox, DeviceBaseline};
use crate::sensors::{SensorFeed, SensorReading};
use crate::transparency::SharedTelemetry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where a baseline value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaselineSource {
    DeviceReported,
    Computed,
    Default,
}

impl BaselineSource {
    pub(crate) fn to_code(self) -> u8 {
        match self {
            BaselineSource::DeviceReported => 0,
            BaselineSource::Computed => 1,
            BaselineSource::Default => 2,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BaselineSource::DeviceReported),
            1 => Some(BaselineSource::Computed),
            2 => Some(BaselineSource::Default),
            _ => None,
        }
    }
}

impl fmt::Display for BaselineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineSource::DeviceReported => write!(f, "device-reported"),
            BaselineSource::Computed => write!(f, "computed"),
            BaselineSource::Default => write!(f, "default"),
        }
    }
}

/// Resting-state reference values for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub gsr_baseline: f64,
    pub hr_baseline: f64,
    /// Sample standard deviation behind a computed baseline, 0 when unknown
    pub gsr_spread: f64,
    pub hr_spread: f64,
    /// Provenance of the GSR baseline
    pub source: BaselineSource,
    pub hr_source: BaselineSource,
    pub timestamp: DateTime<Utc>,
}

impl BaselineRecord {
    /// Baseline made only of the configured defaults.
    pub fn defaults(config: &CalibrationConfig) -> Self {
        Self {
            gsr_baseline: config.default_gsr,
            hr_baseline: config.default_hr,
            gsr_spread: 0.0,
            hr_spread: 0.0,
            source: BaselineSource::Default,
            hr_source: BaselineSource::Default,
            timestamp: Utc::now(),
        }
    }
}

/// Calibration timing and fallback values.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// How long to wait for the device's `BASELINE:` report
    pub device_wait: Duration,
    /// Valid GSR readings needed for a computed baseline
    pub min_computed_samples: usize,
    pub default_gsr: f64,
    pub default_hr: f64,
    /// How long to wait for finger contact on the HR sensor
    pub hr_wait: Duration,
    /// Most recent span averaged for the HR baseline
    pub hr_subwindow: Duration,
    pub hr_min_samples: usize,
    pub poll_interval: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            device_wait: Duration::from_secs(18),
            min_computed_samples: 10,
            default_gsr: 0.0,
            default_hr: 70.0,
            hr_wait: Duration::from_secs(10),
            hr_subwindow: Duration::from_secs(5),
            hr_min_samples: 5,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Mean and sample standard deviation of the valid readings.
pub fn computed_baseline(
    readings: &[SensorReading],
    need: usize,
    what: &'static str,
) -> Result<(f64, f64), InsufficientDataError> {
    let values: Vec<f64> = readings.iter().filter_map(SensorReading::valid_value).collect();
    if values.len() < need.max(1) {
        return Err(InsufficientDataError {
            what,
            got: values.len(),
            need,
        });
    }
    let mean = values.iter().mean();
    let spread = if values.len() > 1 {
        values.iter().std_dev()
    } else {
        0.0
    };
    Ok((mean, if spread.is_finite() { spread } else { 0.0 }))
}

/// Produces a [`BaselineRecord`] at the start of each session.
pub struct BaselineCalibrator {
    config: CalibrationConfig,
    gsr: Arc<dyn SensorFeed>,
    hr: Arc<dyn SensorFeed>,
    mailbox: BaselineMailbox,
    telemetry: SharedTelemetry,
}

impl BaselineCalibrator {
    pub fn new(
        config: CalibrationConfig,
        gsr: Arc<dyn SensorFeed>,
        hr: Arc<dyn SensorFeed>,
        mailbox: BaselineMailbox,
        telemetry: SharedTelemetry,
    ) -> Self {
        Self {
            config,
            gsr,
            hr,
            mailbox,
            telemetry,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Run calibration with the configured device wait.
    pub fn calibrate_default(&self, interrupt: &mut dyn FnMut() -> bool) -> Option<BaselineRecord> {
        self.calibrate(self.config.device_wait, interrupt)
    }

    /// Run one calibration phase.
    ///
    /// Always yields a baseline unless `interrupt` returns true, in which
    /// case the phase is abandoned and `None` is returned.
    pub fn calibrate(
        &self,
        timeout: Duration,
        interrupt: &mut dyn FnMut() -> bool,
    ) -> Option<BaselineRecord> {
        let started = Instant::now();
        info!(timeout_ms = timeout.as_millis() as u64, "Calibration started");

        let device = self.wait_for_device(started, timeout, interrupt)?;

        let (gsr_baseline, gsr_spread, source) = match device {
            Some(device) => {
                info!(gsr = device.gsr, hr = device.hr, "Using device-reported baseline");
                (device.gsr, 0.0, BaselineSource::DeviceReported)
            }
            None => {
                let recent = self.gsr.readings_since(started.elapsed());
                match computed_baseline(&recent, self.config.min_computed_samples, "GSR baseline") {
                    Ok((mean, spread)) => {
                        info!(gsr = mean, spread, "Computed GSR baseline from recent readings");
                        (mean, spread, BaselineSource::Computed)
                    }
                    Err(e) => {
                        warn!(error = %e, default = self.config.default_gsr, "Using default GSR baseline");
                        (self.config.default_gsr, 0.0, BaselineSource::Default)
                    }
                }
            }
        };

        let (hr_baseline, hr_spread, hr_source) = match self.calibrate_hr(interrupt)? {
            Some((mean, spread)) => (mean, spread, BaselineSource::Computed),
            None => match device {
                Some(device) if device.hr > 0.0 => (device.hr, 0.0, BaselineSource::DeviceReported),
                _ => {
                    warn!(default = self.config.default_hr, "Using default HR baseline");
                    (self.config.default_hr, 0.0, BaselineSource::Default)
                }
            },
        };

        let record = BaselineRecord {
            gsr_baseline: sanitize(gsr_baseline, self.config.default_gsr),
            hr_baseline: sanitize(hr_baseline, self.config.default_hr),
            gsr_spread,
            hr_spread,
            source,
            hr_source,
            timestamp: Utc::now(),
        };
        self.telemetry.record_baseline(source, hr_source);
        info!(
            gsr = record.gsr_baseline,
            hr = record.hr_baseline,
            %source,
            %hr_source,
            "Calibration complete"
        );
        Some(record)
    }

    /// Poll the mailbox. Outer `None` means interrupted.
    fn wait_for_device(
        &self,
        started: Instant,
        timeout: Duration,
        interrupt: &mut dyn FnMut() -> bool,
    ) -> Option<Option<DeviceBaseline>> {
        loop {
            if interrupt() {
                info!("Calibration interrupted");
                return None;
            }
            if let Some(device) = self.mailbox.take() {
                return Some(Some(device));
            }
            if started.elapsed() >= timeout {
                debug!("No device baseline before timeout");
                return Some(None);
            }
            std::thread::sleep(self.config.poll_interval.min(timeout));
        }
    }

    /// Wait for contact-confirmed HR readings. Outer `None` means interrupted.
    fn calibrate_hr(&self, interrupt: &mut dyn FnMut() -> bool) -> Option<Option<(f64, f64)>> {
        if !self.hr.is_connected() {
            debug!("HR channel not connected, skipping HR calibration");
            return Some(None);
        }

        let started = Instant::now();
        while started.elapsed() < self.config.hr_wait {
            if interrupt() {
                info!("HR calibration interrupted");
                return None;
            }

            let touching = self
                .hr
                .read_latest()
                .is_some_and(|r| r.valid && r.contact);
            if touching {
                let recent: Vec<SensorReading> = self
                    .hr
                    .readings_since(self.config.hr_subwindow)
                    .into_iter()
                    .filter(|r| r.contact)
                    .collect();
                match computed_baseline(&recent, self.config.hr_min_samples, "HR baseline") {
                    Ok((mean, spread)) => {
                        info!(bpm = mean, "HR baseline computed");
                        return Some(Some((mean, spread)));
                    }
                    Err(e) => debug!(error = %e, "Waiting for more HR samples"),
                }
            }
            std::thread::sleep(self.config.poll_interval);
        }
        Some(None)
    }
}

fn sanitize(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}
