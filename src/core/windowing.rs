//! Fixed-rate sampling of the sensor channels into analysis windows.
//!
//! The collector ticks at the sampling rate and records whatever each
//! channel's latest reading is at that moment. A tick with no fresh reading
//! still produces an entry, so a window always holds one entry per tick.

use super::baseline::BaselineRecord;
use crate::sensors::{SensorFeed, SensorReading};
use crate::transparency::SharedTelemetry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One tick of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    pub gsr: Option<SensorReading>,
    pub hr: Option<SensorReading>,
    /// When the tick fired
    pub at: Instant,
}

/// A sealed batch of samples for one classification cycle.
#[derive(Debug, Clone)]
pub struct DataWindow {
    pub samples: Vec<WindowSample>,
    pub start: Instant,
    pub end: Instant,
    pub started_at: DateTime<Utc>,
    /// Requested duration
    pub duration: Duration,
    pub baseline: Option<BaselineRecord>,
}

impl DataWindow {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Seconds between the window start and a tick.
    pub fn elapsed_secs(&self, at: Instant) -> f64 {
        at.saturating_duration_since(self.start).as_secs_f64()
    }

    /// Ticks where both channels had a valid reading.
    pub fn complete_ticks(&self) -> usize {
        self.samples
            .iter()
            .filter(|s| {
                s.gsr.is_some_and(|r| r.valid) && s.hr.is_some_and(|r| r.valid)
            })
            .count()
    }
}

/// Samples the two channels into [`DataWindow`]s.
pub struct WindowCollector {
    gsr: Arc<dyn SensorFeed>,
    hr: Arc<dyn SensorFeed>,
    sampling_rate_hz: f64,
    quick_window: Duration,
    telemetry: SharedTelemetry,
}

impl WindowCollector {
    pub fn new(
        gsr: Arc<dyn SensorFeed>,
        hr: Arc<dyn SensorFeed>,
        sampling_rate_hz: f64,
        quick_window: Duration,
        telemetry: SharedTelemetry,
    ) -> Self {
        Self {
            gsr,
            hr,
            sampling_rate_hz: if sampling_rate_hz > 0.0 {
                sampling_rate_hz
            } else {
                10.0
            },
            quick_window,
            telemetry,
        }
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate_hz
    }

    pub fn quick_window(&self) -> Duration {
        self.quick_window
    }

    /// Sample both channels for `window_size` at `sampling_rate` Hz.
    ///
    /// `interrupt` is checked once per tick; when it returns true the window
    /// is abandoned and `None` is returned.
    pub fn collect(
        &self,
        window_size: Duration,
        sampling_rate: f64,
        baseline: Option<&BaselineRecord>,
        interrupt: &mut dyn FnMut() -> bool,
    ) -> Option<DataWindow> {
        let rate = if sampling_rate > 0.0 {
            sampling_rate
        } else {
            self.sampling_rate_hz
        };
        let interval = Duration::from_secs_f64(1.0 / rate);
        let exact = window_size.as_secs_f64() * rate;
        let ticks = if (exact - exact.round()).abs() < 1e-6 {
            exact.round()
        } else {
            exact.ceil()
        };
        let ticks = (ticks as usize).max(1);

        info!(
            window_ms = window_size.as_millis() as u64,
            rate,
            ticks,
            "Collecting window"
        );

        let start = Instant::now();
        let started_at = Utc::now();
        let mut samples = Vec::with_capacity(ticks);

        for tick in 0..ticks {
            if interrupt() {
                info!(collected = samples.len(), "Window collection interrupted");
                return None;
            }

            samples.push(WindowSample {
                gsr: self.gsr.read_latest(),
                hr: self.hr.read_latest(),
                at: Instant::now(),
            });

            // Sleep to the next tick boundary measured from the start, so
            // slow reads do not accumulate drift
            let next = start + interval.mul_f64((tick + 1) as f64);
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            }
        }

        let window = DataWindow {
            samples,
            start,
            end: Instant::now(),
            started_at,
            duration: window_size,
            baseline: baseline.cloned(),
        };
        self.telemetry.record_window_completed();
        debug!(
            ticks = window.len(),
            complete = window.complete_ticks(),
            "Window sealed"
        );
        Some(window)
    }

    /// Collect a window at the configured rate.
    pub fn collect_window(
        &self,
        window_size: Duration,
        baseline: Option<&BaselineRecord>,
        interrupt: &mut dyn FnMut() -> bool,
    ) -> Option<DataWindow> {
        self.collect(window_size, self.sampling_rate_hz, baseline, interrupt)
    }

    /// Shorter collection used for mid-playback re-evaluation.
    pub fn collect_quick(
        &self,
        duration: Duration,
        baseline: Option<&BaselineRecord>,
        interrupt: &mut dyn FnMut() -> bool,
    ) -> Option<DataWindow> {
        self.collect(duration, self.sampling_rate_hz, baseline, interrupt)
    }
}
