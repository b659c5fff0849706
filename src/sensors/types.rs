//! Core types for physiological readings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// The two physiological signals the monitor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Skin conductance (electrodermal activity), µS
    Gsr,
    /// Heart rate, BPM
    Hr,
}

impl SignalKind {
    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Gsr => "GSR",
            SignalKind::Hr => "HR",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            SignalKind::Gsr => "µS",
            SignalKind::Hr => "BPM",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value as parsed off the wire, before range validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub value: f64,
    /// Finger contact; sources without a contact sensor report true
    pub contact: bool,
}

impl RawSample {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            contact: true,
        }
    }

    pub fn with_contact(value: f64, contact: bool) -> Self {
        Self { value, contact }
    }
}

/// Closed range of plausible values for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// One published reading of a sensor channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub value: f64,
    pub at: Instant,
    /// In range (and, for HR, taken with finger contact)
    pub valid: bool,
    pub contact: bool,
}

impl SensorReading {
    /// Validate a raw sample against the channel's range.
    pub fn from_raw(kind: SignalKind, raw: RawSample, range: &ValueRange, at: Instant) -> Self {
        let in_range = range.contains(raw.value);
        let valid = match kind {
            SignalKind::Gsr => in_range,
            SignalKind::Hr => in_range && raw.contact,
        };
        Self {
            value: raw.value,
            at,
            valid,
            contact: raw.contact,
        }
    }

    /// Value if the reading is valid.
    pub fn valid_value(&self) -> Option<f64> {
        self.valid.then_some(self.value)
    }
}
