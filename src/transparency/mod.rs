//! Telemetry for the stress monitor.
//!
//! This module tracks what the pipeline has processed so the operator can
//! audit a run without reading raw sensor values.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_telemetry, create_shared_telemetry_with_persistence, SharedTelemetry, Telemetry,
    TelemetryStats,
};
