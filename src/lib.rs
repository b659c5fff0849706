//! Stress Monitor - closed-loop physiological stress detection.
//!
//! This library reads skin conductance and heart rate from a microcontroller
//! over a serial line, calibrates a resting baseline, classifies windows of
//! data as stress or no stress, and drives music playback from the result.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Stress Monitor                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────┐   ┌──────────────┐                 │
//! │  │ Transport │──▶│  Framer  │──▶│    Router    │──▶ buttons ──┐  │
//! │  │ (serial)  │   │ (lines)  │   │  (prefixes)  │──▶ baseline  │  │
//! │  └───────────┘   └──────────┘   └──────────────┘              │  │
//! │                                        │                      │  │
//! │                                        ▼                      ▼  │
//! │  ┌───────────┐   ┌──────────┐   ┌──────────────┐   ┌───────────┐ │
//! │  │  Channel  │──▶│  Window  │──▶│   Features   │──▶│  Session  │ │
//! │  │ (GSR, HR) │   │(10 Hz)   │   │ (15 values)  │   │  machine  │ │
//! │  └───────────┘   └──────────┘   └──────────────┘   └───────────┘ │
//! │         │                                            │      │    │
//! │         ▼                                            ▼      ▼    │
//! │  ┌───────────┐                               ┌─────────┐ ┌─────┐ │
//! │  │ Telemetry │                               │Classify │ │Play │ │
//! │  └───────────┘                               └─────────┘ └─────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use stress_monitor::link::{Framer, Message, MESSAGE_PREFIXES};
//!
//! let mut framer = Framer::new(MESSAGE_PREFIXES);
//! framer.feed(b"GSR_CONDUCTANCE:7.34GSR_CONDUCTANCE:8.1\n");
//!
//! let frames: Vec<String> = framer.drain().collect();
//! assert_eq!(frames.len(), 2);
//! assert_eq!(frames[1].parse::<Message>(), Ok(Message::Conductance(8.1)));
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod link;
pub mod monitor;
pub mod sensors;
pub mod session;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use config::Config;
pub use core::{
    extract_features, BaselineCalibrator, BaselineRecord, BaselineSource, ClassifierMode,
    FeatureVector, Prediction, StressClassifier, StressLabel, WindowCollector,
};
pub use link::{Framer, Message, ReplayTransport, Router, SerialTransport, Transport};
pub use monitor::Monitor;
pub use sensors::{ChannelFeed, SensorChannel, SensorFeed, SensorReading, SignalKind};
pub use session::{
    Display, Library, Playback, SessionObserver, SessionState, SessionStateMachine,
};
pub use transparency::{SharedTelemetry, Telemetry, TelemetryStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice shown before a live session.
pub const DATA_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                   STRESS MONITOR - DATA NOTICE                   ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  ✓ WHAT IS KEPT:                                                 ║
║    • Baseline values and where they came from                    ║
║    • Each stress prediction and the item played after it         ║
║    • Aggregate counters (frames, readings, predictions)          ║
║                                                                  ║
║  ✗ WHAT IS NEVER KEPT:                                           ║
║    • Raw sensor samples beyond the current window                ║
║                                                                  ║
║  This is not a medical device. Predictions are heuristic.        ║
║                                                                  ║
║  View counters anytime with:                                     ║
║    stress-monitor status                                         ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
