//! Session orchestration and its collaborators.
//!
//! This module contains:
//! - The button-driven session state machine
//! - Interfaces for display, playback and the item library
//! - Re-evaluation scheduling during playback
//! - Per-session JSON reports
//! - Console and simulated reference collaborators

pub mod collaborators;
pub mod machine;
pub mod reevaluation;
pub mod reference;
pub mod report;
pub mod texts;

// Re-export commonly used types
pub use collaborators::{Display, Library, NoopObserver, Playback, SessionObserver};
pub use machine::{SessionConfig, SessionPipeline, SessionState, SessionStateMachine};
pub use reevaluation::ReEvaluationSchedule;
pub use reference::{Catalog, CatalogItem, CatalogLibrary, ConsoleDisplay, SimulatedPlayback};
pub use report::{PredictionKind, ReportEntry, SessionReport};
