//! Interfaces the session drives, and the observer it reports to.

use super::machine::SessionState;
use crate::core::StressLabel;
use crate::error::PlaybackError;
use std::time::Duration;

/// Text output surface (character LCD, console, ...).
pub trait Display: Send + Sync {
    fn show(&self, text: &str);
}

/// Audio output.
pub trait Playback: Send {
    /// Start playing an item and return its duration.
    fn play(&mut self, item_id: &str) -> Result<Duration, PlaybackError>;

    fn stop(&mut self);

    fn is_playing(&self) -> bool;
}

/// Source of playable items.
pub trait Library: Send {
    /// Pick an item from a category, or `None` if the category is empty.
    fn select(&mut self, category: &str) -> Option<String>;
}

/// Receives session events. All methods default to doing nothing.
pub trait SessionObserver: Send {
    fn on_prediction(&self, _label: StressLabel, _confidence: f64) {}

    fn on_state_change(&self, _state: SessionState) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
