//! Physiological sensor channels.
//!
//! Each channel runs a dedicated worker that pulls samples from a source,
//! publishes the newest one through a lock-free slot and keeps a bounded
//! history for calibration.

pub mod channel;
pub mod slot;
pub mod sources;
pub mod types;

// Re-export commonly used types
pub use channel::{ChannelConfig, ChannelFeed, SensorChannel, SensorFeed};
pub use slot::LatestSlot;
pub use sources::{DeviceLinkSource, HrBridgeSource, SampleSource};
pub use types::{RawSample, SensorReading, SignalKind, ValueRange};
