//! Error taxonomy for the acquisition and classification pipeline.
//!
//! None of these errors is fatal to the process. Each one has a documented
//! degradation path: transports are retried, malformed frames are dropped,
//! thin data falls back to defaults and a missing model falls back to rules.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the byte link underneath a sensor channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port could not be opened
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    /// A read on an open port failed
    #[error("read failed on {port}: {reason}")]
    Read { port: String, reason: String },

    /// Operation attempted on a closed transport
    #[error("transport {0} is not open")]
    NotOpen(String),
}

/// A frame or field that does not match the line protocol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// No known prefix at the start of the frame
    #[error("unknown message prefix in {0:?}")]
    UnknownPrefix(String),

    /// A numeric field did not parse
    #[error("invalid number for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// A numeric field parsed but is NaN or infinite
    #[error("non-finite value for {field}")]
    NonFinite { field: &'static str },

    /// The payload shape is wrong for the prefix
    #[error("malformed {prefix} payload: {payload:?}")]
    MalformedPayload {
        prefix: &'static str,
        payload: String,
    },
}

/// Lifecycle misuse of a sensor channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("{0} channel is already running")]
    AlreadyRunning(&'static str),

    /// The channel has no sample source, or its worker was detached with it
    #[error("{0} channel has no sample source")]
    NoSource(&'static str),

    #[error("failed to spawn {0} worker: {1}")]
    Spawn(&'static str, String),
}

/// Too few valid samples to compute a statistic.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("insufficient {what}: got {got} valid samples, need {need}")]
pub struct InsufficientDataError {
    pub what: &'static str,
    pub got: usize,
    pub need: usize,
}

/// The ensemble model could not be loaded.
#[derive(Debug, Error)]
pub enum ClassifierUnavailableError {
    #[error("model file {path:?} could not be read: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("model file {path:?} is not valid JSON: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("model is inconsistent: {0}")]
    Invalid(String),
}

/// The playback collaborator could not start an item.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("unknown item {0:?}")]
    UnknownItem(String),

    #[error("playback failed: {0}")]
    Failed(String),
}

/// The session report could not be written.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = ParseError::InvalidNumber {
            field: "conductance",
            value: "abc".to_string(),
        };
        assert_eq!(e.to_string(), "invalid number for conductance: \"abc\"");

        let e = InsufficientDataError {
            what: "GSR baseline",
            got: 3,
            need: 10,
        };
        assert!(e.to_string().contains("got 3"));
    }
}
