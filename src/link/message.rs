//! Message grammar of the device line protocol.

use crate::error::ParseError;
use std::fmt;
use std::str::FromStr;

pub const PREFIX_CONDUCTANCE: &str = "GSR_CONDUCTANCE:";
pub const PREFIX_BUTTON: &str = "BUTTON:";
pub const PREFIX_BASELINE: &str = "BASELINE:";
pub const PREFIX_BASELINE_PROGRESS: &str = "BASELINE_PROGRESS:";
pub const PREFIX_CALIBRATION: &str = "CALIBRATION:";
pub const PREFIX_SESSION: &str = "SESSION:";
pub const PREFIX_STATUS: &str = "STATUS:";
pub const PREFIX_LCD: &str = "LCD:";

/// Every prefix the framer splits on.
pub const MESSAGE_PREFIXES: &[&str] = &[
    PREFIX_CONDUCTANCE,
    PREFIX_BUTTON,
    PREFIX_BASELINE,
    PREFIX_BASELINE_PROGRESS,
    PREFIX_CALIBRATION,
    PREFIX_SESSION,
    PREFIX_STATUS,
    PREFIX_LCD,
];

/// Physical button on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ButtonKind {
    Start,
    Stop,
}

/// Calibration marker sent by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMarker {
    Started,
    Complete,
}

/// Device-side status echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Idle,
    Calibrating,
    SessionActive,
    /// Calibrating with the given number of seconds left
    CalibratingRemaining(u32),
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Idle => write!(f, "idle"),
            DeviceStatus::Calibrating => write!(f, "calibrating"),
            DeviceStatus::SessionActive => write!(f, "session active"),
            DeviceStatus::CalibratingRemaining(secs) => write!(f, "calibrating ({secs}s left)"),
        }
    }
}

/// One parsed protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Conductance(f64),
    Button(ButtonKind),
    Baseline { gsr: f64, hr: f64 },
    BaselineProgress { current: u32, total: u32 },
    Calibration(CalibrationMarker),
    SessionStarted,
    Status(DeviceStatus),
    Lcd(String),
}

impl FromStr for Message {
    type Err = ParseError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        // Longer prefix first: BASELINE_PROGRESS: also starts with BASELINE
        if let Some(payload) = frame.strip_prefix(PREFIX_BASELINE_PROGRESS) {
            return parse_progress(payload);
        }
        if let Some(payload) = frame.strip_prefix(PREFIX_BASELINE) {
            return parse_baseline(payload);
        }
        if let Some(payload) = frame.strip_prefix(PREFIX_CONDUCTANCE) {
            return parse_finite(payload, "conductance").map(Message::Conductance);
        }
        if let Some(payload) = frame.strip_prefix(PREFIX_BUTTON) {
            return match payload.trim() {
                "START" => Ok(Message::Button(ButtonKind::Start)),
                "STOP" => Ok(Message::Button(ButtonKind::Stop)),
                other => Err(malformed(PREFIX_BUTTON, other)),
            };
        }
        if let Some(payload) = frame.strip_prefix(PREFIX_CALIBRATION) {
            return match payload.trim() {
                "STARTED" => Ok(Message::Calibration(CalibrationMarker::Started)),
                "COMPLETE" => Ok(Message::Calibration(CalibrationMarker::Complete)),
                other => Err(malformed(PREFIX_CALIBRATION, other)),
            };
        }
        if let Some(payload) = frame.strip_prefix(PREFIX_SESSION) {
            return match payload.trim() {
                "STARTED" => Ok(Message::SessionStarted),
                other => Err(malformed(PREFIX_SESSION, other)),
            };
        }
        if let Some(payload) = frame.strip_prefix(PREFIX_STATUS) {
            return parse_status(payload);
        }
        if let Some(payload) = frame.strip_prefix(PREFIX_LCD) {
            return Ok(Message::Lcd(payload.to_string()));
        }
        Err(ParseError::UnknownPrefix(frame.to_string()))
    }
}

fn malformed(prefix: &'static str, payload: &str) -> ParseError {
    ParseError::MalformedPayload {
        prefix,
        payload: payload.to_string(),
    }
}

/// Parse a float field, rejecting NaN and infinities.
pub fn parse_finite(text: &str, field: &'static str) -> Result<f64, ParseError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidNumber {
            field,
            value: text.trim().to_string(),
        })?;
    if !value.is_finite() {
        return Err(ParseError::NonFinite { field });
    }
    Ok(value)
}

fn parse_baseline(payload: &str) -> Result<Message, ParseError> {
    let mut gsr = None;
    let mut hr = None;

    for part in payload.split(',') {
        let (key, value) = part
            .split_once(':')
            .ok_or_else(|| malformed(PREFIX_BASELINE, payload))?;
        match key.trim() {
            "GSR" if gsr.is_none() => gsr = Some(parse_finite(value, "baseline GSR")?),
            "HR" if hr.is_none() => hr = Some(parse_finite(value, "baseline HR")?),
            _ => return Err(malformed(PREFIX_BASELINE, payload)),
        }
    }

    match (gsr, hr) {
        (Some(gsr), Some(hr)) if gsr >= 0.0 && hr >= 0.0 => Ok(Message::Baseline { gsr, hr }),
        _ => Err(malformed(PREFIX_BASELINE, payload)),
    }
}

fn parse_progress(payload: &str) -> Result<Message, ParseError> {
    let (current, total) = payload
        .split_once('/')
        .ok_or_else(|| malformed(PREFIX_BASELINE_PROGRESS, payload))?;
    let current: u32 = current
        .trim()
        .parse()
        .map_err(|_| malformed(PREFIX_BASELINE_PROGRESS, payload))?;
    let total: u32 = total
        .trim()
        .parse()
        .map_err(|_| malformed(PREFIX_BASELINE_PROGRESS, payload))?;
    Ok(Message::BaselineProgress { current, total })
}

fn parse_status(payload: &str) -> Result<Message, ParseError> {
    let payload = payload.trim();
    let status = match payload {
        "IDLE" => DeviceStatus::Idle,
        "CALIBRATING" => DeviceStatus::Calibrating,
        "SESSION_ACTIVE" => DeviceStatus::SessionActive,
        other => {
            let secs = other
                .strip_prefix("CALIBRATING,REMAINING:")
                .and_then(|s| s.trim().parse::<u32>().ok())
                .ok_or_else(|| malformed(PREFIX_STATUS, other))?;
            DeviceStatus::CalibratingRemaining(secs)
        }
    };
    Ok(Message::Status(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conductance() {
        assert_eq!(
            "GSR_CONDUCTANCE:7.34".parse::<Message>(),
            Ok(Message::Conductance(7.34))
        );
        assert!(matches!(
            "GSR_CONDUCTANCE:abc".parse::<Message>(),
            Err(ParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            "GSR_CONDUCTANCE:NaN".parse::<Message>(),
            Err(ParseError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_parse_baseline_all_or_nothing() {
        assert_eq!(
            "BASELINE:GSR:4.2,HR:71.5".parse::<Message>(),
            Ok(Message::Baseline { gsr: 4.2, hr: 71.5 })
        );
        assert!("BASELINE:GSR:4.2".parse::<Message>().is_err());
        assert!("BASELINE:GSR:4.2,HR:".parse::<Message>().is_err());
        assert!("BASELINE:GSR:x,HR:70".parse::<Message>().is_err());
        assert!("BASELINE:GSR:-1,HR:70".parse::<Message>().is_err());
        assert!("BASELINE:GSR:1,GSR:2".parse::<Message>().is_err());
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(
            "BASELINE_PROGRESS:10/50".parse::<Message>(),
            Ok(Message::BaselineProgress {
                current: 10,
                total: 50
            })
        );
        assert!("BASELINE_PROGRESS:10".parse::<Message>().is_err());
        assert!("BASELINE_PROGRESS:a/b".parse::<Message>().is_err());
    }

    #[test]
    fn test_parse_status_variants() {
        assert_eq!(
            "STATUS:IDLE".parse::<Message>(),
            Ok(Message::Status(DeviceStatus::Idle))
        );
        assert_eq!(
            "STATUS:CALIBRATING,REMAINING:12".parse::<Message>(),
            Ok(Message::Status(DeviceStatus::CalibratingRemaining(12)))
        );
        assert!("STATUS:SLEEPING".parse::<Message>().is_err());
    }

    #[test]
    fn test_parse_buttons_and_markers() {
        assert_eq!(
            "BUTTON:START".parse::<Message>(),
            Ok(Message::Button(ButtonKind::Start))
        );
        assert_eq!(
            "BUTTON:STOP".parse::<Message>(),
            Ok(Message::Button(ButtonKind::Stop))
        );
        assert!("BUTTON:PAUSE".parse::<Message>().is_err());
        assert_eq!(
            "CALIBRATION:COMPLETE".parse::<Message>(),
            Ok(Message::Calibration(CalibrationMarker::Complete))
        );
        assert_eq!("SESSION:STARTED".parse::<Message>(), Ok(Message::SessionStarted));
    }

    #[test]
    fn test_lcd_is_verbatim_and_unknown_rejected() {
        assert_eq!(
            "LCD:Hello █░".parse::<Message>(),
            Ok(Message::Lcd("Hello █░".to_string()))
        );
        assert!(matches!(
            "garbage".parse::<Message>(),
            Err(ParseError::UnknownPrefix(_))
        ));
    }
}
