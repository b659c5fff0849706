//! Configuration for the stress monitor.

use crate::core::{CalibrationConfig, RuleParams};
use crate::error::ConfigError;
use crate::sensors::{ChannelConfig, SignalKind, ValueRange};
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial links to the microcontroller and the HR bridge
    pub link: LinkConfig,

    /// Sensor channel limits and retry policy
    pub channels: ChannelsConfig,

    /// Baseline calibration
    pub calibration: CalibrationSettings,

    /// Window collection
    pub window: WindowConfig,

    /// Classifier selection and rule parameters
    pub classifier: ClassifierConfig,

    /// Session control loop
    pub session: SessionSettings,

    /// Item catalog used for playback
    pub library: LibraryConfig,

    /// Path for session reports
    pub export_path: PathBuf,

    /// Path for telemetry and other state
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stress-monitor");

        Self {
            link: LinkConfig::default(),
            channels: ChannelsConfig::default(),
            calibration: CalibrationSettings::default(),
            window: WindowConfig::default(),
            classifier: ClassifierConfig::default(),
            session: SessionSettings::default(),
            library: LibraryConfig::default(),
            export_path: data_dir.join("sessions"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stress-monitor")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    pub fn telemetry_path(&self) -> PathBuf {
        self.data_path.join("telemetry.json")
    }

    pub fn channel_config(&self, kind: SignalKind) -> ChannelConfig {
        let c = &self.channels;
        ChannelConfig {
            kind,
            range: match kind {
                SignalKind::Gsr => c.gsr_range,
                SignalKind::Hr => c.hr_range,
            },
            history_capacity: c.history_capacity,
            liveness: c.liveness,
            max_retries: c.max_retries,
            retry_delay: c.retry_delay,
            join_timeout: c.join_timeout,
        }
    }

    pub fn calibration_config(&self) -> CalibrationConfig {
        let c = &self.calibration;
        CalibrationConfig {
            device_wait: c.device_wait,
            min_computed_samples: c.min_computed_samples,
            default_gsr: c.default_gsr,
            default_hr: c.default_hr,
            hr_wait: c.hr_wait,
            hr_subwindow: c.hr_subwindow,
            hr_min_samples: c.hr_min_samples,
            poll_interval: c.poll_interval,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick: self.session.tick,
            reevaluation_lead: self.session.reevaluation_lead,
            playback_grace: self.session.playback_grace,
            playback_poll: self.session.playback_poll,
            window: self.window.window,
            quick_window: self.window.quick_window,
        }
    }
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
    /// Second line transport carrying `HR:` frames
    pub hr_port: Option<String>,
    pub hr_baud_rate: u32,
    /// Longest line the framer buffers before discarding it
    pub max_line: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: 9600,
            read_timeout: Duration::from_millis(1000),
            hr_port: None,
            hr_baud_rate: 115_200,
            max_line: 512,
        }
    }
}

fn default_port() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else {
        "/dev/ttyUSB0"
    }
}

/// Limits and retry policy shared by both channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub gsr_range: ValueRange,
    pub hr_range: ValueRange,
    pub history_capacity: usize,
    #[serde(with = "duration_ms")]
    pub liveness: Duration,
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    #[serde(with = "duration_ms")]
    pub join_timeout: Duration,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        let gsr = ChannelConfig::gsr();
        Self {
            gsr_range: gsr.range,
            hr_range: ChannelConfig::hr().range,
            history_capacity: gsr.history_capacity,
            liveness: gsr.liveness,
            max_retries: gsr.max_retries,
            retry_delay: gsr.retry_delay,
            join_timeout: gsr.join_timeout,
        }
    }
}

/// Serialized form of [`CalibrationConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    #[serde(with = "duration_ms")]
    pub device_wait: Duration,
    pub min_computed_samples: usize,
    pub default_gsr: f64,
    pub default_hr: f64,
    #[serde(with = "duration_ms")]
    pub hr_wait: Duration,
    #[serde(with = "duration_ms")]
    pub hr_subwindow: Duration,
    pub hr_min_samples: usize,
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        let c = CalibrationConfig::default();
        Self {
            device_wait: c.device_wait,
            min_computed_samples: c.min_computed_samples,
            default_gsr: c.default_gsr,
            default_hr: c.default_hr,
            hr_wait: c.hr_wait,
            hr_subwindow: c.hr_subwindow,
            hr_min_samples: c.hr_min_samples,
            poll_interval: c.poll_interval,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    #[serde(with = "duration_ms")]
    pub window: Duration,
    #[serde(with = "duration_ms")]
    pub quick_window: Duration,
    pub sampling_rate_hz: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            quick_window: Duration::from_secs(10),
            sampling_rate_hz: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Ensemble model file; rules are used when absent or unloadable
    pub model_path: Option<PathBuf>,
    pub rules: RuleParams,
    pub history_capacity: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            rules: RuleParams::default(),
            history_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    #[serde(with = "duration_ms")]
    pub tick: Duration,
    #[serde(with = "duration_ms")]
    pub reevaluation_lead: Duration,
    #[serde(with = "duration_ms")]
    pub playback_grace: Duration,
    #[serde(with = "duration_ms")]
    pub playback_poll: Duration,
    pub button_queue: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let s = SessionConfig::default();
        Self {
            tick: s.tick,
            reevaluation_lead: s.reevaluation_lead,
            playback_grace: s.playback_grace,
            playback_poll: s.playback_poll,
            button_queue: 32,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// JSON catalog of playable items per category
    pub catalog_path: Option<PathBuf>,
}

/// Serde support for Duration, as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
