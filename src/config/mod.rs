//! Configuration management for the sensor bridge
//!
//! Configuration is read from a TOML file (when present) and then
//! overridden from the environment, so a bare `SENSOR_DEVICE_ID` +
//! `SENSOR_TOKEN` is enough to run against the default cloud endpoints.

use crate::error::{BridgeError, Result};
use crate::services::collaborators::TemperatureScale;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Method name sent with every state request
pub const DEFAULT_STATE_METHOD: &str = "MotionSensor.getState";

/// Minimum time between two accepted (non-forced) polls
pub const DEFAULT_MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Periodic poll interval of the `run` command
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Delay between accepting a poll and dispatching its fetch
pub const DEFAULT_DISPATCH_DELAY: Duration = Duration::from_millis(500);

/// Top-level bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Device identity and credentials
    pub device: DeviceConfig,

    /// Poll channel (cloud HTTP API)
    #[serde(default)]
    pub api: ApiConfig,

    /// Push channel (event stream)
    #[serde(default)]
    pub push: PushConfig,

    /// Poll scheduling
    #[serde(default)]
    pub polling: PollingConfig,

    /// Display preferences used by the normalizers
    #[serde(default)]
    pub display: DisplayConfig,

    /// Device state persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Verbose logging and the `debug` device attribute
    #[serde(default)]
    pub debug: bool,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    /// Identifier every payload is checked against
    pub device_id: String,

    /// Access token forwarded with every fetch
    #[serde(default)]
    pub token: String,

    /// Human-readable label used in logs
    #[serde(default)]
    pub name: Option<String>,
}

/// Poll channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Endpoint receiving state requests
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Request timeout
    #[serde(with = "humantime_serde", default = "default_api_timeout")]
    pub timeout: Duration,

    /// Method name placed in the request descriptor
    #[serde(default = "default_state_method")]
    pub method: String,
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_state_method() -> String {
    DEFAULT_STATE_METHOD.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            timeout: default_api_timeout(),
            method: default_state_method(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.yosmart.com/open/yolink/v2/api".to_string()
}

/// Push channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Event stream endpoint; push is disabled when absent
    pub url: Option<Url>,

    /// Explicit switch, independent of the URL
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: None,
            enabled: true,
        }
    }
}

impl PushConfig {
    /// Endpoint to listen on, if the push channel is active
    pub fn active_url(&self) -> Option<&Url> {
        self.url.as_ref().filter(|_| self.enabled)
    }
}

/// Poll scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Minimum interval between accepted non-forced polls
    #[serde(with = "humantime_serde", default = "default_min_interval")]
    pub min_interval: Duration,

    /// Delay before an accepted poll's fetch is dispatched
    #[serde(with = "humantime_serde", default = "default_dispatch_delay")]
    pub dispatch_delay: Duration,

    /// Periodic poll interval used by the `run` command; no periodic polling when absent
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub interval: Option<Duration>,
}

fn default_min_interval() -> Duration {
    DEFAULT_MIN_POLL_INTERVAL
}

fn default_dispatch_delay() -> Duration {
    DEFAULT_DISPATCH_DELAY
}

fn default_poll_interval() -> Option<Duration> {
    Some(DEFAULT_POLL_INTERVAL)
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_POLL_INTERVAL,
            dispatch_delay: DEFAULT_DISPATCH_DELAY,
            interval: default_poll_interval(),
        }
    }
}

/// Display preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Scale temperatures are reported in
    #[serde(default)]
    pub temperature_scale: TemperatureScale,

    /// chrono `strftime` pattern for timestamps
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Offset applied before rendering timestamps
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_date_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            temperature_scale: TemperatureScale::default(),
            date_format: default_date_format(),
            utc_offset_minutes: 0,
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// JSON file holding the device state record; in-memory only when absent
    pub state_file: Option<PathBuf>,
}

impl BridgeConfig {
    /// Build a config for a device with everything else defaulted
    pub fn for_device(device_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            device: DeviceConfig {
                device_id: device_id.into(),
                token: token.into(),
                name: None,
            },
            ..Self::default()
        }
    }

    /// Load configuration from `path` (if it exists) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                let text = std::fs::read_to_string(path)?;
                Self::from_toml(&text)?
            }
            Some(path) => {
                debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sensor-bridge").join("config.toml"))
    }

    /// Apply `SENSOR_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(device_id) = std::env::var("SENSOR_DEVICE_ID") {
            self.device.device_id = device_id;
        }
        if let Ok(token) = std::env::var("SENSOR_TOKEN") {
            self.device.token = token;
        }
        if let Ok(url) = std::env::var("SENSOR_API_URL") {
            self.api.url = url;
        }
        if let Ok(url) = std::env::var("SENSOR_PUSH_URL") {
            self.push.url = Some(
                Url::parse(&url)
                    .map_err(|e| BridgeError::config(format!("Invalid SENSOR_PUSH_URL: {e}")))?,
            );
        }
        Ok(())
    }

    /// Reject configurations the device cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.device.device_id.trim().is_empty() {
            return Err(BridgeError::config("device.device_id must not be empty"));
        }
        Url::parse(&self.api.url)
            .map_err(|e| BridgeError::config(format!("Invalid api.url {}: {e}", self.api.url)))?;
        if self.polling.interval.is_some_and(|interval| interval.is_zero()) {
            return Err(BridgeError::config(
                "polling.interval must be greater than zero; omit it to disable periodic polling",
            ));
        }
        if self.display.date_format.trim().is_empty() {
            return Err(BridgeError::config("display.date_format must not be empty"));
        }
        Ok(())
    }

    /// Name used in log lines
    pub fn device_label(&self) -> &str {
        self.device
            .name
            .as_deref()
            .unwrap_or(self.device.device_id.as_str())
    }
}
