//! Logging setup
//!
//! Logs go to stderr and, when a file is configured, to a daily rotated
//! file next to it. `RUST_LOG` takes precedence over the configured level.

use crate::error::{BridgeError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

const DEFAULT_LOG_FILE: &str = "sensor-bridge.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,

    /// Log file; rotated daily
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// JSON lines instead of the human readable format
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            json: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            let rust_log = rust_log.to_lowercase();
            for (name, level) in [
                ("trace", Level::TRACE),
                ("debug", Level::DEBUG),
                ("info", Level::INFO),
                ("warn", Level::WARN),
                ("error", Level::ERROR),
            ] {
                if rust_log.contains(name) {
                    config.level = level;
                    break;
                }
            }
        }

        if let Ok(log_file) = std::env::var("SENSOR_BRIDGE_LOG_FILE") {
            config.file_path = Some(PathBuf::from(log_file));
        }

        if let Ok(log_stderr) = std::env::var("SENSOR_BRIDGE_LOG_STDERR") {
            config.stderr = log_stderr.to_lowercase() != "false";
        }

        if let Ok(json) = std::env::var("SENSOR_BRIDGE_LOG_JSON") {
            config.json = json.to_lowercase() == "true";
        }

        config
    }

    /// Raise the level to debug, e.g. for the device debug flag
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug && self.level < Level::DEBUG {
            self.level = Level::DEBUG;
        }
        self
    }
}

/// Initialize the global subscriber
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let stderr_layer = config.stderr.then(|| {
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
        if config.json {
            layer.json().boxed()
        } else {
            layer.with_ansi(true).boxed()
        }
    });

    let file_layer = match &config.file_path {
        Some(path) => {
            let (dir, file_name) = split_log_path(path);
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let layer = fmt::layer().with_writer(appender).with_ansi(false);
            Some(if config.json {
                layer.json().boxed()
            } else {
                layer.boxed()
            })
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| BridgeError::config(format!("Failed to install logger: {e}")))
}

fn split_log_path(path: &Path) -> (&Path, &OsStr) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE));
    (dir, file_name)
}
