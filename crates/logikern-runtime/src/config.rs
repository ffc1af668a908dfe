//! Runtime configuration – reads/writes `~/.logikern/config.toml`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Output format of the `tracing` subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue {
                key: "log_format".into(),
                value: other.into(),
            }),
        }
    }
}

/// Persisted runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// `service.name` reported to the OTLP collector.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// OTLP/HTTP collector base URL.  Unset falls back to
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`; neither set disables span export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,

    /// Ticks a [`ComponentRunner`][crate::runner::ComponentRunner] may spend
    /// in one `run_until` before giving up.
    #[serde(default = "default_tick_budget")]
    pub tick_budget: u64,

    /// Number of tick records a runner keeps.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_log_filter() -> String {
    "info".to_string()
}
fn default_service_name() -> String {
    "logikern".to_string()
}
fn default_tick_budget() -> u64 {
    10_000
}
fn default_history_capacity() -> usize {
    256
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
            service_name: default_service_name(),
            otlp_endpoint: None,
            tick_budget: default_tick_budget(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults with environment overrides applied, for processes without a
    /// config file.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        apply_env_overrides(&mut cfg);
        cfg
    }
}

/// Failures reading, parsing or writing the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config at {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Return `$LOGIKERN_CONFIG`, or `~/.logikern/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("LOGIKERN_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".logikern").join("config.toml")
}

/// Load the config from [`config_path`].  Returns `None` if the file does
/// not exist.
///
/// # Errors
///
/// As for [`load_from`].
pub fn load() -> Result<Option<RuntimeConfig>, ConfigError> {
    load_from(&config_path())
}

/// Load the config from `path` and apply environment overrides.  Returns
/// `None` if the file does not exist.
///
/// # Errors
///
/// [`ConfigError::Read`] or [`ConfigError::Parse`].
pub fn load_from(path: &Path) -> Result<Option<RuntimeConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: RuntimeConfig = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `LOGIKERN_*` environment variable overrides to `cfg`.
///
/// Unparseable values are logged and ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `LOGIKERN_LOG` | `log_filter` |
/// | `LOGIKERN_LOG_FORMAT` | `log_format` (`compact` or `json`) |
/// | `LOGIKERN_SERVICE_NAME` | `service_name` |
/// | `LOGIKERN_OTLP_ENDPOINT` | `otlp_endpoint` (empty clears it) |
/// | `LOGIKERN_TICK_BUDGET` | `tick_budget` |
/// | `LOGIKERN_HISTORY_CAPACITY` | `history_capacity` |
pub fn apply_env_overrides(cfg: &mut RuntimeConfig) {
    if let Ok(v) = std::env::var("LOGIKERN_LOG") {
        cfg.log_filter = v;
    }
    if let Ok(v) = std::env::var("LOGIKERN_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => cfg.log_format = format,
            Err(err) => warn!(error = %err, "ignoring LOGIKERN_LOG_FORMAT"),
        }
    }
    if let Ok(v) = std::env::var("LOGIKERN_SERVICE_NAME") {
        cfg.service_name = v;
    }
    if let Ok(v) = std::env::var("LOGIKERN_OTLP_ENDPOINT") {
        cfg.otlp_endpoint = Some(v).filter(|url| !url.is_empty());
    }
    if let Ok(v) = std::env::var("LOGIKERN_TICK_BUDGET") {
        match v.parse::<u64>() {
            Ok(budget) => cfg.tick_budget = budget,
            Err(err) => warn!(value = %v, error = %err, "ignoring LOGIKERN_TICK_BUDGET"),
        }
    }
    if let Ok(v) = std::env::var("LOGIKERN_HISTORY_CAPACITY") {
        match v.parse::<usize>() {
            Ok(capacity) => cfg.history_capacity = capacity,
            Err(err) => warn!(value = %v, error = %err, "ignoring LOGIKERN_HISTORY_CAPACITY"),
        }
    }
}

/// Save the config to [`config_path`], creating its directory if necessary.
///
/// # Errors
///
/// As for [`save_to`].
pub fn save(cfg: &RuntimeConfig) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

/// Save the config to `path`, creating its directory if necessary.
///
/// # Errors
///
/// [`ConfigError::Serialize`] or [`ConfigError::Write`].
pub fn save_to(cfg: &RuntimeConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
