use crate::error::ConfigError;
use crate::repeat::RepeatInterval;
use crate::sound::SoundBook;
use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_VAR_PREFIX: &str = "AIR_ALERT__";
pub const SETTINGS_FILE: &str = "Settings.toml";

/// Configuration as written in `Settings.toml` / the environment, before
/// validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RawConfig {
    pub api_url: String,
    pub auth_header: String,
    pub request_timeout_sec: i64,
    pub request_interval_sec: i64,
    pub audio_files: HashMap<String, PathBuf>,
    pub alert_on_empty: Option<PathBuf>,
    pub repeat_audio_file: Option<PathBuf>,
    pub enable_repeat_audio: bool,
    pub repeat_interval_min: i64,
    pub time_zone: String,
    pub state_path: PathBuf,
    pub player: Option<PlayerConfig>,
    pub log: LogConfig,
    pub health_addr: Option<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            auth_header: String::new(),
            request_timeout_sec: 10,
            request_interval_sec: 30,
            audio_files: HashMap::new(),
            alert_on_empty: None,
            repeat_audio_file: None,
            enable_repeat_audio: false,
            repeat_interval_min: 15,
            time_zone: "UTC".to_string(),
            state_path: PathBuf::from("state.json"),
            player: None,
            log: LogConfig::default(),
            health_addr: None,
        }
    }
}

/// External program used to play sound files; the file path is appended
/// as the last argument.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlayerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `alert_watcher=debug`.
    pub level: String,
    pub to_console: bool,
    pub to_file: bool,
    pub file_path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            to_console: true,
            to_file: false,
            file_path: PathBuf::from("alert.log"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub auth_header: Option<String>,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub sounds: SoundBook,
    /// `None` when reminders are disabled.
    pub repeat_interval: Option<RepeatInterval>,
    pub time_zone: Tz,
    pub state_path: PathBuf,
    pub player: Option<PlayerConfig>,
    pub log: LogConfig,
    pub health_addr: Option<SocketAddr>,
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let api_url = raw.api_url.trim().to_string();
        if api_url.is_empty() {
            return Err(invalid("api_url", "must be set"));
        }

        let request_timeout = positive_seconds("request_timeout_sec", raw.request_timeout_sec)?;
        let poll_interval = positive_seconds("request_interval_sec", raw.request_interval_sec)?;

        let repeat_interval = if raw.enable_repeat_audio {
            Some(
                RepeatInterval::from_minutes(raw.repeat_interval_min).ok_or_else(|| {
                    invalid(
                        "repeat_interval_min",
                        format!(
                            "must be positive when repeats are enabled, got {}",
                            raw.repeat_interval_min
                        ),
                    )
                })?,
            )
        } else {
            None
        };

        let time_zone = raw
            .time_zone
            .parse::<Tz>()
            .map_err(|e| invalid("time_zone", e.to_string()))?;

        let health_addr = raw
            .health_addr
            .as_deref()
            .map(str::parse::<SocketAddr>)
            .transpose()
            .map_err(|e| invalid("health_addr", e.to_string()))?;

        if let Some(player) = &raw.player
            && player.command.trim().is_empty()
        {
            return Err(invalid("player.command", "must not be empty"));
        }

        Ok(Self {
            api_url,
            auth_header: Some(raw.auth_header).filter(|h| !h.is_empty()),
            request_timeout,
            poll_interval,
            sounds: SoundBook::new(&raw.audio_files, raw.alert_on_empty, raw.repeat_audio_file),
            repeat_interval,
            time_zone,
            state_path: raw.state_path,
            player: raw.player,
            log: raw.log,
            health_addr,
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive_seconds(field: &'static str, value: i64) -> Result<Duration, ConfigError> {
    u64::try_from(value)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid(field, format!("must be a positive number of seconds, got {value}")))
}

pub fn figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RawConfig::default()))
        .merge(Toml::file(SETTINGS_FILE))
        .merge(Env::prefixed(ENV_VAR_PREFIX).split("__"))
}

pub fn load_config() -> Result<Config, ConfigError> {
    figment().extract::<RawConfig>()?.try_into()
}
