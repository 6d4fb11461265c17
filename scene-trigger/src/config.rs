/// Service configuration
///
/// Built once at start-up from defaults, an optional JSON file and
/// environment overrides, then shared read-only.

use crate::actuator::SwitchBotConfig;
use crate::audio::{AudioConfig, AudioError};
use crate::rolling_log::LogConfig;
use crate::trigger::{TriggerConfig, TriggerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Dotenv file read from the working directory, if present
pub const DOTENV_FILE: &str = ".env";

/// Path to an optional JSON config file
pub const ENV_CONFIG_FILE: &str = "SCENE_TRIGGER_CONFIG";

pub const ENV_FRAME_SIZE: &str = "SCENE_TRIGGER_FRAME_SIZE";
pub const ENV_SAMPLE_RATE: &str = "SCENE_TRIGGER_SAMPLE_RATE";
pub const ENV_STALL_TIMEOUT_MS: &str = "SCENE_TRIGGER_STALL_TIMEOUT_MS";
pub const ENV_THRESHOLD: &str = "SCENE_TRIGGER_THRESHOLD";
pub const ENV_COOLDOWN: &str = "SCENE_TRIGGER_COOLDOWN";
pub const ENV_WINDOW: &str = "SCENE_TRIGGER_WINDOW";
pub const ENV_STREAK: &str = "SCENE_TRIGGER_STREAK";
pub const ENV_LOG_FILE: &str = "SCENE_TRIGGER_LOG_FILE";
pub const ENV_CUE_WAV: &str = "SCENE_TRIGGER_CUE_WAV";
pub const ENV_SWITCHBOT_TOKEN: &str = "SWITCHBOT_TOKEN";
pub const ENV_SWITCHBOT_SECRET: &str = "SWITCHBOT_SECRET";
pub const ENV_SWITCHBOT_SCENE: &str = "SWITCHBOT_SCENE";
pub const ENV_SWITCHBOT_BASE_URL: &str = "SWITCHBOT_BASE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Malformed config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Malformed dotenv file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub trigger: TriggerConfig,
    pub log: LogConfig,
    pub switchbot: SwitchBotConfig,

    /// WAV played after each fire, if set
    pub cue_wav: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the process environment, falling back to `./.env`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(Path::new(DOTENV_FILE), |key| std::env::var(key).ok())
    }

    /// Load using `lookup`, falling back to variables from `dotenv_path`.
    /// Values from `lookup` win over the file.
    pub fn load_with<F>(dotenv_path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dotenv = read_dotenv(dotenv_path)?;
        Self::from_lookup(|key| lookup(key).or_else(|| dotenv.get(key).cloned()))
    }

    /// Load using `lookup` in place of the environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_FILE) {
            Some(path) => {
                let path = PathBuf::from(path);
                debug!("Loading config file {}", path.display());
                let json = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(path, e))?;
                serde_json::from_str::<AppConfig>(&json)?
            }
            None => AppConfig::default(),
        };

        if let Some(v) = parse_var(&lookup, ENV_FRAME_SIZE)? {
            config.audio.frame_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_SAMPLE_RATE)? {
            config.audio.sample_rate = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_STALL_TIMEOUT_MS)? {
            config.audio.stall_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_THRESHOLD)? {
            config.trigger.threshold = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_COOLDOWN)? {
            config.trigger.cooldown = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_WINDOW)? {
            config.trigger.window_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_STREAK)? {
            config.trigger.streak_required = v;
        }
        if let Some(v) = lookup(ENV_LOG_FILE) {
            config.log.path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_CUE_WAV) {
            config.cue_wav = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_SWITCHBOT_TOKEN) {
            config.switchbot.token = Some(v);
        }
        if let Some(v) = lookup(ENV_SWITCHBOT_SECRET) {
            config.switchbot.secret = Some(v);
        }
        if let Some(v) = lookup(ENV_SWITCHBOT_SCENE) {
            config.switchbot.scene_id = Some(v);
        }
        if let Some(v) = lookup(ENV_SWITCHBOT_BASE_URL) {
            config.switchbot.base_url = v;
        }

        // Summaries use the same cadence as the term windows
        config.log.window = config.trigger.window_size;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        self.trigger.validate()?;
        Ok(())
    }
}

/// Variables defined in a dotenv file; none if the file does not exist
pub fn read_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let vars = dotenvy::from_path_iter(path)?.collect::<Result<HashMap<_, _>, _>>()?;
    debug!("Read {} variables from {}", vars.len(), path.display());
    Ok(vars)
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}
