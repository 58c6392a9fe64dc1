//! Configuration file support for Handover.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/handover/config.toml`.

use crate::event_log::DEFAULT_LOG_CAP;
use crate::metronome::DEFAULT_CYCLE_TARGET;
use crate::{Error, Result, Tone};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub cpr: CprConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// CPR metronome and log configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CprConfig {
    /// Compressions per minute
    #[serde(default = "default_rate_bpm")]
    pub rate_bpm: u32,

    /// Compressions between pulse checks
    #[serde(default = "default_cycle_target")]
    pub cycle_target: u32,

    #[serde(default = "default_audio_enabled")]
    pub audio_enabled: bool,

    #[serde(default = "default_tone_hz")]
    pub tone_hz: u32,

    #[serde(default = "default_tone_ms")]
    pub tone_ms: u32,

    /// Maximum entries kept in the event and timeline logs
    #[serde(default = "default_log_cap")]
    pub log_cap: usize,
}

impl Default for CprConfig {
    fn default() -> Self {
        Self {
            rate_bpm: default_rate_bpm(),
            cycle_target: default_cycle_target(),
            audio_enabled: default_audio_enabled(),
            tone_hz: default_tone_hz(),
            tone_ms: default_tone_ms(),
            log_cap: default_log_cap(),
        }
    }
}

impl CprConfig {
    pub fn tone(&self) -> Tone {
        Tone {
            frequency_hz: self.tone_hz,
            duration_ms: self.tone_ms,
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("handover")
}

fn default_rate_bpm() -> u32 {
    110
}

fn default_cycle_target() -> u32 {
    DEFAULT_CYCLE_TARGET
}

fn default_audio_enabled() -> bool {
    true
}

fn default_tone_hz() -> u32 {
    880
}

fn default_tone_ms() -> u32 {
    80
}

fn default_log_cap() -> usize {
    DEFAULT_LOG_CAP
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("handover").join("config.toml")
    }

    /// Reject values the metronome and logs cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cpr.rate_bpm == 0 {
            return Err(Error::Config("cpr.rate_bpm must be positive".into()));
        }
        if self.cpr.cycle_target == 0 {
            return Err(Error::Config("cpr.cycle_target must be positive".into()));
        }
        if self.cpr.log_cap == 0 {
            return Err(Error::Config("cpr.log_cap must be positive".into()));
        }
        Ok(())
    }
}
