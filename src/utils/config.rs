//! Configuration management for hwvideo-bridge
//!
//! This module handles loading and managing configuration from config files
//! and environment variables.

use crate::utils::error::{BridgeError, IntoBridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toml::value::{Table, Value};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults applied to newly created players
    pub player: PlayerDefaults,

    /// Synthetic decoder configuration
    pub synthetic: SyntheticConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// Defaults applied to every player at creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerDefaults {
    /// Initial volume (0.0 - 1.0)
    pub volume: f32,

    /// Loop playback
    pub looping: bool,

    /// Initial playback rate
    pub playback_rate: f32,

    /// Initial destination texture width (0 = unset)
    pub texture_width: u32,

    /// Initial destination texture height (0 = unset)
    pub texture_height: u32,
}

/// Synthetic test-pattern decoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Frames produced per second at rate 1.0
    pub fps: f32,

    /// Frame width
    pub width: u32,

    /// Frame height
    pub height: u32,

    /// Reported media duration in seconds
    pub duration_secs: f64,

    /// Treat remote sources as unreachable
    pub offline: bool,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Warn when teardown waits longer than this for decoder callbacks
    pub drain_warn_ms: u64,
}

impl Default for PlayerDefaults {
    fn default() -> Self {
        Self {
            volume: 1.0,
            looping: false,
            playback_rate: 1.0,
            texture_width: 0,
            texture_height: 0,
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            width: 1280,
            height: 720,
            duration_secs: 10.0,
            offline: false,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            drain_warn_ms: 500,
        }
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/hwvideo-bridge/config.toml on Linux)
    /// 3. User config file (~/.config/hwvideo-bridge/config.toml on Linux)
    /// 4. Environment variables (HWVB_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config.merge_from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config.merge_from_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from an explicit file, then apply env overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    /// Merge configuration from a TOML file
    ///
    /// Keys present in the file override the current values; missing keys
    /// keep whatever an earlier layer set.
    fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        let overlay: Table = toml::from_str(&contents).config_err("Failed to parse config file")?;

        let mut merged = match toml::Value::try_from(&*self) {
            Ok(Value::Table(table)) => table,
            Ok(_) => return Err(BridgeError::Config("Config is not a table".to_string())),
            Err(e) => return Err(BridgeError::Config(format!("Failed to serialize config: {}", e))),
        };
        merge_tables(&mut merged, overlay);

        *self = Value::Table(merged)
            .try_into()
            .config_err("Failed to apply config file")?;

        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(volume) = std::env::var("HWVB_PLAYER_VOLUME") {
            self.player.volume = volume
                .parse()
                .map_err(|_| BridgeError::Config("Invalid HWVB_PLAYER_VOLUME".to_string()))?;
        }

        if let Ok(fps) = std::env::var("HWVB_SYNTHETIC_FPS") {
            self.synthetic.fps = fps
                .parse()
                .map_err(|_| BridgeError::Config("Invalid HWVB_SYNTHETIC_FPS".to_string()))?;
        }

        if let Ok(offline) = std::env::var("HWVB_SYNTHETIC_OFFLINE") {
            self.synthetic.offline = matches!(offline.as_str(), "1" | "true" | "yes");
        }

        if let Ok(log_level) = std::env::var("HWVB_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.player.volume) {
            return Err(BridgeError::Config(
                "Player volume must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(self.player.playback_rate > 0.0) || !self.player.playback_rate.is_finite() {
            return Err(BridgeError::Config(
                "Playback rate must be a positive number".to_string(),
            ));
        }

        if !(self.synthetic.fps > 0.0) || !self.synthetic.fps.is_finite() {
            return Err(BridgeError::Config(
                "Synthetic fps must be a positive number".to_string(),
            ));
        }

        if self.synthetic.width == 0 || self.synthetic.height == 0 {
            return Err(BridgeError::Config(
                "Synthetic frame dimensions must be non-zero".to_string(),
            ));
        }

        if self.synthetic.duration_secs < 0.0 {
            return Err(BridgeError::Config(
                "Synthetic duration must not be negative".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(BridgeError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/hwvideo-bridge/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("hwvideo-bridge").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from(
            "/Library/Application Support/hwvideo-bridge/config.toml",
        ));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hwvideo-bridge").join("config.toml"))
    }
}

/// Recursively overlay `overlay` onto `base`; tables merge, other values replace
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        if let Value::Table(nested) = value {
            if let Some(Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, nested);
                continue;
            }
            base.insert(key, Value::Table(nested));
        } else {
            base.insert(key, value);
        }
    }
}
