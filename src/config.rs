//! Configuration for the run loop and its demo host
//!
//! Settings are plain serde structs persisted as TOML. Every section carries
//! `#[serde(default)]`, so a partial file only overrides what it names and a
//! missing file degrades to defaults instead of preventing startup.
//!
//! ```toml
//! [run_loop]
//! allowed_overflow_frames = 10
//!
//! [display]
//! refresh_rate_hz = 60.0
//!
//! [logging]
//! level = "info"
//! ```

use crate::frame_source::{interval::DEFAULT_REFRESH_RATE_HZ, NOMINAL_FRAME_MS};
use crate::loop_controller::LoopError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn, Level};

const CONFIG_DIR: &str = "frameloop";
const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_OVERFLOW_FRAMES: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid argument in configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Invalid(#[from] LoopError),
}

/// Settings consumed by [`crate::LoopController::new`]
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoopSettings {
    /// Number of nominal 60 Hz frame periods a tick may lag before it is
    /// discarded as a dead frame.
    pub allowed_overflow_frames: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            allowed_overflow_frames: DEFAULT_OVERFLOW_FRAMES,
        }
    }
}

impl LoopSettings {
    pub fn with_overflow_frames(allowed_overflow_frames: u32) -> Self {
        Self {
            allowed_overflow_frames,
        }
    }

    /// Dead-frame threshold in milliseconds.
    pub fn allowed_overflow_threshold(&self) -> f64 {
        f64::from(self.allowed_overflow_frames) * NOMINAL_FRAME_MS
    }

    /// Any integer budget is accepted. A budget of 0 gives a 0ms threshold,
    /// so only ticks with no elapsed time are processed.
    pub fn validate(&self) -> Result<(), LoopError> {
        if self.allowed_overflow_frames == 0 {
            warn!("allowed_overflow_frames is 0, every tick with a non-zero gap will be dropped");
        }
        Ok(())
    }
}

/// Refresh emulation for [`crate::frame_source::IntervalFrameSource`]
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DisplaySettings {
    pub refresh_rate_hz: f64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            refresh_rate_hz: DEFAULT_REFRESH_RATE_HZ,
        }
    }
}

impl DisplaySettings {
    pub fn validate(&self) -> Result<(), LoopError> {
        if !self.refresh_rate_hz.is_finite() || self.refresh_rate_hz <= 0.0 {
            return Err(LoopError::InvalidArgument(format!(
                "refresh_rate_hz must be a positive number, got {}",
                self.refresh_rate_hz
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// One of trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    pub fn level(&self) -> Result<Level, LoopError> {
        Level::from_str(self.level.trim()).map_err(|_| {
            LoopError::InvalidArgument(format!("unknown log level '{}'", self.level))
        })
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub run_loop: LoopSettings,
    pub display: DisplaySettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// `<platform config dir>/frameloop/config.toml`, or a relative path when
    /// the platform has no config directory.
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("No platform config directory, falling back to working directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), LoopError> {
        self.run_loop.validate()?;
        self.display.validate()?;
        self.logging.level()?;
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, self.to_toml_string()?)
            .await
            .map_err(io_err)?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Loads `path`, writing a default configuration first if it does not exist.
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("No configuration at {}, writing defaults", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        Self::load(path).await
    }
}
