use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::ConfigError;

/// Default config file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "loopcast.toml";

/// Output settings for a conversion.
///
/// The UI layer owns the live instance and is the only mutator; every
/// `ConversionJob` takes a copy at launch time so edits made while a job is
/// in flight never affect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Encode with the slow/high-quality preset instead of the fast one.
    pub high_quality: bool,

    /// Use `width`/`height` for the canvas and target height instead of the
    /// built-in 1280x720 defaults.
    pub custom_resolution: bool,

    /// Canvas width in pixels. Only honored when `custom_resolution` is set.
    pub width: u32,

    /// Canvas height in pixels, also the target scaling height when
    /// `custom_resolution` is set.
    pub height: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            high_quality: false,
            custom_resolution: false,
            width: 1280,
            height: 720,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidResolution);
        }
        Ok(())
    }
}

/// Client credentials for the upload service, persisted in the `[api]`
/// section of the config file. Missing keys read back as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    api: ApiKeys,
}

impl ApiKeys {
    /// Load keys from the config file.
    ///
    /// A missing or malformed file is not an error: the UI should still come
    /// up, so this logs and falls back to empty strings.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("failed to read config file {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match toml::from_str::<ConfigFile>(&raw) {
            Ok(file) => file.api,
            Err(e) => {
                warn!("malformed config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write keys back to the config file, replacing its contents.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let file = ConfigFile { api: self.clone() };
        let raw = toml::to_string_pretty(&file)?;
        std::fs::write(path, raw)?;
        info!("💾 API keys saved to: {}", path.display());
        Ok(())
    }
}
