use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use validator::Validate;

use crate::domain::error::{AppError, Result};
use crate::domain::settings::Settings;

pub const DEFAULT_CONFIG_FILE: &str = "pension-ingest.toml";
pub const CONFIG_PATH_VAR: &str = "PENSION_INGEST_CONFIG";
pub const ENV_PREFIX: &str = "PENSION_INGEST_";

/// Layers defaults, an optional TOML file and `PENSION_INGEST_*`
/// environment variables (`__` separates nested keys), then validates.
pub struct SettingsLoader {
    file: PathBuf,
    use_env: bool,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// File from `PENSION_INGEST_CONFIG`, else `pension-ingest.toml` in the
    /// working directory. A missing file is not an error.
    pub fn new() -> Self {
        let file = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self {
            file,
            use_env: true,
        }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = path.as_ref().to_path_buf();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn figment(&self) -> Figment {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(&self.file));
        if self.use_env {
            figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["config"])
                    .split("__"),
            )
        } else {
            figment
        }
    }

    pub fn load(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment()
            .extract()
            .map_err(|e| AppError::ConfigError(format!("Failed to load settings: {}", e)))?;
        validate_settings(&settings)?;
        Ok(settings)
    }
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    settings
        .validate()
        .map_err(|e| AppError::ConfigError(format!("Invalid settings: {}", e)))?;
    settings
        .normalization
        .validate()
        .map_err(AppError::ConfigError)?;
    for layout in &settings.layouts {
        layout
            .validate()
            .map_err(|e| AppError::ConfigError(format!("Layout {}: {}", layout.name, e)))?;
    }
    Ok(())
}
