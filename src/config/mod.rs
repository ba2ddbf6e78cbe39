use crate::error::{Result, StitchError};
use crate::grid::TileType;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StitchConfig {
    pub registration: RegistrationConfig,
    pub discovery: DiscoveryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Lateral tile extent in pixels
    pub frame_size: usize,
    /// Nominal overlap between adjacent tiles in pixels
    pub overlap: usize,
    /// Sub-pixel refinement factor for phase correlation (1 = pixel precision)
    pub upsample_factor: usize,
    /// Worker threads for pairwise registration (None = rayon default)
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Tile format; auto-detected from the directory contents when unset
    pub file_type: Option<TileType>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            overlap: 512,
            upsample_factor: 1,
            threads: None,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.frame_size == 0 {
            errors.push("frame_size must be positive".to_string());
        }
        if self.overlap == 0 {
            errors.push("overlap must be positive".to_string());
        }
        if self.overlap >= self.frame_size {
            errors.push(format!(
                "overlap ({}) must be smaller than frame_size ({})",
                self.overlap, self.frame_size
            ));
        }
        if self.upsample_factor == 0 {
            errors.push("upsample_factor must be at least 1".to_string());
        }
        if self.threads == Some(0) {
            errors.push("threads must be positive when set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl StitchConfig {
    /// Load a configuration file, JSON if it starts with `{`, TOML otherwise
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;

        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&content)?)
        } else {
            toml::from_str(&content).map_err(|e| StitchError::Config(e.to_string()))
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| StitchError::Config(e.to_string()))?
            }
        };

        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = match self.registration.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and turn the collected problems into a single error
    pub fn ensure_valid(&self) -> Result<()> {
        self.validate()
            .map_err(|errors| StitchError::Config(errors.join("; ")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

/// Load `config_path` if given, falling back to defaults when it is missing
/// or invalid.
pub fn load_config_or_default(config_path: Option<&Path>) -> StitchConfig {
    match config_path {
        Some(path) => match StitchConfig::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    tracing::warn!(
                        path = %path.display(),
                        errors = ?errors,
                        "Configuration validation failed, using defaults"
                    );
                    StitchConfig::default()
                } else {
                    config
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load configuration, using defaults"
                );
                StitchConfig::default()
            }
        },
        None => StitchConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = StitchConfig::default();
        assert_eq!(config.registration.frame_size, 2048);
        assert_eq!(config.registration.overlap, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = StitchConfig::default();
        config.registration.overlap = 4096;
        config.registration.upsample_factor = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn test_toml_and_json_round_trip() {
        let dir = tempdir().unwrap();
        let mut config = StitchConfig::default();
        config.registration.overlap = 256;
        config.registration.threads = Some(4);
        config.discovery.file_type = Some(TileType::Tiff2D);

        for (name, format) in [("c.toml", ConfigFormat::Toml), ("c.json", ConfigFormat::Json)] {
            let path = dir.path().join(name);
            config.save_to_file(&path, format).unwrap();
            assert_eq!(StitchConfig::load_from_file(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[registration]\noverlap = 128\n").unwrap();

        let config = StitchConfig::load_from_file(&path).unwrap();
        assert_eq!(config.registration.overlap, 128);
        assert_eq!(config.registration.frame_size, 2048);
        assert!(config.discovery.file_type.is_none());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = load_config_or_default(Some(Path::new("/nonexistent/stitch.toml")));
        assert_eq!(config, StitchConfig::default());
    }
}
