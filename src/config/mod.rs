pub mod types;

pub use types::*;

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Quality target settings
    pub quality: QualityConfig,
    /// CRF search settings
    pub search: SearchConfig,
    /// Segment sampling settings
    pub sampling: SamplingConfig,
    /// Performance and scheduling settings
    pub performance: PerformanceConfig,
    /// Output settings
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from TOML file, or create default if not found
    pub fn load() -> Self {
        let config_path = Self::config_path();

        if config_path.exists() {
            match Self::load_from_file(&config_path) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config: {}. Using defaults.", e);
                }
            }
        }

        let config = Self::default();
        // Save default config for future editing
        if let Err(e) = config.save() {
            warn!("Failed to save default config: {}", e);
        }
        config
    }

    /// Save configuration to TOML file
    pub fn save(&self) -> Result<(), AppError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, toml_string)
            .map_err(|e| AppError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hevcpress")
            .join("config.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), AppError> {
        if self.quality.target_vmaf < 0.0 || self.quality.target_vmaf > 100.0 {
            return Err(AppError::Config(
                "target VMAF must be between 0 and 100".to_string(),
            ));
        }
        if self.search.crf_min > self.search.crf_max {
            return Err(AppError::Config(
                "crf_min must not exceed crf_max".to_string(),
            ));
        }
        if self.search.crf_max > 51 {
            return Err(AppError::Config(
                "crf_max must be at most 51 for libx265".to_string(),
            ));
        }
        if self.search.max_trials_per_segment == 0 {
            return Err(AppError::Config(
                "max_trials_per_segment must be at least 1".to_string(),
            ));
        }
        if self.sampling.segment_count == 0 {
            return Err(AppError::Config(
                "segment_count must be at least 1".to_string(),
            ));
        }
        if self.sampling.segment_duration_secs <= 0.0 {
            return Err(AppError::Config(
                "segment_duration_secs must be positive".to_string(),
            ));
        }
        if !(0.0..0.5).contains(&self.sampling.edge_margin_fraction) {
            return Err(AppError::Config(
                "edge_margin_fraction must be in [0, 0.5)".to_string(),
            ));
        }
        if self.performance.concurrency == 0 {
            return Err(AppError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.performance.trial_timeout_secs == 0 {
            return Err(AppError::Config(
                "trial_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
