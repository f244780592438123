//! Configuration management for `geokit`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::GeoKitError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoKitConfig {
    /// Elevation service configuration
    pub elevation: ElevationConfig,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// IDW defaults
    pub interpolation: InterpolationConfig,
}

/// Elevation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationConfig {
    /// Base URL of an Open-Elevation compatible service
    #[serde(default = "default_elevation_base_url")]
    pub base_url: String,
    /// Locations per lookup request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Request timeout in seconds
    #[serde(default = "default_elevation_timeout")]
    pub timeout_seconds: u32,
    /// Maximum number of retries for failed requests
    #[serde(default = "default_elevation_max_retries")]
    pub max_retries: u32,
    /// Whether elevations are fetched at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache TTL in hours
    #[serde(default = "default_cache_ttl")]
    pub ttl_hours: u32,
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolationConfig {
    /// IDW power parameter
    #[serde(default = "default_power")]
    pub power: f64,
    /// NODATA value of written grids
    #[serde(default = "default_nodata")]
    pub nodata: f64,
    /// Extra margin around the samples, in map units
    #[serde(default)]
    pub padding: f64,
    /// Largest raster (columns x rows) an interpolation may allocate
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,
}

// Default value functions
fn default_elevation_base_url() -> String {
    "https://api.open-elevation.com".to_string()
}

fn default_batch_size() -> usize {
    crate::elevation::DEFAULT_BATCH_SIZE
}

fn default_elevation_timeout() -> u32 {
    30
}

fn default_elevation_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u32 {
    720
}

fn default_cache_location() -> String {
    "~/.cache/geokit".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_power() -> f64 {
    2.0
}

fn default_nodata() -> f64 {
    -9999.0
}

fn default_max_cells() -> usize {
    crate::interpolation::DEFAULT_MAX_CELLS
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            base_url: default_elevation_base_url(),
            batch_size: default_batch_size(),
            timeout_seconds: default_elevation_timeout(),
            max_retries: default_elevation_max_retries(),
            enabled: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: default_cache_ttl(),
            location: default_cache_location(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            power: default_power(),
            nodata: default_nodata(),
            padding: 0.0,
            max_cells: default_max_cells(),
        }
    }
}

impl CacheConfig {
    /// Cache directory with a leading `~` expanded
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        match self.location.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.location)),
            None => PathBuf::from(&self.location),
        }
    }
}

impl GeoKitConfig {
    /// Load configuration from `config_path` (or the default location) and
    /// `GEOKIT_*` environment variables
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(GeoKitError::config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    ))
                    .into());
                }
                Some(path)
            }
            None => Self::get_config_path().filter(|path| path.exists()),
        };

        if let Some(config_file) = config_file {
            builder = builder.add_source(
                File::from(config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // GEOKIT_ELEVATION__BASE_URL, GEOKIT_CACHE__ENABLED, ...
        builder = builder.add_source(
            Environment::with_prefix("GEOKIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: GeoKitConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        // Apply defaults for missing values
        config.apply_defaults();

        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("geokit").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.elevation.base_url.is_empty() {
            self.elevation.base_url = default_elevation_base_url();
        }
        if self.elevation.batch_size == 0 {
            self.elevation.batch_size = default_batch_size();
        }
        if self.elevation.timeout_seconds == 0 {
            self.elevation.timeout_seconds = default_elevation_timeout();
        }
        if self.cache.ttl_hours == 0 {
            self.cache.ttl_hours = default_cache_ttl();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.interpolation.power == 0.0 {
            self.interpolation.power = default_power();
        }
        if self.interpolation.max_cells == 0 {
            self.interpolation.max_cells = default_max_cells();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.elevation.batch_size > 500 {
            return Err(GeoKitError::config("Elevation batch size cannot exceed 500").into());
        }

        if self.elevation.timeout_seconds > 300 {
            return Err(
                GeoKitError::config("Elevation API timeout cannot exceed 300 seconds").into(),
            );
        }

        if self.elevation.max_retries > 10 {
            return Err(GeoKitError::config("Elevation API max retries cannot exceed 10").into());
        }

        if self.cache.ttl_hours > 8760 {
            return Err(GeoKitError::config("Cache TTL cannot exceed 8760 hours (1 year)").into());
        }

        if !(self.interpolation.power.is_finite() && self.interpolation.power > 0.0) {
            return Err(GeoKitError::config("Interpolation power must be positive").into());
        }

        if !(self.interpolation.padding.is_finite() && self.interpolation.padding >= 0.0) {
            return Err(GeoKitError::config("Interpolation padding cannot be negative").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(GeoKitError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(GeoKitError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        if !self.elevation.base_url.starts_with("http://")
            && !self.elevation.base_url.starts_with("https://")
        {
            return Err(GeoKitError::config(
                "Elevation API base URL must be a valid HTTP or HTTPS URL",
            )
            .into());
        }

        Ok(())
    }
}
