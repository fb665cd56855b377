use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Prefix for environment overrides, e.g. `SKYCAST_WEATHER__API_KEY`.
pub const ENV_PREFIX: &str = "SKYCAST";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Measurement system requested from the weather provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Kelvin, m/s
    Standard,
    /// Celsius, m/s
    #[default]
    Metric,
    /// Fahrenheit, mph
    Imperial,
}

impl Units {
    /// Value of the provider's `units` query parameter.
    pub fn as_query(&self) -> &'static str {
        match self {
            Units::Standard => "standard",
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Units::Standard => "K",
            Units::Metric => "°C",
            Units::Imperial => "°F",
        }
    }

    pub fn speed_symbol(&self) -> &'static str {
        match self {
            Units::Imperial => "mph",
            Units::Standard | Units::Metric => "m/s",
        }
    }
}

/// Requests-per-window limit applied by an API client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub requests: u32,
    pub window_secs: u64,
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Attempts and base delay for linear retry backoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Provider API key (usually supplied via `SKYCAST_WEATHER__API_KEY`)
    pub api_key: Option<String>,
    pub base_url: String,
    pub units: Units,
    pub language: String,
    pub timeout_secs: u64,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            units: Units::Metric,
            language: "en".to_string(),
            timeout_secs: 10,
            // Free tier allows 60 calls per minute
            rate_limit: RateLimitSettings {
                requests: 60,
                window_secs: 60,
            },
            retry: RetrySettings {
                attempts: 3,
                delay_ms: 1000,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    /// Places API key (usually supplied via `SKYCAST_PLACES__API_KEY`)
    pub api_key: Option<String>,
    pub base_url: String,
    pub language: String,
    pub timeout_secs: u64,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://maps.googleapis.com/maps/api/place".to_string(),
            language: "en".to_string(),
            timeout_secs: 10,
            rate_limit: RateLimitSettings {
                requests: 100,
                window_secs: 60,
            },
            retry: RetrySettings {
                attempts: 2,
                delay_ms: 500,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one JSON file per cached key
    pub directory: PathBuf,
    pub weather_ttl_minutes: u64,
    pub forecast_ttl_minutes: u64,
    pub search_ttl_minutes: u64,
    /// Upper bound on the total size of stored values; unlimited when unset
    pub quota_bytes: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let directory = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skycast");

        Self {
            directory,
            weather_ttl_minutes: 10,
            forecast_ttl_minutes: 30,
            search_ttl_minutes: 60,
            quota_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitiesConfig {
    pub max_cities: usize,
}

impl Default for CitiesConfig {
    fn default() -> Self {
        Self { max_cities: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Auto-refresh interval in minutes; 0 disables auto-refresh
    pub interval_minutes: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub places: PlacesConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub cities: CitiesConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skycast");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            places: PlacesConfig::default(),
            cache: CacheConfig::default(),
            cities: CitiesConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default file location and the process
    /// environment, writing a default file on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::default().save_to(&config_path)?;
        }

        Self::load_with(Some(&config_path), None)
    }

    /// Load configuration layered as defaults < TOML file < environment.
    ///
    /// `env` replaces the process environment as the override source when
    /// given; keys use the `SKYCAST_SECTION__FIELD` form.
    pub fn load_with(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .context("Failed to build default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize::<Config>()
            .context("Failed to parse configuration")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.base_url, "weather.base_url", &mut result);
        self.validate_url(&self.places.base_url, "places.base_url", &mut result);

        if self.weather.api_key.as_deref().map_or(true, str::is_empty) {
            result.add_warning(
                "weather.api_key",
                "Weather API key not set - weather lookups will fail",
            );
        }
        if self.places.api_key.as_deref().map_or(true, str::is_empty) {
            result.add_warning(
                "places.api_key",
                "Places API key not set - city search will be unavailable",
            );
        }

        for (section, timeout, rate, retry) in [
            (
                "weather",
                self.weather.timeout_secs,
                &self.weather.rate_limit,
                &self.weather.retry,
            ),
            (
                "places",
                self.places.timeout_secs,
                &self.places.rate_limit,
                &self.places.retry,
            ),
        ] {
            if timeout == 0 {
                result.add_error(
                    format!("{section}.timeout_secs"),
                    "Timeout must be greater than 0",
                );
            }
            if rate.requests == 0 {
                result.add_error(
                    format!("{section}.rate_limit.requests"),
                    "Rate limit must allow at least one request",
                );
            }
            if rate.window_secs == 0 {
                result.add_error(
                    format!("{section}.rate_limit.window_secs"),
                    "Rate window must be greater than 0",
                );
            }
            if retry.attempts == 0 {
                result.add_error(
                    format!("{section}.retry.attempts"),
                    "At least one attempt is required",
                );
            }
        }

        if self.cities.max_cities == 0 {
            result.add_error("cities.max_cities", "City limit must be greater than 0");
        }

        if self.refresh.interval_minutes == 0 {
            result.add_warning("refresh.interval_minutes", "Auto-refresh disabled (0 minutes)");
        } else if self.refresh.interval_minutes > 1440 {
            result.add_warning(
                "refresh.interval_minutes",
                "Refresh interval is more than 24 hours",
            );
        }

        if self.cache.weather_ttl_minutes == 0 {
            result.add_warning(
                "cache.weather_ttl_minutes",
                "Weather caching disabled (0 minutes)",
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }
                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let mut persisted = self.clone();
        // Keys belong in the environment, not on disk
        persisted.weather.api_key = None;
        persisted.places.api_key = None;

        let contents = toml::to_string_pretty(&persisted).context("Failed to serialize config")?;
        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("skycast");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_missing_api_keys_are_warnings() {
        let result = Config::default().validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "weather.api_key"));
        assert!(result.warnings.iter().any(|w| w.field == "places.api_key"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.weather.base_url = "ftp://example.com".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_limits_are_errors() {
        let mut config = Config::default();
        config.weather.rate_limit.requests = 0;
        config.places.retry.attempts = 0;
        config.cities.max_cities = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.rate_limit.requests"));
        assert!(result.errors.iter().any(|e| e.field == "places.retry.attempts"));
        assert!(result.errors.iter().any(|e| e.field == "cities.max_cities"));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load_with(None, env(&[])).unwrap();
        assert_eq!(config.weather.units, Units::Metric);
        assert_eq!(config.weather.retry.attempts, 3);
        assert_eq!(config.cities.max_cities, 10);
    }

    #[test]
    fn test_file_then_env_layering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[weather]
units = "imperial"
language = "de"

[cities]
max_cities = 5
"#,
        )
        .unwrap();

        let config = Config::load_with(
            Some(&path),
            env(&[
                ("SKYCAST_WEATHER__API_KEY", "secret"),
                ("SKYCAST_CITIES__MAX_CITIES", "7"),
            ]),
        )
        .unwrap();

        assert_eq!(config.weather.units, Units::Imperial);
        assert_eq!(config.weather.language, "de");
        assert_eq!(config.weather.api_key.as_deref(), Some("secret"));
        assert_eq!(config.cities.max_cities, 7);
        // untouched fields keep their defaults
        assert_eq!(config.weather.timeout_secs, 10);
    }

    #[test]
    fn test_save_omits_api_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.weather.api_key = Some("secret".into());
        config.save_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("secret"));
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
