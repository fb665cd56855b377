//! User preferences and their persistence.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use skycast_core::{CacheConfig, ValidationResult};
use skycast_storage::PersistentCache;
use skycast_weather::{SpeedUnit, TemperatureUnit};

use crate::error::ServiceError;

pub const SETTINGS_KEY: &str = "settings";
pub const TEMPERATURE_UNIT_KEY: &str = "temperatureUnit";

/// Days of forecast the provider offers
pub const MAX_FORECAST_DAYS: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PressureUnit {
    #[default]
    Hpa,
    Inhg,
    Mmhg,
}

impl PressureUnit {
    /// Convert from hectopascals, the provider's unit.
    pub fn from_hpa(self, hpa: f64) -> f64 {
        match self {
            PressureUnit::Hpa => hpa,
            PressureUnit::Inhg => hpa * 0.029_53,
            PressureUnit::Mmhg => hpa * 0.750_06,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            PressureUnit::Hpa => "hPa",
            PressureUnit::Inhg => "inHg",
            PressureUnit::Mmhg => "mmHg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimeFormat {
    #[serde(rename = "12h")]
    TwelveHour,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl TimeFormat {
    /// `chrono` format string for a clock time.
    pub fn pattern(self) -> &'static str {
        match self {
            TimeFormat::TwelveHour => "%I:%M %p",
            TimeFormat::TwentyFourHour => "%H:%M",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UnitSettings {
    pub temperature: TemperatureUnit,
    pub wind_speed: SpeedUnit,
    pub pressure: PressureUnit,
    pub time_format: TimeFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub theme: Theme,
    pub language: String,
    pub show_feels_like: bool,
    pub forecast_days: u8,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            language: "en".to_string(),
            show_feels_like: true,
            forecast_days: MAX_FORECAST_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub severe_alerts: bool,
    /// Local time as `HH:MM`
    pub daily_summary_time: Option<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            severe_alerts: true,
            daily_summary_time: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrivacySettings {
    pub analytics: bool,
    pub location_sharing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub refresh_interval_minutes: u32,
    pub cache_ttl_minutes: u32,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: 15,
            cache_ttl_minutes: 10,
        }
    }
}

impl DataSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_interval_minutes.max(1)) * 60)
    }

    /// The installation's cache settings with the user's weather TTL applied.
    pub fn apply_to(&self, cache: &CacheConfig) -> CacheConfig {
        CacheConfig {
            weather_ttl_minutes: u64::from(self.cache_ttl_minutes.max(1)),
            ..cache.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub units: UnitSettings,
    pub display: DisplaySettings,
    pub notifications: NotificationSettings,
    pub privacy: PrivacySettings,
    pub data: DataSettings,
}

impl Settings {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.display.language.trim().is_empty() {
            result.add_error("display.language", "Language cannot be empty");
        }
        if !(1..=MAX_FORECAST_DAYS).contains(&self.display.forecast_days) {
            result.add_error(
                "display.forecast_days",
                format!("Must be between 1 and {}", MAX_FORECAST_DAYS),
            );
        }

        if let Some(time) = &self.notifications.daily_summary_time {
            if NaiveTime::parse_from_str(time, "%H:%M").is_err() {
                result.add_error(
                    "notifications.daily_summary_time",
                    format!("'{}' is not a HH:MM time", time),
                );
            }
        }
        if self.notifications.enabled
            && !self.notifications.severe_alerts
            && self.notifications.daily_summary_time.is_none()
        {
            result.add_warning("notifications", "Enabled, but nothing is selected to notify about");
        }

        if self.data.refresh_interval_minutes == 0 {
            result.add_error("data.refresh_interval_minutes", "Must be at least 1 minute");
        } else if self.data.refresh_interval_minutes > 24 * 60 {
            result.add_warning(
                "data.refresh_interval_minutes",
                "Refreshing less than once a day will show stale weather",
            );
        }
        if self.data.cache_ttl_minutes == 0 {
            result.add_error("data.cache_ttl_minutes", "Must be at least 1 minute");
        }

        result
    }
}

/// Loads and saves [`Settings`] through the cache.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    cache: Arc<PersistentCache>,
}

impl SettingsStore {
    pub fn new(cache: Arc<PersistentCache>) -> Self {
        Self { cache }
    }

    /// Stored settings, or defaults when nothing valid is stored. The
    /// standalone temperature unit key wins over the nested value.
    pub fn load(&self) -> Settings {
        let mut settings = match self.cache.get::<Settings>(SETTINGS_KEY) {
            Some(s) if s.validate().is_valid() => s,
            Some(s) => {
                tracing::warn!(
                    "Stored settings are invalid, using defaults: {}",
                    s.validate().error_summary()
                );
                Settings::default()
            }
            None => Settings::default(),
        };

        if let Some(unit) = self.cache.get::<TemperatureUnit>(TEMPERATURE_UNIT_KEY) {
            settings.units.temperature = unit;
        }
        settings
    }

    /// # Errors
    /// [`ServiceError::InvalidSettings`] when validation fails; nothing is
    /// written in that case.
    pub fn save(&self, settings: &Settings) -> Result<(), ServiceError> {
        let validation = settings.validate();
        if !validation.is_valid() {
            return Err(ServiceError::InvalidSettings(validation.error_summary()));
        }
        for warning in &validation.warnings {
            tracing::warn!("Settings: {}", warning);
        }

        self.cache.set(SETTINGS_KEY, settings, None);
        self.cache
            .set(TEMPERATURE_UNIT_KEY, &settings.units.temperature, None);
        tracing::info!("Settings saved");
        Ok(())
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        self.load().units.temperature
    }

    pub fn set_temperature_unit(&self, unit: TemperatureUnit) {
        self.cache.set(TEMPERATURE_UNIT_KEY, &unit, None);
    }

    pub fn reset(&self) {
        self.cache.remove(SETTINGS_KEY);
        self.cache.remove(TEMPERATURE_UNIT_KEY);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;
    use skycast_storage::Storage;

    fn store() -> (Storage, SettingsStore) {
        let storage = Storage::in_memory();
        let store = SettingsStore::new(Arc::new(storage.cache()));
        (storage, store)
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_valid());
    }

    #[test]
    fn test_load_without_stored_settings_gives_defaults() {
        let (_storage, store) = store();
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let (_storage, store) = store();
        let mut settings = Settings::default();
        settings.display.theme = Theme::Dark;
        settings.units.wind_speed = SpeedUnit::Mph;
        settings.notifications.daily_summary_time = Some("07:30".into());

        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn test_invalid_settings_are_not_saved() {
        let (_storage, store) = store();
        let mut settings = Settings::default();
        settings.display.forecast_days = 9;
        settings.notifications.daily_summary_time = Some("25:00".into());

        let err = store.save(&settings).unwrap_err();
        let summary = match err {
            ServiceError::InvalidSettings(summary) => summary,
            other => other.to_string(),
        };
        assert!(summary.contains("display.forecast_days"));
        assert!(summary.contains("notifications.daily_summary_time"));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_partial_stored_settings_fill_defaults() {
        let (storage, store) = store();
        storage
            .cache()
            .set(SETTINGS_KEY, &json!({"display": {"theme": "light"}}), None);

        let loaded = store.load();
        assert_eq!(loaded.display.theme, Theme::Light);
        assert_eq!(loaded.display.forecast_days, MAX_FORECAST_DAYS);
        assert_eq!(loaded.data, DataSettings::default());
    }

    #[test]
    fn test_invalid_stored_settings_fall_back_to_defaults() {
        let (storage, store) = store();
        storage
            .cache()
            .set(SETTINGS_KEY, &json!({"data": {"cache_ttl_minutes": 0}}), None);
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_temperature_unit_key_overrides() {
        let (storage, store) = store();
        store.save(&Settings::default()).unwrap();
        store.set_temperature_unit(TemperatureUnit::Fahrenheit);

        assert_eq!(store.temperature_unit(), TemperatureUnit::Fahrenheit);
        let raw: String = storage.cache().get(TEMPERATURE_UNIT_KEY).unwrap();
        assert_eq!(raw, "fahrenheit");
    }

    #[test]
    fn test_zero_refresh_interval_is_an_error() {
        let mut settings = Settings::default();
        settings.data.refresh_interval_minutes = 0;
        assert!(!settings.validate().is_valid());
    }

    #[test]
    fn test_display_units() {
        assert_eq!(PressureUnit::Hpa.from_hpa(1013.0), 1013.0);
        assert!((PressureUnit::Inhg.from_hpa(1013.25) - 29.92).abs() < 0.01);
        assert!((PressureUnit::Mmhg.from_hpa(1013.25) - 760.0).abs() < 0.1);
        assert_eq!(PressureUnit::Mmhg.symbol(), "mmHg");

        let noon = NaiveTime::from_hms_opt(13, 5, 0).unwrap();
        assert_eq!(noon.format(TimeFormat::TwentyFourHour.pattern()).to_string(), "13:05");
        assert_eq!(noon.format(TimeFormat::TwelveHour.pattern()).to_string(), "01:05 PM");
    }

    #[test]
    fn test_data_settings_drive_refresh_and_cache_ttl() {
        let data = DataSettings {
            refresh_interval_minutes: 5,
            cache_ttl_minutes: 3,
        };
        assert_eq!(data.refresh_interval(), Duration::from_secs(300));

        let base = CacheConfig::default();
        let applied = data.apply_to(&base);
        assert_eq!(applied.weather_ttl_minutes, 3);
        assert_eq!(applied.forecast_ttl_minutes, base.forecast_ttl_minutes);
        assert_eq!(applied.directory, base.directory);
    }
}
