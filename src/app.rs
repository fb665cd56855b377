use std::sync::Arc;

use anyhow::{Context, Result};
use skycast_core::Config;
use skycast_services::{CityList, PlaceSearch, SettingsStore, WeatherService};
use skycast_storage::Storage;
use skycast_weather::{PlacesClient, WeatherClient};

/// Explicitly wired handles for one run of the program
pub struct App {
    config: Config,
    storage: Storage,
}

impl App {
    /// Load configuration and open the cache directory
    pub fn new() -> Result<Self> {
        let (config, _) = Config::load_validated()?;

        let storage = Storage::open(&config.cache.directory, config.cache.quota_bytes)
            .with_context(|| {
                format!(
                    "Failed to open cache directory {}",
                    config.cache.directory.display()
                )
            })?;

        tracing::debug!("Cache directory: {}", config.cache.directory.display());
        Ok(Self { config, storage })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cities(&self) -> CityList {
        CityList::load(Arc::new(self.storage.cache()), self.config.cities.max_cities)
    }

    pub fn settings(&self) -> SettingsStore {
        SettingsStore::new(Arc::new(self.storage.cache()))
    }

    pub fn weather_client(&self) -> Result<WeatherClient> {
        WeatherClient::new(&self.config.weather).map_err(|e| {
            anyhow::anyhow!("{} (set SKYCAST_WEATHER__API_KEY)", e)
        })
    }

    /// Weather service using the user's cache TTL from settings
    pub fn weather(&self) -> Result<WeatherService> {
        let settings = self.settings().load();
        Ok(WeatherService::new(
            self.weather_client()?,
            Arc::new(self.storage.cache()),
            &settings.data.apply_to(&self.config.cache),
        ))
    }

    pub fn places(&self) -> Result<PlaceSearch> {
        let client = PlacesClient::new(&self.config.places)
            .map_err(|e| anyhow::anyhow!("{} (set SKYCAST_PLACES__API_KEY)", e))?;
        Ok(PlaceSearch::new(
            client,
            Arc::new(self.storage.cache()),
            self.config.cache.search_ttl_minutes,
        ))
    }
}
