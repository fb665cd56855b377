//! Current conditions and forecasts for tracked cities.

use std::sync::Arc;
use std::time::Duration;

use skycast_core::CacheConfig;
use skycast_storage::PersistentCache;
use skycast_weather::{City, ForecastData, WeatherClient, WeatherData};

use crate::loader::Resource;

pub fn weather_key(city_id: &str) -> String {
    format!("weather_{}", city_id)
}

pub fn forecast_key(city_id: &str) -> String {
    format!("forecast_{}", city_id)
}

/// Hands out per-city [`Resource`]s backed by one client and cache.
#[derive(Debug, Clone)]
pub struct WeatherService {
    client: WeatherClient,
    cache: Arc<PersistentCache>,
    weather_ttl: Duration,
    forecast_ttl: Duration,
}

impl WeatherService {
    pub fn new(client: WeatherClient, cache: Arc<PersistentCache>, config: &CacheConfig) -> Self {
        Self {
            client,
            cache,
            weather_ttl: Duration::from_secs(config.weather_ttl_minutes * 60),
            forecast_ttl: Duration::from_secs(config.forecast_ttl_minutes * 60),
        }
    }

    pub fn client(&self) -> &WeatherClient {
        &self.client
    }

    pub fn current(&self, city: &City) -> Resource<WeatherData> {
        let client = self.client.clone();
        let query = city.location_query();
        Resource::new(
            self.cache.clone(),
            weather_key(&city.id),
            self.weather_ttl,
            move |token| {
                let client = client.clone();
                let query = query.clone();
                async move { client.current_weather(&query, &token).await }
            },
        )
    }

    pub fn forecast(&self, city: &City) -> Resource<ForecastData> {
        let client = self.client.clone();
        let query = city.location_query();
        Resource::new(
            self.cache.clone(),
            forecast_key(&city.id),
            self.forecast_ttl,
            move |token| {
                let client = client.clone();
                let query = query.clone();
                async move { client.forecast(&query, &token).await }
            },
        )
    }
}
