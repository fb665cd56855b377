//! The user's tracked cities, persisted under [`CITIES_KEY`].

use std::sync::Arc;

use skycast_core::CityError;
use skycast_storage::PersistentCache;
use skycast_weather::City;

use crate::weather::{forecast_key, weather_key};

pub const CITIES_KEY: &str = "userCities";

/// Ordered city list. Every successful mutation is written through to the
/// cache; rejected operations leave both the list and storage untouched.
pub struct CityList {
    cache: Arc<PersistentCache>,
    cities: Vec<City>,
    max_cities: usize,
}

impl CityList {
    pub fn load(cache: Arc<PersistentCache>, max_cities: usize) -> Self {
        let cities = cache.get::<Vec<City>>(CITIES_KEY).unwrap_or_default();
        tracing::debug!("Loaded {} cities", cities.len());
        Self {
            cache,
            cities,
            max_cities,
        }
    }

    /// Pick up changes written through other handles.
    pub fn reload(&mut self) {
        self.cities = self.cache.get::<Vec<City>>(CITIES_KEY).unwrap_or_default();
    }

    pub fn list(&self) -> &[City] {
        &self.cities
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn max_cities(&self) -> usize {
        self.max_cities
    }

    pub fn get(&self, id: &str) -> Option<&City> {
        self.cities.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn favorites(&self) -> Vec<&City> {
        self.cities.iter().filter(|c| c.is_favorite).collect()
    }

    /// Append a city.
    ///
    /// # Errors
    /// [`CityError::Duplicate`] when the id is already tracked,
    /// [`CityError::MaxReached`] when the list is full.
    pub fn add(&mut self, city: City) -> Result<(), CityError> {
        if let Some(existing) = self.get(&city.id) {
            return Err(CityError::Duplicate {
                name: existing.name.clone(),
            });
        }
        if self.cities.len() >= self.max_cities {
            return Err(CityError::MaxReached {
                max: self.max_cities,
            });
        }

        tracing::info!("Adding city {} ({})", city.display_name(), city.id);
        self.cities.push(city);
        self.persist();
        Ok(())
    }

    /// Remove a city along with its cached weather.
    pub fn remove(&mut self, id: &str) -> Result<City, CityError> {
        let index = self.index_of(id)?;
        let city = self.cities.remove(index);
        self.persist();

        self.cache.remove(&weather_key(&city.id));
        self.cache.remove(&forecast_key(&city.id));
        tracing::info!("Removed city {}", city.id);
        Ok(city)
    }

    /// Flip the favorite flag; returns the new value.
    pub fn toggle_favorite(&mut self, id: &str) -> Result<bool, CityError> {
        let index = self.index_of(id)?;
        let city = &mut self.cities[index];
        city.is_favorite = !city.is_favorite;
        let favorite = city.is_favorite;
        self.persist();
        Ok(favorite)
    }

    /// Move the city at `from` so it ends up at position `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), CityError> {
        let len = self.cities.len();
        for index in [from, to] {
            if index >= len {
                return Err(CityError::InvalidIndex { index, len });
            }
        }
        if from == to {
            return Ok(());
        }

        let city = self.cities.remove(from);
        self.cities.insert(to, city);
        self.persist();
        Ok(())
    }

    pub fn clear(&mut self) {
        for city in std::mem::take(&mut self.cities) {
            self.cache.remove(&weather_key(&city.id));
            self.cache.remove(&forecast_key(&city.id));
        }
        self.persist();
    }

    fn index_of(&self, id: &str) -> Result<usize, CityError> {
        self.cities
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| CityError::NotFound(id.to_string()))
    }

    fn persist(&self) {
        self.cache.set(CITIES_KEY, &self.cities, None);
    }
}

impl std::fmt::Debug for CityList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CityList")
            .field("cities", &self.cities.len())
            .field("max_cities", &self.max_cities)
            .finish()
    }
}
