//! Data services for SkyCast: the tracked city list, cache-backed weather
//! resources with auto-refresh, place search, and user settings.

pub mod cities;
pub mod error;
pub mod loader;
pub mod search;
pub mod settings;
pub mod weather;

pub use cities::{CityList, CITIES_KEY};
pub use error::ServiceError;
pub use loader::{Resource, ResourceState};
pub use search::{PlaceSearch, MIN_QUERY_LEN};
pub use settings::{Settings, SettingsStore, SETTINGS_KEY, TEMPERATURE_UNIT_KEY};
pub use weather::{forecast_key, weather_key, WeatherService};
