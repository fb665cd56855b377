use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Weather condition categories mapped from provider condition codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
    #[default]
    Unknown,
}

impl WeatherCondition {
    /// Convert a provider condition id to a WeatherCondition
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_code(code: u32) -> Self {
        match code {
            200..=299 => Self::Thunderstorm,
            300..=399 => Self::Drizzle,
            511 => Self::Sleet, // Freezing rain
            500 | 501 | 520 | 521 => Self::Rain,
            502..=504 | 522 | 531 => Self::HeavyRain,
            500..=599 => Self::Rain,
            611..=616 => Self::Sleet,
            600..=699 => Self::Snow,
            700..=799 => Self::Fog,
            800 => Self::Clear,
            801 | 802 => Self::PartlyCloudy,
            803 | 804 => Self::Cloudy,
            _ => Self::Unknown,
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
            Self::Unknown => "Unknown",
        }
    }

    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Clear => "sun",
            Self::PartlyCloudy => "cloud_sun",
            Self::Cloudy => "cloud",
            Self::Fog => "cloud_fog",
            Self::Drizzle | Self::Rain | Self::HeavyRain => "cloud_rain",
            Self::Snow | Self::Sleet => "cloud_snow",
            Self::Thunderstorm => "cloud_lightning",
            Self::Unknown => "question",
        }
    }
}

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// What to ask the weather provider about
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    Coordinates(Coordinates),
    /// Provider location id
    CityId(u64),
    /// Free-text city name, e.g. "London,GB"
    Name(String),
}

impl LocationQuery {
    pub fn coordinates(lat: f64, lon: f64) -> Self {
        Self::Coordinates(Coordinates::new(lat, lon))
    }

    /// Provider query parameters identifying the location
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Coordinates(c) => vec![("lat", c.lat.to_string()), ("lon", c.lon.to_string())],
            Self::CityId(id) => vec![("id", id.to_string())],
            Self::Name(name) => vec![("q", name.clone())],
        }
    }
}

/// A city the user tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: String,
    pub name: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub is_favorite: bool,
    pub added_at: DateTime<Utc>,
}

impl City {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        country: impl Into<String>,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country: country.into(),
            state: None,
            coordinates,
            timezone: None,
            population: None,
            elevation: None,
            is_favorite: false,
            added_at: Utc::now(),
        }
    }

    /// "Portland, Oregon, US"
    pub fn display_name(&self) -> String {
        match &self.state {
            Some(state) if !state.is_empty() && state != &self.name => {
                format!("{}, {}, {}", self.name, state, self.country)
            }
            _ => format!("{}, {}", self.name, self.country),
        }
    }

    pub fn location_query(&self) -> LocationQuery {
        LocationQuery::Coordinates(self.coordinates)
    }
}

/// Provider condition as reported, plus its category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub code: u32,
    pub kind: WeatherCondition,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gust: Option<f64>,
}

/// Point-in-time weather snapshot.
///
/// Optional fields are `None` when the provider did not report them; they
/// are never filled with zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub condition: Condition,
    pub humidity: u8,
    pub pressure: f64,
    pub wind: Wind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feels_like: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_max: Option<f64>,
    /// Meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<u32>,
    /// Percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudiness: Option<u8>,
    /// Millimeters over the reporting period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rain_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snow_mm: Option<f64>,
    /// 0.0 - 1.0, forecasts only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunrise: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunset: Option<DateTime<Utc>>,
    /// Seconds east of UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// Where a forecast applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    /// Seconds east of UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset: Option<i32>,
}

/// Ordered future weather points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastData {
    pub location: ForecastLocation,
    pub points: Vec<WeatherData>,
}

/// One calendar day of forecast points, in the location's local date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub condition: WeatherCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation_probability: Option<f64>,
    pub points: usize,
}

/// Autocomplete suggestion from the places provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacePrediction {
    pub place_id: String,
    pub description: String,
    pub main_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_text: Option<String>,
}

/// Text search hit from the places provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub place_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub coordinates: Coordinates,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_codes() {
        assert_eq!(WeatherCondition::from_code(211), WeatherCondition::Thunderstorm);
        assert_eq!(WeatherCondition::from_code(301), WeatherCondition::Drizzle);
        assert_eq!(WeatherCondition::from_code(500), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::from_code(502), WeatherCondition::HeavyRain);
        assert_eq!(WeatherCondition::from_code(511), WeatherCondition::Sleet);
        assert_eq!(WeatherCondition::from_code(601), WeatherCondition::Snow);
        assert_eq!(WeatherCondition::from_code(612), WeatherCondition::Sleet);
        assert_eq!(WeatherCondition::from_code(741), WeatherCondition::Fog);
        assert_eq!(WeatherCondition::from_code(800), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_code(802), WeatherCondition::PartlyCloudy);
        assert_eq!(WeatherCondition::from_code(804), WeatherCondition::Cloudy);
    }

    #[test]
    fn test_unknown_code_is_not_clear() {
        assert_eq!(WeatherCondition::from_code(999), WeatherCondition::Unknown);
        assert_eq!(WeatherCondition::from_code(0), WeatherCondition::Unknown);
    }

    #[test]
    fn test_condition_icon_name() {
        assert_eq!(WeatherCondition::Clear.icon_name(), "sun");
        assert_eq!(WeatherCondition::Rain.icon_name(), "cloud_rain");
    }

    #[test]
    fn test_city_display_name() {
        let mut city = City::new("p1", "Portland", "US", Coordinates::new(45.5, -122.7));
        assert_eq!(city.display_name(), "Portland, US");
        city.state = Some("Oregon".into());
        assert_eq!(city.display_name(), "Portland, Oregon, US");
    }

    #[test]
    fn test_city_omits_unknown_fields_when_serialized() {
        let city = City::new("p1", "Portland", "US", Coordinates::new(45.5, -122.7));
        let json = serde_json::to_value(&city).unwrap_or_default();
        assert!(json.get("population").is_none());
        assert!(json.get("timezone").is_none());
        assert_eq!(json["is_favorite"], false);
    }

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates::new(10.0, 20.0).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -181.0).is_valid());
    }

    #[test]
    fn test_location_query_params() {
        assert_eq!(
            LocationQuery::coordinates(10.0, 20.5).params(),
            vec![("lat", "10".to_string()), ("lon", "20.5".to_string())]
        );
        assert_eq!(LocationQuery::CityId(42).params(), vec![("id", "42".to_string())]);
    }
}
