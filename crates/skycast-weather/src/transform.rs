//! Provider JSON to the normalized data model.
//!
//! Required fields are non-optional in the raw structs, so a response that
//! lacks them fails to deserialize and surfaces as [`ApiError::Parse`].
//! Optional fields are copied only when the provider sent them.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use skycast_core::ApiError;

use crate::types::{
    City, Condition, Coordinates, DailySummary, ForecastData, ForecastLocation, PlacePrediction,
    PlaceResult, WeatherCondition, WeatherData, Wind,
};

fn decode<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T, ApiError> {
    T::deserialize(value).map_err(|e| ApiError::parse(format!("{}: {}", what, e)))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, ApiError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ApiError::parse(format!("timestamp out of range: {}", secs)))
}

// ---- weather provider -------------------------------------------------

#[derive(Debug, Deserialize)]
struct OwmCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    id: u32,
    #[serde(default)]
    main: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: u8,
    pressure: f64,
    feels_like: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: f64,
    deg: Option<u16>,
    gust: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmClouds {
    all: Option<u8>,
}

/// Rain and snow volume, keyed by reporting period
#[derive(Debug, Deserialize)]
struct OwmVolume {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
    #[serde(rename = "3h")]
    three_hours: Option<f64>,
}

impl OwmVolume {
    fn amount(&self) -> Option<f64> {
        self.one_hour.or(self.three_hours)
    }
}

#[derive(Debug, Deserialize)]
struct OwmSys {
    country: Option<String>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

/// Fields shared by `/weather` and each `/forecast` list entry
#[derive(Debug, Deserialize)]
struct OwmPoint {
    dt: i64,
    main: OwmMain,
    weather: Vec<OwmCondition>,
    wind: OwmWind,
    visibility: Option<u32>,
    clouds: Option<OwmClouds>,
    rain: Option<OwmVolume>,
    snow: Option<OwmVolume>,
    pop: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmCurrent {
    #[serde(flatten)]
    point: OwmPoint,
    coord: Option<OwmCoord>,
    sys: Option<OwmSys>,
    timezone: Option<i32>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwmForecastCity {
    id: Option<u64>,
    #[serde(default)]
    name: String,
    coord: Option<OwmCoord>,
    country: Option<String>,
    population: Option<u64>,
    timezone: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OwmForecast {
    list: Vec<Value>,
    city: OwmForecastCity,
}

impl OwmPoint {
    fn into_weather(self) -> Result<WeatherData, ApiError> {
        let first = self
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::parse("weather: empty condition list"))?;

        Ok(WeatherData {
            timestamp: timestamp(self.dt)?,
            temperature: self.main.temp,
            condition: Condition {
                code: first.id,
                kind: WeatherCondition::from_code(first.id),
                main: first.main,
                description: first.description,
                icon: first.icon,
            },
            humidity: self.main.humidity,
            pressure: self.main.pressure,
            wind: Wind {
                speed: self.wind.speed,
                direction: self.wind.deg,
                gust: self.wind.gust,
            },
            feels_like: self.main.feels_like,
            temp_min: self.main.temp_min,
            temp_max: self.main.temp_max,
            visibility: self.visibility,
            cloudiness: self.clouds.and_then(|c| c.all),
            rain_mm: self.rain.as_ref().and_then(OwmVolume::amount),
            snow_mm: self.snow.as_ref().and_then(OwmVolume::amount),
            precipitation_probability: self.pop,
            sunrise: None,
            sunset: None,
            timezone_offset: None,
            location_name: None,
            country: None,
            coordinates: None,
        })
    }
}

/// Map a `/weather` response.
pub fn current_weather(raw: &Value) -> Result<WeatherData, ApiError> {
    let current: OwmCurrent = decode(raw, "current weather")?;
    let sys = current.sys;

    let mut data = current.point.into_weather()?;
    data.timezone_offset = current.timezone;
    data.location_name = current.name.filter(|n| !n.is_empty());
    data.coordinates = current.coord.map(|c| Coordinates::new(c.lat, c.lon));
    if let Some(sys) = sys {
        data.country = sys.country;
        data.sunrise = sys.sunrise.map(timestamp).transpose()?;
        data.sunset = sys.sunset.map(timestamp).transpose()?;
    }
    Ok(data)
}

/// Map a `/forecast` response. Points keep the provider's order.
pub fn forecast(raw: &Value) -> Result<ForecastData, ApiError> {
    let forecast: OwmForecast = decode(raw, "forecast")?;
    let city = forecast.city;

    let points = forecast
        .list
        .iter()
        .map(|entry| {
            let mut point = decode::<OwmPoint>(entry, "forecast point")?.into_weather()?;
            point.timezone_offset = city.timezone;
            Ok(point)
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(ForecastData {
        location: ForecastLocation {
            id: city.id,
            name: city.name,
            country: city.country,
            coordinates: city.coord.map(|c| Coordinates::new(c.lat, c.lon)),
            population: city.population,
            timezone_offset: city.timezone,
        },
        points,
    })
}

/// Group forecast points into calendar days of the location's local time.
///
/// Days come out in chronological order. The dominant condition is the most
/// frequent one; ties go to whichever appeared first that day.
pub fn daily_summaries(forecast: &ForecastData) -> Vec<DailySummary> {
    let offset = Duration::seconds(i64::from(forecast.location.timezone_offset.unwrap_or(0)));

    let mut order: Vec<NaiveDate> = Vec::new();
    let mut days: HashMap<NaiveDate, Vec<&WeatherData>> = HashMap::new();
    for point in &forecast.points {
        let date = (point.timestamp + offset).date_naive();
        days.entry(date)
            .or_insert_with(|| {
                order.push(date);
                Vec::new()
            })
            .push(point);
    }
    order.sort();

    order
        .into_iter()
        .filter_map(|date| days.remove(&date).map(|points| summarize(date, &points)))
        .collect()
}

fn summarize(date: NaiveDate, points: &[&WeatherData]) -> DailySummary {
    let high = points
        .iter()
        .map(|p| p.temp_max.unwrap_or(p.temperature))
        .fold(f64::NEG_INFINITY, f64::max);
    let low = points
        .iter()
        .map(|p| p.temp_min.unwrap_or(p.temperature))
        .fold(f64::INFINITY, f64::min);

    let mut counts: Vec<(WeatherCondition, usize)> = Vec::new();
    for point in points {
        match counts.iter_mut().find(|(kind, _)| *kind == point.condition.kind) {
            Some((_, n)) => *n += 1,
            None => counts.push((point.condition.kind, 1)),
        }
    }
    let mut condition = WeatherCondition::Unknown;
    let mut best = 0;
    for (kind, n) in counts {
        if n > best {
            condition = kind;
            best = n;
        }
    }

    let precipitation_probability = points
        .iter()
        .filter_map(|p| p.precipitation_probability)
        .reduce(f64::max);

    DailySummary {
        date,
        high,
        low,
        condition,
        precipitation_probability,
        points: points.len(),
    }
}

// ---- places provider --------------------------------------------------

/// Places responses report failure in the body, often with HTTP 200.
/// Returns `Ok(false)` for `ZERO_RESULTS`.
pub fn check_places_status(raw: &Value) -> Result<bool, ApiError> {
    let status = raw.get("status").and_then(Value::as_str).unwrap_or("OK");
    let message = raw
        .get("error_message")
        .and_then(Value::as_str)
        .unwrap_or(status)
        .to_string();

    match status {
        "OK" => Ok(true),
        "ZERO_RESULTS" => Ok(false),
        "INVALID_REQUEST" | "NOT_FOUND" => Err(ApiError::http(400, message)),
        "REQUEST_DENIED" => Err(ApiError::http(403, message)),
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => Err(ApiError::http(429, message)),
        _ => Err(ApiError::http(500, message)),
    }
}

#[derive(Debug, Deserialize)]
struct GLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct GGeometry {
    location: GLatLng,
}

#[derive(Debug, Deserialize)]
struct GSearchResult {
    place_id: String,
    name: String,
    formatted_address: Option<String>,
    geometry: GGeometry,
}

#[derive(Debug, Deserialize)]
struct GSearchResponse {
    #[serde(default)]
    results: Vec<GSearchResult>,
}

#[derive(Debug, Deserialize)]
struct GStructuredFormatting {
    main_text: String,
    secondary_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GPrediction {
    place_id: String,
    description: String,
    structured_formatting: Option<GStructuredFormatting>,
}

#[derive(Debug, Deserialize)]
struct GAutocompleteResponse {
    #[serde(default)]
    predictions: Vec<GPrediction>,
}

#[derive(Debug, Deserialize)]
struct GAddressComponent {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GDetails {
    place_id: String,
    name: String,
    geometry: GGeometry,
    #[serde(default)]
    address_components: Vec<GAddressComponent>,
    utc_offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct GDetailsResponse {
    result: GDetails,
}

/// Map a `/textsearch/json` response.
pub fn place_results(raw: &Value) -> Result<Vec<PlaceResult>, ApiError> {
    if !check_places_status(raw)? {
        return Ok(Vec::new());
    }
    let response: GSearchResponse = decode(raw, "place search")?;
    Ok(response
        .results
        .into_iter()
        .map(|r| PlaceResult {
            place_id: r.place_id,
            name: r.name,
            address: r.formatted_address,
            coordinates: Coordinates::new(r.geometry.location.lat, r.geometry.location.lng),
        })
        .collect())
}

/// Map an `/autocomplete/json` response.
pub fn predictions(raw: &Value) -> Result<Vec<PlacePrediction>, ApiError> {
    if !check_places_status(raw)? {
        return Ok(Vec::new());
    }
    let response: GAutocompleteResponse = decode(raw, "autocomplete")?;
    Ok(response
        .predictions
        .into_iter()
        .map(|p| {
            let (main_text, secondary_text) = match p.structured_formatting {
                Some(f) => (f.main_text, f.secondary_text),
                None => (p.description.clone(), None),
            };
            PlacePrediction {
                place_id: p.place_id,
                description: p.description,
                main_text,
                secondary_text,
            }
        })
        .collect())
}

/// Map a `/details/json` response to a trackable city.
pub fn city_from_details(raw: &Value) -> Result<City, ApiError> {
    if !check_places_status(raw)? {
        return Err(ApiError::http(404, "place not found"));
    }
    let details = decode::<GDetailsResponse>(raw, "place details")?.result;

    let component = |kind: &str| {
        details
            .address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == kind))
    };

    let name = component("locality")
        .map(|c| c.long_name.clone())
        .unwrap_or_else(|| details.name.clone());
    let country = component("country")
        .map(|c| c.short_name.clone())
        .unwrap_or_default();
    let state = component("administrative_area_level_1").map(|c| c.long_name.clone());

    let mut city = City::new(
        details.place_id.clone(),
        name,
        country,
        Coordinates::new(details.geometry.location.lat, details.geometry.location.lng),
    );
    city.state = state;
    city.timezone = details.utc_offset.map(format_utc_offset);
    Ok(city)
}

/// Minutes east of UTC as `UTC+05:30`
fn format_utc_offset(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let minutes = minutes.abs();
    format!("UTC{}{:02}:{:02}", sign, minutes / 60, minutes % 60)
}
