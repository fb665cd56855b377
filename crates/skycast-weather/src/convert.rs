//! Unit conversions for display.

use serde::{Deserialize, Serialize};
use skycast_core::Units;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kelvin => "K",
        }
    }

    /// Temperature unit the provider reports in for a units system
    pub fn for_units(units: Units) -> Self {
        match units {
            Units::Standard => Self::Kelvin,
            Units::Metric => Self::Celsius,
            Units::Imperial => Self::Fahrenheit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    #[default]
    Kmh,
    Mph,
    Ms,
}

impl SpeedUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Kmh => "km/h",
            Self::Mph => "mph",
            Self::Ms => "m/s",
        }
    }

    pub fn for_units(units: Units) -> Self {
        match units {
            Units::Standard | Units::Metric => Self::Ms,
            Units::Imperial => Self::Mph,
        }
    }
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - 273.15
}

pub fn celsius_to_kelvin(c: f64) -> f64 {
    c + 273.15
}

pub fn convert_temperature(value: f64, from: TemperatureUnit, to: TemperatureUnit) -> f64 {
    if from == to {
        return value;
    }
    let celsius = match from {
        TemperatureUnit::Celsius => value,
        TemperatureUnit::Fahrenheit => fahrenheit_to_celsius(value),
        TemperatureUnit::Kelvin => kelvin_to_celsius(value),
    };
    match to {
        TemperatureUnit::Celsius => celsius,
        TemperatureUnit::Fahrenheit => celsius_to_fahrenheit(celsius),
        TemperatureUnit::Kelvin => celsius_to_kelvin(celsius),
    }
}

const MS_PER_MPH: f64 = 0.44704;

pub fn convert_speed(value: f64, from: SpeedUnit, to: SpeedUnit) -> f64 {
    if from == to {
        return value;
    }
    let ms = match from {
        SpeedUnit::Ms => value,
        SpeedUnit::Kmh => value / 3.6,
        SpeedUnit::Mph => value * MS_PER_MPH,
    };
    match to {
        SpeedUnit::Ms => ms,
        SpeedUnit::Kmh => ms * 3.6,
        SpeedUnit::Mph => ms / MS_PER_MPH,
    }
}

/// "22°C", rounded to whole degrees
pub fn format_temperature(value: f64, unit: TemperatureUnit) -> String {
    format!("{:.0}{}", value, unit.symbol())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_temperature_conversions() {
        assert!(close(celsius_to_fahrenheit(100.0), 212.0));
        assert!(close(fahrenheit_to_celsius(32.0), 0.0));
        assert!(close(
            convert_temperature(300.0, TemperatureUnit::Kelvin, TemperatureUnit::Fahrenheit),
            80.33
        ));
        assert!(close(
            convert_temperature(-40.0, TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit),
            -40.0
        ));
    }

    #[test]
    fn test_speed_conversions() {
        assert!(close(convert_speed(10.0, SpeedUnit::Ms, SpeedUnit::Kmh), 36.0));
        assert!(close(convert_speed(36.0, SpeedUnit::Kmh, SpeedUnit::Ms), 10.0));
        assert!(close(convert_speed(1.0, SpeedUnit::Mph, SpeedUnit::Ms), MS_PER_MPH));
        let round_trip = convert_speed(
            convert_speed(25.0, SpeedUnit::Mph, SpeedUnit::Kmh),
            SpeedUnit::Kmh,
            SpeedUnit::Mph,
        );
        assert!(close(round_trip, 25.0));
    }

    #[test]
    fn test_units_mapping() {
        assert_eq!(TemperatureUnit::for_units(Units::Imperial), TemperatureUnit::Fahrenheit);
        assert_eq!(SpeedUnit::for_units(Units::Metric), SpeedUnit::Ms);
    }

    #[test]
    fn test_format_temperature() {
        assert_eq!(format_temperature(21.6, TemperatureUnit::Celsius), "22°C");
    }
}
