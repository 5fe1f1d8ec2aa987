//! # Protocol Constants and Sampling Profiles
//!
//! The readings served by envsense are synthetic: each field is a uniformly
//! distributed integer drawn from an inclusive range. The ranges are grouped
//! into profiles so that deployments and tests can swap them without touching
//! the producers.
//!
//! ## Constants
//!
//! - [`DISTRICTS`] - Valid district identifiers for `GetAirQuality`.
//! - [`FORECAST_READINGS`] - Readings emitted per forecast stream.
//! - [`FORECAST_INTERVAL`] - Delay between two forecast readings.

use core::ops::RangeInclusive;
use core::time::Duration;

/// Dublin postal districts accepted by `GetAirQuality`.
pub const DISTRICTS: RangeInclusive<i32> = 1..=24;

/// Number of readings a forecast stream emits before completing.
pub const FORECAST_READINGS: usize = 5;

/// Delay between two consecutive forecast readings.
pub const FORECAST_INTERVAL: Duration = Duration::from_secs(2);

/// Ranges used to synthesize an air quality reading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AirProfile {
    /// CO2 concentration in ppm.
    pub co2_level: RangeInclusive<u32>,
    /// Temperature in °C.
    pub temperature: RangeInclusive<u32>,
    /// Relative humidity in %.
    pub humidity: RangeInclusive<u32>,
}

impl Default for AirProfile {
    fn default() -> Self {
        Self {
            co2_level: 300..=500,
            temperature: 10..=30,
            humidity: 30..=70,
        }
    }
}

/// Ranges used to synthesize a water quality forecast reading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForecastProfile {
    pub ph_level: RangeInclusive<u32>,
    /// Temperature in °C.
    pub temperature: RangeInclusive<u32>,
    /// Dissolved oxygen in mg/L.
    pub dissolved_oxygen: RangeInclusive<u32>,
}

impl Default for ForecastProfile {
    fn default() -> Self {
        Self {
            ph_level: 6..=8,
            temperature: 10..=20,
            dissolved_oxygen: 5..=10,
        }
    }
}
