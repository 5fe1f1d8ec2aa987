//! Synthetic reading generators.
//!
//! Every field is a uniform integer drawn from the matching profile range and
//! classified with the helpers from [`envsense_core::quality`]. The thread
//! local RNG is acquired per call so the returned futures of callers stay
//! `Send`.

use envsense_core::{
    proto::{air::AirQualityResponse, water::WaterQualityForecast},
    quality::{AirQuality, WaterQuality},
    types::{AirProfile, ForecastProfile},
};
use rand::Rng;

pub fn air_reading(profile: &AirProfile) -> AirQualityResponse {
    let mut rng = rand::rng();
    let co2_level = f64::from(rng.random_range(profile.co2_level.clone()));

    AirQualityResponse {
        co2_level,
        temperature: f64::from(rng.random_range(profile.temperature.clone())),
        humidity: f64::from(rng.random_range(profile.humidity.clone())),
        air_quality: AirQuality::from_co2(co2_level).to_string(),
    }
}

pub fn forecast_reading(profile: &ForecastProfile) -> WaterQualityForecast {
    let mut rng = rand::rng();
    let ph_level = f64::from(rng.random_range(profile.ph_level.clone()));

    WaterQualityForecast {
        ph_level,
        temperature: f64::from(rng.random_range(profile.temperature.clone())),
        dissolved_oxygen: f64::from(rng.random_range(profile.dissolved_oxygen.clone())),
        water_quality: WaterQuality::from_ph(ph_level).to_string(),
    }
}
