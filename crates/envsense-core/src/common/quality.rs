//! # Air and Water Quality Classification
//!
//! Pure threshold functions that turn a raw measurement into the label sent
//! on the wire. They carry no state and are shared by the unary air-quality
//! handler, the forecast producer and the upload summary.
//!
//! | CO2 level (ppm) | [`AirQuality`] |
//! |-----------------|----------------|
//! | `< 350`         | Very good      |
//! | `< 450`         | Good           |
//! | `< 600`         | Fair           |
//! | `< 800`         | Poor           |
//! | otherwise       | Very poor      |
//!
//! | pH level | [`WaterQuality`] |
//! |----------|------------------|
//! | `< 6.5`  | Poor             |
//! | `< 8`    | Good             |
//! | otherwise| Very good        |

use core::fmt;

/// Air quality derived from a CO2 concentration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AirQuality {
    VeryGood,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl AirQuality {
    /// Classifies a CO2 level in parts per million.
    pub fn from_co2(level: f64) -> Self {
        if level < 350.0 {
            Self::VeryGood
        } else if level < 450.0 {
            Self::Good
        } else if level < 600.0 {
            Self::Fair
        } else if level < 800.0 {
            Self::Poor
        } else {
            Self::VeryPoor
        }
    }

    /// The label used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VeryGood => "Very good",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::VeryPoor => "Very poor",
        }
    }
}

impl fmt::Display for AirQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Water quality derived from a pH level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaterQuality {
    Poor,
    Good,
    VeryGood,
}

impl WaterQuality {
    /// Classifies a pH level. The upper boundary is inclusive: a pH of exactly
    /// 8 is [`WaterQuality::VeryGood`].
    pub fn from_ph(level: f64) -> Self {
        if level < 6.5 {
            Self::Poor
        } else if level < 8.0 {
            Self::Good
        } else {
            Self::VeryGood
        }
    }

    /// The label used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Poor => "Poor",
            Self::Good => "Good",
            Self::VeryGood => "Very good",
        }
    }
}

impl fmt::Display for WaterQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
