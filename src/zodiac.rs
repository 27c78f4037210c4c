//! Longitude to sign/degree/minute/second decomposition.

use serde::{Deserialize, Serialize};

use crate::ZodiacSign;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignPosition {
    /// Normalized longitude in [0, 360).
    pub longitude: f64,
    pub sign: ZodiacSign,
    pub degree: u8,
    pub minute: u8,
    pub second: u8,
}

/// Adjusts longitude values to fit the 0-360 degree range.
pub fn normalize_longitude(longitude: f64) -> f64 {
    let normalized = longitude.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Splits a longitude into its sign and the truncated degree, minute and
/// second within that sign.
pub fn sign_position(longitude: f64) -> SignPosition {
    let longitude = normalize_longitude(longitude);
    let sign_index = (longitude / 30.0).floor() as usize;
    let sign_degree = longitude % 30.0;

    let degree = sign_degree.floor();
    let minutes = (sign_degree - degree) * 60.0;
    let minute = minutes.floor();
    let second = ((minutes - minute) * 60.0).floor();

    SignPosition {
        longitude,
        sign: ZodiacSign::from_index(sign_index),
        degree: degree as u8,
        minute: (minute as u8).min(59),
        second: (second as u8).min(59),
    }
}
