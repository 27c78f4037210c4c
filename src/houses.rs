//! House systems, cusp sets and house assignment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::ChartError;
use crate::zodiac::normalize_longitude;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HouseSystem {
    #[default]
    Placidus,
    Koch,
    Porphyry,
    Regiomontanus,
    Campanus,
    Equal,
    WholeSign,
}

impl HouseSystem {
    /// Single-letter code understood by the Swiss Ephemeris `swe_houses*` calls.
    pub fn code(self) -> char {
        match self {
            HouseSystem::Placidus => 'P',
            HouseSystem::Koch => 'K',
            HouseSystem::Porphyry => 'O',
            HouseSystem::Regiomontanus => 'R',
            HouseSystem::Campanus => 'C',
            HouseSystem::Equal => 'E',
            HouseSystem::WholeSign => 'W',
        }
    }
}

impl fmt::Display for HouseSystem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            HouseSystem::Placidus => "placidus",
            HouseSystem::Koch => "koch",
            HouseSystem::Porphyry => "porphyry",
            HouseSystem::Regiomontanus => "regiomontanus",
            HouseSystem::Campanus => "campanus",
            HouseSystem::Equal => "equal",
            HouseSystem::WholeSign => "whole_sign",
        };
        f.write_str(name)
    }
}

impl FromStr for HouseSystem {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placidus" | "p" => Ok(HouseSystem::Placidus),
            "koch" | "k" => Ok(HouseSystem::Koch),
            "porphyry" | "o" => Ok(HouseSystem::Porphyry),
            "regiomontanus" | "r" => Ok(HouseSystem::Regiomontanus),
            "campanus" | "c" => Ok(HouseSystem::Campanus),
            "equal" | "e" => Ok(HouseSystem::Equal),
            "whole_sign" | "whole-sign" | "w" => Ok(HouseSystem::WholeSign),
            other => Err(ChartError::InvalidInput(format!("unknown house system `{other}`"))),
        }
    }
}

/// Output of a house computation. `cusps[i]` is where house `i + 1` begins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HouseCusps {
    pub cusps: [f64; 12],
    pub ascendant: f64,
    pub midheaven: f64,
}

impl HouseCusps {
    pub fn house_of(&self, longitude: f64) -> u8 {
        house_for_longitude(longitude, &self.cusps)
    }

    /// Copy with every longitude normalized to [0, 360).
    pub fn normalized(&self) -> HouseCusps {
        HouseCusps {
            cusps: self.cusps.map(normalize_longitude),
            ascendant: normalize_longitude(self.ascendant),
            midheaven: normalize_longitude(self.midheaven),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.cusps.iter().all(|cusp| cusp.is_finite())
            && self.ascendant.is_finite()
            && self.midheaven.is_finite()
    }
}

/// Returns the house (1-12) whose cyclic interval `[cusps[i], cusps[i+1])`
/// contains `longitude`. A longitude equal to a cusp belongs to the house
/// starting there.
///
/// Falls back to house 1 when no interval matches, which only happens with
/// degenerate cusp sets.
pub fn house_for_longitude(longitude: f64, cusps: &[f64; 12]) -> u8 {
    let longitude = normalize_longitude(longitude);
    let cusps = cusps.map(normalize_longitude);

    for index in 0..12 {
        if interval_contains(cusps[index], cusps[(index + 1) % 12], longitude) {
            return index as u8 + 1;
        }
    }

    debug!(longitude, ?cusps, "no house interval matched, defaulting to house 1");
    1
}

pub(crate) fn interval_contains(start: f64, end: f64, longitude: f64) -> bool {
    if end > start {
        longitude >= start && longitude < end
    } else if end < start {
        longitude >= start || longitude < end
    } else {
        false
    }
}
