//! Natal chart and transit computation.
//!
//! Birth data is normalized to a Julian Day, handed to an injected
//! [`EphemerisProvider`] for body longitudes and house cusps, decomposed into
//! sign/degree/minute/second, assigned to houses and persisted per user.
//! [`TransitAnalyzer`] produces the live sky snapshot with aspects and the
//! lunar phase.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod analytic;
pub mod cache;
pub mod chart;
pub mod config;
pub mod ephemeris;
pub mod error;
pub mod geocoding;
#[cfg(feature = "horizons")]
pub mod horizons;
pub mod houses;
pub mod logging;
pub mod service;
pub mod store;
#[cfg(feature = "swisseph")]
pub mod swisseph;
pub mod time;
pub mod transit;
pub mod zodiac;

pub use analytic::AnalyticEphemeris;
pub use cache::{ChartCache, InMemoryChartCache};
pub use chart::{assemble_points, ChartAssembler, NatalChart};
pub use config::ChartConfig;
pub use ephemeris::{BodyPositions, EphemerisAdapter, EphemerisProvider};
pub use error::{ChartError, ChartResult, EphemerisError, GeocodingError, PersistenceError};
pub use geocoding::{GeoLocation, Geocoder};
#[cfg(feature = "opencage")]
pub use geocoding::OpenCageGeocoder;
#[cfg(feature = "horizons")]
pub use horizons::HorizonsEphemeris;
pub use houses::{house_for_longitude, HouseCusps, HouseSystem};
pub use service::ChartService;
pub use store::{ChartRepository, SqliteChartRepository, StoreResult};
#[cfg(feature = "swisseph")]
pub use swisseph::SwissEphemeris;
pub use time::{compute_julian_day, date_to_julian_day, julian_day_to_date};
pub use transit::{
    angular_separation, classify_aspect, find_aspects, moon_phase, Aspect, AspectKind, MoonPhase,
    SkyReport, TransitAnalyzer, TransitSnapshot,
};
pub use zodiac::{normalize_longitude, sign_position, SignPosition};

pub type JulianDay = f64;
pub type UserId = i64;

// ---------------------------
// ## Enumerations
// ---------------------------

/// Bodies tracked for natal charts and transit snapshots.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CelestialBody {
    Sun,
    Moon,
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
    NorthNode,
    Chiron,
}

impl CelestialBody {
    pub const ALL: [CelestialBody; 12] = [
        CelestialBody::Sun,
        CelestialBody::Moon,
        CelestialBody::Mercury,
        CelestialBody::Venus,
        CelestialBody::Mars,
        CelestialBody::Jupiter,
        CelestialBody::Saturn,
        CelestialBody::Uranus,
        CelestialBody::Neptune,
        CelestialBody::Pluto,
        CelestialBody::NorthNode,
        CelestialBody::Chiron,
    ];

    pub fn iter() -> impl Iterator<Item = CelestialBody> {
        Self::ALL.iter().copied()
    }

    /// Stable identifier used for persisted point names.
    pub fn name(self) -> &'static str {
        match self {
            CelestialBody::Sun => "sun",
            CelestialBody::Moon => "moon",
            CelestialBody::Mercury => "mercury",
            CelestialBody::Venus => "venus",
            CelestialBody::Mars => "mars",
            CelestialBody::Jupiter => "jupiter",
            CelestialBody::Saturn => "saturn",
            CelestialBody::Uranus => "uranus",
            CelestialBody::Neptune => "neptune",
            CelestialBody::Pluto => "pluto",
            CelestialBody::NorthNode => "north_node",
            CelestialBody::Chiron => "chiron",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CelestialBody::Sun => "Sun",
            CelestialBody::Moon => "Moon",
            CelestialBody::Mercury => "Mercury",
            CelestialBody::Venus => "Venus",
            CelestialBody::Mars => "Mars",
            CelestialBody::Jupiter => "Jupiter",
            CelestialBody::Saturn => "Saturn",
            CelestialBody::Uranus => "Uranus",
            CelestialBody::Neptune => "Neptune",
            CelestialBody::Pluto => "Pluto",
            CelestialBody::NorthNode => "North Node",
            CelestialBody::Chiron => "Chiron",
        }
    }

    /// Static classification table: the lunar node is a point, Chiron a
    /// minor body, everything else a planet.
    pub fn point_type(self) -> PointType {
        match self {
            CelestialBody::NorthNode => PointType::Point,
            CelestialBody::Chiron => PointType::Asteroid,
            _ => PointType::Planet,
        }
    }

    /// Swiss Ephemeris body number (`SE_SUN` .. `SE_PLUTO`, `SE_TRUE_NODE`, `SE_CHIRON`).
    pub fn swisseph_id(self) -> i32 {
        match self {
            CelestialBody::Sun => 0,
            CelestialBody::Moon => 1,
            CelestialBody::Mercury => 2,
            CelestialBody::Venus => 3,
            CelestialBody::Mars => 4,
            CelestialBody::Jupiter => 5,
            CelestialBody::Saturn => 6,
            CelestialBody::Uranus => 7,
            CelestialBody::Neptune => 8,
            CelestialBody::Pluto => 9,
            CelestialBody::NorthNode => 11,
            CelestialBody::Chiron => 15,
        }
    }
}

impl fmt::Display for CelestialBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CelestialBody {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CelestialBody::iter()
            .find(|body| body.name() == s)
            .ok_or_else(|| ChartError::InvalidInput(format!("unknown body `{s}`")))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointType {
    Planet,
    Point,
    Asteroid,
}

impl PointType {
    pub fn as_str(self) -> &'static str {
        match self {
            PointType::Planet => "planet",
            PointType::Point => "point",
            PointType::Asteroid => "asteroid",
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointType {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planet" => Ok(PointType::Planet),
            "point" => Ok(PointType::Point),
            "asteroid" => Ok(PointType::Asteroid),
            other => Err(ChartError::InvalidInput(format!("unknown point type `{other}`"))),
        }
    }
}

/// Name of a chart point: a tracked body or one of the two chart angles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PointName {
    Body(CelestialBody),
    Ascendant,
    Midheaven,
}

impl PointName {
    pub fn as_str(self) -> &'static str {
        match self {
            PointName::Body(body) => body.name(),
            PointName::Ascendant => "ascendant",
            PointName::Midheaven => "midheaven",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PointName::Body(body) => body.display_name(),
            PointName::Ascendant => "Ascendant",
            PointName::Midheaven => "Midheaven",
        }
    }

    pub fn body(self) -> Option<CelestialBody> {
        match self {
            PointName::Body(body) => Some(body),
            _ => None,
        }
    }
}

impl From<CelestialBody> for PointName {
    fn from(body: CelestialBody) -> Self {
        PointName::Body(body)
    }
}

impl fmt::Display for PointName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointName {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascendant" => Ok(PointName::Ascendant),
            "midheaven" => Ok(PointName::Midheaven),
            other => other.parse::<CelestialBody>().map(PointName::Body),
        }
    }
}

impl TryFrom<String> for PointName {
    type Error = ChartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PointName> for String {
    fn from(name: PointName) -> Self {
        name.as_str().to_string()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZodiacSign {
    Aries = 0,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

impl ZodiacSign {
    pub const ALL: [ZodiacSign; 12] = [
        ZodiacSign::Aries,
        ZodiacSign::Taurus,
        ZodiacSign::Gemini,
        ZodiacSign::Cancer,
        ZodiacSign::Leo,
        ZodiacSign::Virgo,
        ZodiacSign::Libra,
        ZodiacSign::Scorpio,
        ZodiacSign::Sagittarius,
        ZodiacSign::Capricorn,
        ZodiacSign::Aquarius,
        ZodiacSign::Pisces,
    ];

    pub fn from_index(index: usize) -> ZodiacSign {
        Self::ALL[index % 12]
    }

    pub fn from_longitude(longitude: f64) -> Self {
        let normalized_longitude = normalize_longitude(longitude);
        Self::from_index((normalized_longitude / 30.0).floor() as usize)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ZodiacSign::Aries => "Aries",
            ZodiacSign::Taurus => "Taurus",
            ZodiacSign::Gemini => "Gemini",
            ZodiacSign::Cancer => "Cancer",
            ZodiacSign::Leo => "Leo",
            ZodiacSign::Virgo => "Virgo",
            ZodiacSign::Libra => "Libra",
            ZodiacSign::Scorpio => "Scorpio",
            ZodiacSign::Sagittarius => "Sagittarius",
            ZodiacSign::Capricorn => "Capricorn",
            ZodiacSign::Aquarius => "Aquarius",
            ZodiacSign::Pisces => "Pisces",
        }
    }
}

impl fmt::Display for ZodiacSign {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ZodiacSign {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ZodiacSign::ALL
            .iter()
            .copied()
            .find(|sign| sign.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ChartError::InvalidInput(format!("unknown zodiac sign `{s}`")))
    }
}

// ---------------------------
// ## Structures
// ---------------------------

/// One computed position in a chart.
///
/// `latitude` is the observer's (birth location) latitude, not the body's
/// ecliptic latitude; geocentric transit points carry `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub user_id: Option<UserId>,
    pub name: PointName,
    pub longitude: f64,
    pub latitude: f64,
    pub sign: ZodiacSign,
    pub degree: u8,
    pub minute: u8,
    pub second: u8,
    pub house: Option<u8>,
    pub point_type: PointType,
}

impl ChartPoint {
    pub fn new(
        user_id: Option<UserId>,
        name: PointName,
        longitude: f64,
        latitude: f64,
        house: Option<u8>,
        point_type: PointType,
    ) -> Self {
        let position = sign_position(longitude);
        ChartPoint {
            user_id,
            name,
            longitude: position.longitude,
            latitude,
            sign: position.sign,
            degree: position.degree,
            minute: position.minute,
            second: position.second,
            house,
            point_type,
        }
    }

    /// Longitude rebuilt from the sign/degree/minute/second decomposition.
    pub fn reconstructed_longitude(&self) -> f64 {
        self.sign.index() as f64 * 30.0
            + self.degree as f64
            + self.minute as f64 / 60.0
            + self.second as f64 / 3600.0
    }
}

/// Birth data owned by a user.
///
/// `location` is filled in once the city/country pair has been geocoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthRecord {
    pub user_id: UserId,
    pub birthdate: String,
    pub birthtime: String,
    pub city: String,
    pub country: String,
    pub location: Option<GeoLocation>,
}

impl BirthRecord {
    pub fn new(
        user_id: UserId,
        birthdate: impl Into<String>,
        birthtime: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        BirthRecord {
            user_id,
            birthdate: birthdate.into(),
            birthtime: birthtime.into(),
            city: city.into(),
            country: country.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Rejects records with blank fields before any lookup is attempted.
    pub fn validate(&self) -> ChartResult<()> {
        let fields = [
            ("birthdate", &self.birthdate),
            ("birthtime", &self.birthtime),
            ("city", &self.city),
            ("country", &self.country),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ChartError::InvalidInput(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_names_round_trip_through_strings() {
        for body in CelestialBody::iter() {
            let name = PointName::from(body);
            assert_eq!(name.as_str().parse::<PointName>().unwrap(), name);
        }
        assert_eq!("ascendant".parse::<PointName>().unwrap(), PointName::Ascendant);
        assert_eq!("midheaven".parse::<PointName>().unwrap(), PointName::Midheaven);
        assert!("vulcan".parse::<PointName>().is_err());
    }

    #[test]
    fn point_type_table() {
        assert_eq!(CelestialBody::NorthNode.point_type(), PointType::Point);
        assert_eq!(CelestialBody::Chiron.point_type(), PointType::Asteroid);
        assert_eq!(CelestialBody::Pluto.point_type(), PointType::Planet);
        assert_eq!(CelestialBody::Sun.point_type(), PointType::Planet);
    }

    #[test]
    fn zodiac_sign_from_longitude_wraps() {
        assert_eq!(ZodiacSign::from_longitude(0.0), ZodiacSign::Aries);
        assert_eq!(ZodiacSign::from_longitude(84.5), ZodiacSign::Gemini);
        assert_eq!(ZodiacSign::from_longitude(359.99), ZodiacSign::Pisces);
        assert_eq!(ZodiacSign::from_longitude(-1.0), ZodiacSign::Pisces);
        assert_eq!(ZodiacSign::from_longitude(720.0), ZodiacSign::Aries);
        assert_eq!("gemini".parse::<ZodiacSign>().unwrap(), ZodiacSign::Gemini);
    }

    #[test]
    fn point_name_serializes_as_plain_string() {
        let json = serde_json::to_string(&PointName::Body(CelestialBody::NorthNode)).unwrap();
        assert_eq!(json, "\"north_node\"");
        let back: PointName = serde_json::from_str("\"midheaven\"").unwrap();
        assert_eq!(back, PointName::Midheaven);
    }

    #[test]
    fn birth_record_validation_rejects_blank_fields() {
        let record = BirthRecord::new(1, "1990-06-15", " ", "New York", "USA");
        assert!(matches!(record.validate(), Err(ChartError::InvalidInput(_))));
        let record = BirthRecord::new(1, "1990-06-15", "12:00", "New York", "USA");
        assert!(record.validate().is_ok());
    }
}
