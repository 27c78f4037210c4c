//! Remote backend backed by the JPL Horizons API.
//!
//! Horizons reports observer-centred ecliptic-of-date longitudes (quantity
//! 31), which is exactly what a tropical chart needs. The lunar node and the
//! house frame are not Horizons targets, so those come from the analytic
//! model.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use urlencoding::encode;

use crate::analytic::AnalyticEphemeris;
use crate::ephemeris::EphemerisProvider;
use crate::error::EphemerisError;
use crate::houses::{HouseCusps, HouseSystem};
use crate::{CelestialBody, JulianDay};

const HORIZONS_URL: &str = "https://ssd.jpl.nasa.gov/api/horizons.api";

#[derive(Debug, Deserialize)]
struct HorizonsResponse {
    result: Option<String>,
    error: Option<String>,
}

pub struct HorizonsEphemeris {
    client: Client,
    base_url: String,
    fallback: AnalyticEphemeris,
}

impl HorizonsEphemeris {
    pub fn new(timeout: Duration) -> Result<Self, EphemerisError> {
        Self::with_base_url(HORIZONS_URL, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EphemerisError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EphemerisError::Unavailable(format!("HTTP client: {e}")))?;
        Ok(HorizonsEphemeris {
            client,
            base_url: base_url.into(),
            fallback: AnalyticEphemeris::new(),
        })
    }

    fn request_url(&self, jd: JulianDay, target: &str) -> String {
        format!(
            "{}?format=json&COMMAND={}&OBJ_DATA=NO&MAKE_EPHEM=YES&EPHEM_TYPE=OBSERVER&CENTER={}&TLIST={}&TIME_TYPE=UT&QUANTITIES={}",
            self.base_url,
            encode(&format!("'{target}'")),
            encode("'500@399'"),
            encode(&format!("'{jd:.6}'")),
            encode("'31'"),
        )
    }

    async fn fetch_longitude(
        &self,
        jd: JulianDay,
        body: CelestialBody,
        target: &str,
    ) -> Result<f64, EphemerisError> {
        let url = self.request_url(jd, target);
        debug!(%body, jd, "querying horizons");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| EphemerisError::body(body, err.to_string()))?;

        if !response.status().is_success() {
            return Err(EphemerisError::body(
                body,
                format!("HTTP request failed with status: {}", response.status()),
            ));
        }

        let payload: HorizonsResponse = response
            .json()
            .await
            .map_err(|err| EphemerisError::body(body, err.to_string()))?;

        if let Some(error) = payload.error {
            return Err(EphemerisError::body(body, error));
        }
        let result = payload
            .result
            .ok_or_else(|| EphemerisError::body(body, "response has no result"))?;
        parse_ecliptic_longitude(&result).map_err(|message| EphemerisError::body(body, message))
    }
}

/// Horizons target designation, or `None` for points Horizons does not
/// compute.
fn horizons_target(body: CelestialBody) -> Option<&'static str> {
    match body {
        CelestialBody::Sun => Some("10"),
        CelestialBody::Moon => Some("301"),
        CelestialBody::Mercury => Some("199"),
        CelestialBody::Venus => Some("299"),
        CelestialBody::Mars => Some("499"),
        CelestialBody::Jupiter => Some("599"),
        CelestialBody::Saturn => Some("699"),
        CelestialBody::Uranus => Some("799"),
        CelestialBody::Neptune => Some("899"),
        CelestialBody::Pluto => Some("999"),
        CelestialBody::Chiron => Some("2060;"),
        CelestialBody::NorthNode => None,
    }
}

/// Reads the ecliptic longitude from the first row between the `$$SOE` and
/// `$$EOE` markers. With quantity 31 the row ends in longitude and latitude.
fn parse_ecliptic_longitude(result: &str) -> Result<f64, String> {
    let lines: Vec<&str> = result.lines().collect();
    let soe = lines.iter().position(|line| line.contains("$$SOE"));
    let eoe = lines.iter().position(|line| line.contains("$$EOE"));

    let (Some(soe), Some(eoe)) = (soe, eoe) else {
        return Err("Ephemeris data markers not found".to_string());
    };

    for line in lines.iter().take(eoe).skip(soe + 1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }
        let longitude = parts[parts.len() - 2];
        if let Ok(value) = longitude.parse::<f64>() {
            return Ok(value);
        }
    }
    Err("Failed to parse ephemeris data".to_string())
}

#[async_trait]
impl EphemerisProvider for HorizonsEphemeris {
    fn name(&self) -> &'static str {
        "horizons"
    }

    async fn position(&self, jd: JulianDay, body: CelestialBody) -> Result<f64, EphemerisError> {
        match horizons_target(body) {
            Some(target) => self.fetch_longitude(jd, body, target).await,
            None => self.fallback.longitude(jd, body),
        }
    }

    async fn houses(
        &self,
        jd: JulianDay,
        latitude: f64,
        longitude: f64,
        system: HouseSystem,
    ) -> Result<HouseCusps, EphemerisError> {
        self.fallback.house_cusps(jd, latitude, longitude, system)
    }
}
