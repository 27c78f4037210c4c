//! City/country resolution to coordinates and UTC offset.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GeocodingError;

/// Resolved birth location. East longitude and north latitude are positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// UTC offset reported by the geocoder, when it has one.
    pub timezone_offset_hours: Option<f64>,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64, timezone_offset_hours: Option<f64>) -> Self {
        GeoLocation {
            latitude,
            longitude,
            timezone_offset_hours,
        }
    }

    pub fn validate(&self) -> Result<(), GeocodingError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(GeocodingError::InvalidResponse(format!(
                "latitude {} is out of range",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GeocodingError::InvalidResponse(format!(
                "longitude {} is out of range",
                self.longitude
            )));
        }
        Ok(())
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, city: &str, country: &str) -> Result<GeoLocation, GeocodingError>;
}

#[cfg(feature = "opencage")]
pub use opencage::OpenCageGeocoder;

#[cfg(feature = "opencage")]
mod opencage {
    use super::*;
    use reqwest::Client;
    use std::time::Duration;
    use tracing::debug;

    const OPENCAGE_URL: &str = "https://api.opencagedata.com/geocode/v1/json";

    #[derive(Debug, Deserialize)]
    struct OpenCageResponse {
        results: Vec<OpenCageResult>,
    }

    #[derive(Debug, Deserialize)]
    struct OpenCageResult {
        geometry: Geometry,
        annotations: Option<Annotations>,
    }

    #[derive(Debug, Deserialize)]
    struct Geometry {
        lat: f64,
        lng: f64,
    }

    #[derive(Debug, Deserialize)]
    struct Annotations {
        timezone: Option<TimezoneAnnotation>,
    }

    #[derive(Debug, Deserialize)]
    struct TimezoneAnnotation {
        offset_sec: Option<i64>,
    }

    /// Forward geocoding through the OpenCage API.
    pub struct OpenCageGeocoder {
        client: Client,
        api_key: String,
        base_url: String,
    }

    impl OpenCageGeocoder {
        pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, GeocodingError> {
            let api_key = api_key
                .filter(|key| !key.trim().is_empty())
                .ok_or(GeocodingError::MissingApiKey)?;
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| GeocodingError::Http(e.to_string()))?;
            Ok(OpenCageGeocoder {
                client,
                api_key,
                base_url: OPENCAGE_URL.to_string(),
            })
        }

        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into();
            self
        }
    }

    fn location_from_response(
        response: OpenCageResponse,
        query: &str,
    ) -> Result<GeoLocation, GeocodingError> {
        let first = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| GeocodingError::NoResults {
                query: query.to_string(),
            })?;
        let offset = first
            .annotations
            .and_then(|annotations| annotations.timezone)
            .and_then(|timezone| timezone.offset_sec)
            .map(|seconds| seconds as f64 / 3600.0);
        let location = GeoLocation::new(first.geometry.lat, first.geometry.lng, offset);
        location.validate()?;
        Ok(location)
    }

    #[async_trait]
    impl Geocoder for OpenCageGeocoder {
        async fn geocode(&self, city: &str, country: &str) -> Result<GeoLocation, GeocodingError> {
            let query = format!("{city}, {country}");
            debug!(%query, "geocoding birth place");

            let response = self
                .client
                .get(&self.base_url)
                .query(&[("q", query.as_str()), ("key", self.api_key.as_str())])
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        GeocodingError::Timeout
                    } else {
                        GeocodingError::Http(e.to_string())
                    }
                })?;

            if !response.status().is_success() {
                return Err(GeocodingError::Http(format!(
                    "HTTP request failed with status: {}",
                    response.status()
                )));
            }

            let body: OpenCageResponse = response
                .json()
                .await
                .map_err(|e| GeocodingError::InvalidResponse(e.to_string()))?;
            location_from_response(body, &query)
        }
    }

}
