//! Ephemeris capability and the adapter every caller goes through.
//!
//! Backends implement [`EphemerisProvider`]; [`EphemerisAdapter`] adds the
//! per-call timeout, rejects malformed results and normalizes longitudes.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::EphemerisError;
use crate::houses::{HouseCusps, HouseSystem};
use crate::zodiac::normalize_longitude;
use crate::{CelestialBody, JulianDay};

/// An ephemeris engine: the native Swiss Ephemeris, a remote service or the
/// built-in analytic model.
#[async_trait]
pub trait EphemerisProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Geocentric tropical ecliptic longitude of `body`, in degrees.
    async fn position(&self, jd: JulianDay, body: CelestialBody) -> Result<f64, EphemerisError>;

    /// House cusps plus ascendant and midheaven for a geographic location
    /// (latitude north positive, longitude east positive).
    async fn houses(
        &self,
        jd: JulianDay,
        latitude: f64,
        longitude: f64,
        system: HouseSystem,
    ) -> Result<HouseCusps, EphemerisError>;
}

/// Longitudes computed for a set of bodies, with the bodies that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyPositions {
    pub positions: Vec<(CelestialBody, f64)>,
    pub failures: Vec<(CelestialBody, EphemerisError)>,
}

impl BodyPositions {
    pub fn longitude(&self, body: CelestialBody) -> Option<f64> {
        self.positions
            .iter()
            .find(|(candidate, _)| *candidate == body)
            .map(|(_, longitude)| *longitude)
    }

    pub fn failed_bodies(&self) -> Vec<CelestialBody> {
        self.failures.iter().map(|(body, _)| *body).collect()
    }
}

#[derive(Clone)]
pub struct EphemerisAdapter {
    provider: Arc<dyn EphemerisProvider>,
    timeout: Duration,
}

impl EphemerisAdapter {
    pub fn new(provider: Arc<dyn EphemerisProvider>, timeout: Duration) -> Self {
        EphemerisAdapter { provider, timeout }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Normalized longitude of one body.
    pub async fn position(&self, jd: JulianDay, body: CelestialBody) -> Result<f64, EphemerisError> {
        let longitude = tokio::time::timeout(self.timeout, self.provider.position(jd, body))
            .await
            .map_err(|_| EphemerisError::Timeout {
                operation: format!("position of {body}"),
            })??;

        if !longitude.is_finite() {
            return Err(EphemerisError::body(
                body,
                format!("non-finite longitude {longitude}"),
            ));
        }
        Ok(normalize_longitude(longitude))
    }

    /// Computes every body concurrently. Individual failures are logged and
    /// reported in [`BodyPositions::failures`]; they never abort the batch.
    pub async fn positions(&self, jd: JulianDay, bodies: &[CelestialBody]) -> BodyPositions {
        let results = join_all(bodies.iter().map(|&body| async move {
            (body, self.position(jd, body).await)
        }))
        .await;

        let mut batch = BodyPositions::default();
        for (body, result) in results {
            match result {
                Ok(longitude) => batch.positions.push((body, longitude)),
                Err(err) => {
                    warn!(
                        backend = self.provider.name(),
                        %body,
                        error = %err,
                        "skipping body after ephemeris failure"
                    );
                    let err = match err {
                        EphemerisError::Body { .. } => err,
                        other => EphemerisError::body(body, other.to_string()),
                    };
                    batch.failures.push((body, err));
                }
            }
        }
        debug!(
            jd,
            computed = batch.positions.len(),
            failed = batch.failures.len(),
            "body positions computed"
        );
        batch
    }

    /// House cusps with all longitudes normalized. Any failure here is fatal
    /// for the chart being assembled.
    pub async fn house_cusps(
        &self,
        jd: JulianDay,
        latitude: f64,
        longitude: f64,
        system: HouseSystem,
    ) -> Result<HouseCusps, EphemerisError> {
        let cusps = tokio::time::timeout(
            self.timeout,
            self.provider.houses(jd, latitude, longitude, system),
        )
        .await
        .map_err(|_| EphemerisError::Timeout {
            operation: "houses".to_string(),
        })?
        .map_err(|err| match err {
            EphemerisError::Houses { .. } => err,
            other => EphemerisError::houses(other.to_string()),
        })?;

        if !cusps.is_finite() {
            return Err(EphemerisError::houses("engine returned non-finite cusps"));
        }
        Ok(cusps.normalized())
    }
}
