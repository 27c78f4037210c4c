//! Chart assembly: body longitudes and house cusps into chart points.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::ephemeris::{BodyPositions, EphemerisAdapter};
use crate::error::ChartResult;
use crate::geocoding::GeoLocation;
use crate::houses::{HouseCusps, HouseSystem};
use crate::{CelestialBody, ChartPoint, JulianDay, PointName, PointType, UserId};

/// Full set of points computed for one birth.
///
/// `skipped` lists bodies whose position could not be computed; they are
/// absent from `points`, so a chart may hold fewer than the full body count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NatalChart {
    pub user_id: Option<UserId>,
    pub points: Vec<ChartPoint>,
    pub skipped: Vec<CelestialBody>,
}

impl NatalChart {
    pub fn new(user_id: Option<UserId>, points: Vec<ChartPoint>) -> Self {
        NatalChart {
            user_id,
            points,
            skipped: Vec::new(),
        }
    }

    pub fn point(&self, name: impl Into<PointName>) -> Option<&ChartPoint> {
        let name = name.into();
        self.points.iter().find(|point| point.name == name)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn into_points(self) -> Vec<ChartPoint> {
        self.points
    }
}

impl fmt::Display for NatalChart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for point in &self.points {
            write!(
                f,
                "- {}: {} {}°{}'",
                point.name, point.sign, point.degree, point.minute
            )?;
            if let Some(house) = point.house {
                write!(f, " (House {house})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Builds chart points from computed positions and cusps.
///
/// Bodies come first in the order given, followed by the ascendant (always
/// house 1) and the midheaven (placed by house lookup). `latitude` is the
/// observer's latitude and is copied onto every point.
pub fn assemble_points(
    user_id: Option<UserId>,
    latitude: f64,
    positions: &BodyPositions,
    houses: &HouseCusps,
) -> Vec<ChartPoint> {
    let mut points: Vec<ChartPoint> = positions
        .positions
        .iter()
        .map(|&(body, longitude)| {
            ChartPoint::new(
                user_id,
                PointName::Body(body),
                longitude,
                latitude,
                Some(houses.house_of(longitude)),
                body.point_type(),
            )
        })
        .collect();

    points.push(ChartPoint::new(
        user_id,
        PointName::Ascendant,
        houses.ascendant,
        latitude,
        Some(1),
        PointType::Point,
    ));
    points.push(ChartPoint::new(
        user_id,
        PointName::Midheaven,
        houses.midheaven,
        latitude,
        Some(houses.house_of(houses.midheaven)),
        PointType::Point,
    ));
    points
}

#[derive(Clone)]
pub struct ChartAssembler {
    ephemeris: EphemerisAdapter,
    house_system: HouseSystem,
    bodies: Vec<CelestialBody>,
}

impl ChartAssembler {
    pub fn new(ephemeris: EphemerisAdapter, house_system: HouseSystem) -> Self {
        ChartAssembler {
            ephemeris,
            house_system,
            bodies: CelestialBody::ALL.to_vec(),
        }
    }

    pub fn with_bodies(mut self, bodies: impl IntoIterator<Item = CelestialBody>) -> Self {
        self.bodies = bodies.into_iter().collect();
        self
    }

    pub fn house_system(&self) -> HouseSystem {
        self.house_system
    }

    /// Computes a chart for a resolved location.
    ///
    /// Houses are computed first: a house failure aborts the chart. Body
    /// failures are logged by the adapter and recorded in `skipped`.
    pub async fn assemble(
        &self,
        user_id: Option<UserId>,
        jd: JulianDay,
        location: &GeoLocation,
    ) -> ChartResult<NatalChart> {
        let houses = self
            .ephemeris
            .house_cusps(jd, location.latitude, location.longitude, self.house_system)
            .await?;
        debug!(
            ?user_id,
            system = %self.house_system,
            ascendant = houses.ascendant,
            midheaven = houses.midheaven,
            "house cusps computed"
        );

        let positions = self.ephemeris.positions(jd, &self.bodies).await;
        let points = assemble_points(user_id, location.latitude, &positions, &houses);
        let skipped = positions.failed_bodies();

        if !skipped.is_empty() {
            info!(?user_id, ?skipped, "chart assembled without some bodies");
        }
        Ok(NatalChart {
            user_id,
            points,
            skipped,
        })
    }
}
