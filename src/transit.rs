//! Live sky: current positions, aspects between them and the lunar phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::ephemeris::EphemerisAdapter;
use crate::time::date_to_julian_day;
use crate::zodiac::normalize_longitude;
use crate::{CelestialBody, ChartPoint, JulianDay, PointName, ZodiacSign};

// ---------------------------
// ## Aspects
// ---------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectKind {
    Conjunction,
    Sextile,
    Square,
    Trine,
    Opposition,
}

impl AspectKind {
    /// Classification table, checked in order.
    pub const TABLE: [AspectKind; 5] = [
        AspectKind::Conjunction,
        AspectKind::Sextile,
        AspectKind::Square,
        AspectKind::Trine,
        AspectKind::Opposition,
    ];

    pub fn angle(self) -> f64 {
        match self {
            AspectKind::Conjunction => 0.0,
            AspectKind::Sextile => 60.0,
            AspectKind::Square => 90.0,
            AspectKind::Trine => 120.0,
            AspectKind::Opposition => 180.0,
        }
    }

    /// Maximum allowed deviation from the exact angle, inclusive.
    pub fn orb(self) -> f64 {
        match self {
            AspectKind::Sextile => 6.0,
            _ => 8.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AspectKind::Conjunction => "Conjunction",
            AspectKind::Sextile => "Sextile",
            AspectKind::Square => "Square",
            AspectKind::Trine => "Trine",
            AspectKind::Opposition => "Opposition",
        }
    }
}

impl fmt::Display for AspectKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aspect between an unordered pair of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aspect {
    pub first: PointName,
    pub second: PointName,
    /// Angular separation folded into [0, 180].
    pub separation: f64,
    pub kind: AspectKind,
    /// Deviation from the exact aspect angle.
    pub orb: f64,
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.first.display_name(),
            self.kind,
            self.second.display_name()
        )
    }
}

/// Separation between two longitudes, folded so that values above 180
/// become `360 - angle`.
pub fn angular_separation(first: f64, second: f64) -> f64 {
    let angle = (normalize_longitude(first) - normalize_longitude(second)).abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

/// First aspect in [`AspectKind::TABLE`] whose orb contains `separation`.
pub fn classify_aspect(separation: f64) -> Option<AspectKind> {
    AspectKind::TABLE
        .iter()
        .copied()
        .find(|kind| (separation - kind.angle()).abs() <= kind.orb())
}

/// Aspects for every unordered pair of `points`; pairs outside every orb are
/// left out.
pub fn find_aspects(points: &[ChartPoint]) -> Vec<Aspect> {
    let mut aspects = Vec::new();
    for (index, first) in points.iter().enumerate() {
        for second in &points[index + 1..] {
            let separation = angular_separation(first.longitude, second.longitude);
            if let Some(kind) = classify_aspect(separation) {
                aspects.push(Aspect {
                    first: first.name,
                    second: second.name,
                    separation,
                    kind,
                    orb: (separation - kind.angle()).abs(),
                });
            }
        }
    }
    aspects
}

// ---------------------------
// ## Lunar phase
// ---------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoonPhase {
    NewMoon,
    WaxingCrescent,
    FirstQuarter,
    WaxingGibbous,
    FullMoon,
    WaningGibbous,
    LastQuarter,
    WaningCrescent,
}

impl MoonPhase {
    const ALL: [MoonPhase; 8] = [
        MoonPhase::NewMoon,
        MoonPhase::WaxingCrescent,
        MoonPhase::FirstQuarter,
        MoonPhase::WaxingGibbous,
        MoonPhase::FullMoon,
        MoonPhase::WaningGibbous,
        MoonPhase::LastQuarter,
        MoonPhase::WaningCrescent,
    ];

    /// Phase for a Moon-minus-Sun elongation, in 45° buckets starting at
    /// New Moon for [0, 45).
    pub fn from_elongation(elongation: f64) -> Self {
        let index = (normalize_longitude(elongation) / 45.0).floor() as usize;
        Self::ALL[index.min(7)]
    }

    pub fn name(self) -> &'static str {
        match self {
            MoonPhase::NewMoon => "New Moon",
            MoonPhase::WaxingCrescent => "Waxing Crescent",
            MoonPhase::FirstQuarter => "First Quarter",
            MoonPhase::WaxingGibbous => "Waxing Gibbous",
            MoonPhase::FullMoon => "Full Moon",
            MoonPhase::WaningGibbous => "Waning Gibbous",
            MoonPhase::LastQuarter => "Last Quarter",
            MoonPhase::WaningCrescent => "Waning Crescent",
        }
    }
}

impl fmt::Display for MoonPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn moon_phase(moon_longitude: f64, sun_longitude: f64) -> MoonPhase {
    MoonPhase::from_elongation(moon_longitude - sun_longitude + 360.0)
}

// ---------------------------
// ## Snapshots
// ---------------------------

/// Positions of the tracked bodies at one instant. Points carry no user,
/// no house and a latitude of 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitSnapshot {
    pub timestamp: DateTime<Utc>,
    pub julian_day: JulianDay,
    pub points: Vec<ChartPoint>,
    pub skipped: Vec<CelestialBody>,
}

impl TransitSnapshot {
    pub fn point(&self, body: CelestialBody) -> Option<&ChartPoint> {
        self.points
            .iter()
            .find(|point| point.name == PointName::Body(body))
    }

    pub fn aspects(&self) -> Vec<Aspect> {
        find_aspects(&self.points)
    }

    /// `None` when either the Sun or the Moon could not be computed.
    pub fn moon_phase(&self) -> Option<MoonPhase> {
        let moon = self.point(CelestialBody::Moon)?;
        let sun = self.point(CelestialBody::Sun)?;
        Some(moon_phase(moon.longitude, sun.longitude))
    }
}

/// Plain-text sky context: positions, major aspects and lunar information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyReport {
    pub snapshot: TransitSnapshot,
    pub aspects: Vec<Aspect>,
    pub moon_phase: Option<MoonPhase>,
}

impl SkyReport {
    pub fn from_snapshot(snapshot: TransitSnapshot) -> Self {
        let aspects = snapshot.aspects();
        let moon_phase = snapshot.moon_phase();
        SkyReport {
            snapshot,
            aspects,
            moon_phase,
        }
    }

    pub fn moon_sign(&self) -> Option<ZodiacSign> {
        self.snapshot
            .point(CelestialBody::Moon)
            .map(|moon| moon.sign)
    }
}

impl fmt::Display for SkyReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "CURRENT PLANETARY POSITIONS:")?;
        for point in &self.snapshot.points {
            writeln!(
                f,
                "- {}: {} {}°{}'",
                point.name.display_name(),
                point.sign,
                point.degree,
                point.minute
            )?;
        }

        writeln!(f)?;
        writeln!(f, "MAJOR CURRENT ASPECTS:")?;
        for aspect in &self.aspects {
            writeln!(f, "- {aspect}")?;
        }

        writeln!(f)?;
        writeln!(f, "LUNAR INFORMATION:")?;
        match self.moon_phase {
            Some(phase) => writeln!(f, "- Moon Phase: {phase}")?,
            None => writeln!(f, "- Moon Phase: unavailable")?,
        }
        match self.snapshot.point(CelestialBody::Moon) {
            Some(moon) => writeln!(f, "- Moon Sign: {} {}°{}'", moon.sign, moon.degree, moon.minute)?,
            None => writeln!(f, "- Moon Sign: unavailable")?,
        }

        writeln!(f)?;
        write!(f, "DATE: {}", self.snapshot.timestamp.format("%a %b %d %Y"))
    }
}

#[derive(Clone)]
pub struct TransitAnalyzer {
    ephemeris: EphemerisAdapter,
    bodies: Vec<CelestialBody>,
}

impl TransitAnalyzer {
    pub fn new(ephemeris: EphemerisAdapter) -> Self {
        TransitAnalyzer {
            ephemeris,
            bodies: CelestialBody::ALL.to_vec(),
        }
    }

    pub fn with_bodies(mut self, bodies: impl IntoIterator<Item = CelestialBody>) -> Self {
        self.bodies = bodies.into_iter().collect();
        self
    }

    /// Positions of every tracked body at `now`. Bodies the ephemeris fails
    /// on are listed in `skipped`.
    pub async fn current_positions(&self, now: DateTime<Utc>) -> TransitSnapshot {
        let julian_day = date_to_julian_day(now);
        let positions = self.ephemeris.positions(julian_day, &self.bodies).await;
        let points = positions
            .positions
            .iter()
            .map(|&(body, longitude)| {
                ChartPoint::new(
                    None,
                    PointName::Body(body),
                    longitude,
                    0.0,
                    None,
                    body.point_type(),
                )
            })
            .collect();
        debug!(julian_day, "transit snapshot computed");
        TransitSnapshot {
            timestamp: now,
            julian_day,
            points,
            skipped: positions.failed_bodies(),
        }
    }

    pub async fn aspects(&self, now: DateTime<Utc>) -> Vec<Aspect> {
        self.current_positions(now).await.aspects()
    }

    pub async fn sky_report(&self, now: DateTime<Utc>) -> SkyReport {
        SkyReport::from_snapshot(self.current_positions(now).await)
    }
}
