//! Built-in analytic ephemeris.
//!
//! Planets use the JPL approximate Keplerian elements (valid 1800-2050), the
//! Moon a truncated lunar theory and the node the standard mean-node series
//! with its main periodic terms. Accuracy is a few arcminutes for planets and
//! about a tenth of a degree for the Moon, which is plenty for sign and house
//! placement. Chiron is not modelled.

use async_trait::async_trait;
use std::f64::consts::PI;

use crate::ephemeris::EphemerisProvider;
use crate::error::EphemerisError;
use crate::houses::{HouseCusps, HouseSystem};
use crate::zodiac::normalize_longitude;
use crate::{CelestialBody, JulianDay};

const J2000: f64 = 2_451_545.0;
const DAYS_PER_CENTURY: f64 = 36_525.0;
/// General precession in longitude, degrees per Julian century.
const PRECESSION_RATE: f64 = 1.396_971;

/// Keplerian elements at J2000 and their rates per Julian century:
/// semi-major axis (au), eccentricity, inclination, mean longitude,
/// longitude of perihelion and longitude of ascending node (degrees).
#[derive(Debug, Clone, Copy)]
struct OrbitalElements {
    a: (f64, f64),
    e: (f64, f64),
    i: (f64, f64),
    l: (f64, f64),
    perihelion: (f64, f64),
    node: (f64, f64),
}

const MERCURY: OrbitalElements = OrbitalElements {
    a: (0.387_099_27, 0.000_000_37),
    e: (0.205_635_93, 0.000_019_06),
    i: (7.004_979_02, -0.005_947_49),
    l: (252.250_323_50, 149_472.674_111_75),
    perihelion: (77.457_796_28, 0.160_476_89),
    node: (48.330_765_93, -0.125_340_81),
};

const VENUS: OrbitalElements = OrbitalElements {
    a: (0.723_335_66, 0.000_003_90),
    e: (0.006_776_72, -0.000_041_07),
    i: (3.394_676_05, -0.000_788_90),
    l: (181.979_099_50, 58_517.815_387_29),
    perihelion: (131.602_467_18, 0.002_683_29),
    node: (76.679_842_55, -0.277_694_18),
};

const EARTH_MOON_BARYCENTER: OrbitalElements = OrbitalElements {
    a: (1.000_002_61, 0.000_005_62),
    e: (0.016_711_23, -0.000_043_92),
    i: (-0.000_015_31, -0.012_946_68),
    l: (100.464_571_66, 35_999.372_449_81),
    perihelion: (102.937_681_93, 0.323_273_64),
    node: (0.0, 0.0),
};

const MARS: OrbitalElements = OrbitalElements {
    a: (1.523_710_34, 0.000_018_47),
    e: (0.093_394_10, 0.000_078_82),
    i: (1.849_691_42, -0.008_131_31),
    l: (-4.553_432_05, 19_140.302_684_99),
    perihelion: (-23.943_629_59, 0.444_410_88),
    node: (49.559_538_91, -0.292_573_43),
};

const JUPITER: OrbitalElements = OrbitalElements {
    a: (5.202_887_00, -0.000_116_07),
    e: (0.048_386_24, -0.000_132_53),
    i: (1.304_396_95, -0.001_837_14),
    l: (34.396_440_51, 3_034.746_127_75),
    perihelion: (14.728_479_83, 0.212_526_68),
    node: (100.473_909_09, 0.204_691_06),
};

const SATURN: OrbitalElements = OrbitalElements {
    a: (9.536_675_94, -0.001_250_60),
    e: (0.053_861_79, -0.000_509_91),
    i: (2.485_991_87, 0.001_936_09),
    l: (49.954_244_23, 1_222.493_622_01),
    perihelion: (92.598_878_31, -0.418_972_16),
    node: (113.662_424_48, -0.288_677_94),
};

const URANUS: OrbitalElements = OrbitalElements {
    a: (19.189_164_64, -0.001_961_76),
    e: (0.047_257_44, -0.000_043_97),
    i: (0.772_637_83, -0.002_429_39),
    l: (313.238_104_51, 428.482_027_85),
    perihelion: (170.954_276_30, 0.408_052_81),
    node: (74.016_925_03, 0.042_405_89),
};

const NEPTUNE: OrbitalElements = OrbitalElements {
    a: (30.069_922_76, 0.000_262_91),
    e: (0.008_590_48, 0.000_051_05),
    i: (1.770_043_47, 0.000_353_72),
    l: (-55.120_029_69, 218.459_453_25),
    perihelion: (44.964_762_27, -0.322_414_64),
    node: (131.784_225_74, -0.005_086_64),
};

const PLUTO: OrbitalElements = OrbitalElements {
    a: (39.482_116_75, -0.000_315_96),
    e: (0.248_827_30, 0.000_051_70),
    i: (17.140_012_06, 0.000_048_18),
    l: (238.929_038_33, 145.207_805_15),
    perihelion: (224.068_916_29, -0.040_629_42),
    node: (110.303_936_84, -0.011_834_82),
};

/// Periodic terms of the Moon's longitude: coefficient (degrees) and the
/// multipliers of D, M, M' and F.
const MOON_TERMS: [(f64, [f64; 4]); 13] = [
    (6.288_774, [0.0, 0.0, 1.0, 0.0]),
    (1.274_027, [2.0, 0.0, -1.0, 0.0]),
    (0.658_314, [2.0, 0.0, 0.0, 0.0]),
    (0.213_618, [0.0, 0.0, 2.0, 0.0]),
    (-0.185_116, [0.0, 1.0, 0.0, 0.0]),
    (-0.114_332, [0.0, 0.0, 0.0, 2.0]),
    (0.058_793, [2.0, 0.0, -2.0, 0.0]),
    (0.057_066, [2.0, -1.0, -1.0, 0.0]),
    (0.053_322, [2.0, 0.0, 1.0, 0.0]),
    (0.045_758, [2.0, -1.0, 0.0, 0.0]),
    (-0.040_923, [0.0, 1.0, -1.0, 0.0]),
    (-0.034_720, [1.0, 0.0, 0.0, 0.0]),
    (-0.030_383, [0.0, 1.0, 1.0, 0.0]),
];

/// Pure-Rust ephemeris needing no data files or network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticEphemeris;

impl AnalyticEphemeris {
    pub fn new() -> Self {
        AnalyticEphemeris
    }

    pub fn longitude(&self, jd: JulianDay, body: CelestialBody) -> Result<f64, EphemerisError> {
        let t = centuries_since_j2000(jd);
        let longitude = match body {
            CelestialBody::Sun => {
                let earth = heliocentric(&EARTH_MOON_BARYCENTER, t);
                ecliptic_longitude([-earth[0], -earth[1], -earth[2]]) + PRECESSION_RATE * t
            }
            CelestialBody::Moon => moon_longitude(t),
            CelestialBody::NorthNode => true_node_longitude(t),
            CelestialBody::Chiron => {
                return Err(EphemerisError::body(
                    body,
                    "not available in the analytic ephemeris",
                ))
            }
            planet => {
                let elements = planet_elements(planet).ok_or_else(|| {
                    EphemerisError::body(planet, "no orbital elements for body")
                })?;
                geocentric_longitude(&elements, t) + PRECESSION_RATE * t
            }
        };
        Ok(normalize_longitude(longitude))
    }

    pub fn house_cusps(
        &self,
        jd: JulianDay,
        latitude: f64,
        longitude: f64,
        system: HouseSystem,
    ) -> Result<HouseCusps, EphemerisError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(EphemerisError::houses(format!(
                "location ({latitude}, {longitude}) is out of range"
            )));
        }
        let t = centuries_since_j2000(jd);
        let ramc = normalize_longitude(sidereal_time(jd) + longitude);
        let obliquity = mean_obliquity(t);
        compute_houses(ramc, obliquity, latitude, system)
    }
}

#[async_trait]
impl EphemerisProvider for AnalyticEphemeris {
    fn name(&self) -> &'static str {
        "analytic"
    }

    async fn position(&self, jd: JulianDay, body: CelestialBody) -> Result<f64, EphemerisError> {
        self.longitude(jd, body)
    }

    async fn houses(
        &self,
        jd: JulianDay,
        latitude: f64,
        longitude: f64,
        system: HouseSystem,
    ) -> Result<HouseCusps, EphemerisError> {
        self.house_cusps(jd, latitude, longitude, system)
    }
}

fn centuries_since_j2000(jd: JulianDay) -> f64 {
    (jd - J2000) / DAYS_PER_CENTURY
}

fn planet_elements(body: CelestialBody) -> Option<OrbitalElements> {
    match body {
        CelestialBody::Mercury => Some(MERCURY),
        CelestialBody::Venus => Some(VENUS),
        CelestialBody::Mars => Some(MARS),
        CelestialBody::Jupiter => Some(JUPITER),
        CelestialBody::Saturn => Some(SATURN),
        CelestialBody::Uranus => Some(URANUS),
        CelestialBody::Neptune => Some(NEPTUNE),
        CelestialBody::Pluto => Some(PLUTO),
        _ => None,
    }
}

fn sin_deg(degrees: f64) -> f64 {
    degrees.to_radians().sin()
}

fn cos_deg(degrees: f64) -> f64 {
    degrees.to_radians().cos()
}

fn ecliptic_longitude(vector: [f64; 3]) -> f64 {
    vector[1].atan2(vector[0]).to_degrees()
}

/// Solves Kepler's equation for the eccentric anomaly (radians).
fn eccentric_anomaly(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let m = (mean_anomaly + PI).rem_euclid(2.0 * PI) - PI;
    let mut e = m + eccentricity * m.sin();
    for _ in 0..30 {
        let delta = (m - (e - eccentricity * e.sin())) / (1.0 - eccentricity * e.cos());
        e += delta;
        if delta.abs() < 1e-12 {
            break;
        }
    }
    e
}

/// Heliocentric ecliptic (J2000) rectangular coordinates in au.
fn heliocentric(elements: &OrbitalElements, t: f64) -> [f64; 3] {
    let at = |(value, rate): (f64, f64)| value + rate * t;
    let a = at(elements.a);
    let e = at(elements.e);
    let i = at(elements.i);
    let l = at(elements.l);
    let perihelion = at(elements.perihelion);
    let node = at(elements.node);

    let argument_of_perihelion = perihelion - node;
    let mean_anomaly = (l - perihelion).to_radians();
    let anomaly = eccentric_anomaly(mean_anomaly, e);

    let x_orbit = a * (anomaly.cos() - e);
    let y_orbit = a * (1.0 - e * e).sqrt() * anomaly.sin();

    let (sin_w, cos_w) = argument_of_perihelion.to_radians().sin_cos();
    let (sin_o, cos_o) = node.to_radians().sin_cos();
    let (sin_i, cos_i) = i.to_radians().sin_cos();

    [
        (cos_w * cos_o - sin_w * sin_o * cos_i) * x_orbit
            + (-sin_w * cos_o - cos_w * sin_o * cos_i) * y_orbit,
        (cos_w * sin_o + sin_w * cos_o * cos_i) * x_orbit
            + (-sin_w * sin_o + cos_w * cos_o * cos_i) * y_orbit,
        (sin_w * sin_i) * x_orbit + (cos_w * sin_i) * y_orbit,
    ]
}

fn geocentric_longitude(elements: &OrbitalElements, t: f64) -> f64 {
    let planet = heliocentric(elements, t);
    let earth = heliocentric(&EARTH_MOON_BARYCENTER, t);
    ecliptic_longitude([
        planet[0] - earth[0],
        planet[1] - earth[1],
        planet[2] - earth[2],
    ])
}

/// Fundamental lunar arguments D, M, M', F and the Moon's mean longitude.
fn lunar_arguments(t: f64) -> ([f64; 4], f64) {
    let t2 = t * t;
    let mean_longitude = 218.316_447_7 + 481_267.881_234_21 * t - 0.001_578_6 * t2;
    let elongation = 297.850_192_1 + 445_267.111_403_4 * t - 0.001_881_9 * t2;
    let sun_anomaly = 357.529_109_2 + 35_999.050_290_9 * t - 0.000_153_6 * t2;
    let moon_anomaly = 134.963_396_4 + 477_198.867_505_5 * t + 0.008_741_4 * t2;
    let latitude_argument = 93.272_095_0 + 483_202.017_523_3 * t - 0.003_653_9 * t2;
    (
        [elongation, sun_anomaly, moon_anomaly, latitude_argument],
        mean_longitude,
    )
}

fn moon_longitude(t: f64) -> f64 {
    let (arguments, mean_longitude) = lunar_arguments(t);
    let perturbation: f64 = MOON_TERMS
        .iter()
        .map(|(coefficient, multipliers)| {
            let angle: f64 = multipliers
                .iter()
                .zip(arguments.iter())
                .map(|(multiplier, argument)| multiplier * argument)
                .sum();
            coefficient * sin_deg(angle)
        })
        .sum();
    mean_longitude + perturbation
}

fn mean_node_longitude(t: f64) -> f64 {
    125.044_547_9 - 1_934.136_289_1 * t + 0.002_075_4 * t * t
}

fn true_node_longitude(t: f64) -> f64 {
    let ([d, m, m_prime, f], _) = lunar_arguments(t);
    mean_node_longitude(t) - 1.4979 * sin_deg(2.0 * (d - f)) - 0.1500 * sin_deg(m)
        - 0.1226 * sin_deg(2.0 * d)
        + 0.1176 * sin_deg(2.0 * f)
        - 0.0801 * sin_deg(2.0 * (m_prime - f))
}

/// Greenwich mean sidereal time in degrees.
fn sidereal_time(jd: JulianDay) -> f64 {
    let t = centuries_since_j2000(jd);
    normalize_longitude(
        280.460_618_37 + 360.985_647_366_29 * (jd - J2000) + 0.000_387_933 * t * t
            - t * t * t / 38_710_000.0,
    )
}

fn mean_obliquity(t: f64) -> f64 {
    23.439_291 - 0.013_004_2 * t
}

/// Midheaven and ascendant for a local sidereal time (RAMC).
fn angles(ramc: f64, obliquity: f64, latitude: f64) -> (f64, f64) {
    let midheaven = sin_deg(ramc)
        .atan2(cos_deg(ramc) * cos_deg(obliquity))
        .to_degrees();
    let ascendant = cos_deg(ramc)
        .atan2(
            -(sin_deg(ramc) * cos_deg(obliquity)
                + latitude.to_radians().tan() * sin_deg(obliquity)),
        )
        .to_degrees();
    (normalize_longitude(midheaven), normalize_longitude(ascendant))
}

/// Ecliptic longitude of the point with the given right ascension.
fn ecliptic_from_right_ascension(right_ascension: f64, obliquity: f64) -> f64 {
    normalize_longitude(
        sin_deg(right_ascension)
            .atan2(cos_deg(right_ascension) * cos_deg(obliquity))
            .to_degrees(),
    )
}

fn compute_houses(
    ramc: f64,
    obliquity: f64,
    latitude: f64,
    system: HouseSystem,
) -> Result<HouseCusps, EphemerisError> {
    let (midheaven, ascendant) = angles(ramc, obliquity, latitude);

    let cusps = match system {
        HouseSystem::Placidus => {
            let intermediate = placidus_cusps(ramc, obliquity, latitude)?;
            quadrant_cusps(ascendant, midheaven, intermediate)
        }
        HouseSystem::Regiomontanus => {
            let intermediate = regiomontanus_cusps(ramc, obliquity, latitude);
            quadrant_cusps(ascendant, midheaven, intermediate)
        }
        HouseSystem::Porphyry => {
            let intermediate = porphyry_cusps(ascendant, midheaven);
            quadrant_cusps(ascendant, midheaven, intermediate)
        }
        HouseSystem::Equal => {
            std::array::from_fn(|index| normalize_longitude(ascendant + 30.0 * index as f64))
        }
        HouseSystem::WholeSign => {
            let first = (ascendant / 30.0).floor() * 30.0;
            std::array::from_fn(|index| normalize_longitude(first + 30.0 * index as f64))
        }
        HouseSystem::Koch | HouseSystem::Campanus => {
            return Err(EphemerisError::houses(format!(
                "{system} houses are not available in the analytic ephemeris"
            )))
        }
    };

    Ok(HouseCusps {
        cusps,
        ascendant,
        midheaven,
    })
}

/// Builds the twelve cusps from the angles and cusps 11, 12, 2 and 3;
/// the remaining cusps are their opposites.
fn quadrant_cusps(ascendant: f64, midheaven: f64, [c11, c12, c2, c3]: [f64; 4]) -> [f64; 12] {
    let opposite = |longitude: f64| normalize_longitude(longitude + 180.0);
    [
        ascendant,
        c2,
        c3,
        opposite(midheaven),
        opposite(c11),
        opposite(c12),
        opposite(ascendant),
        opposite(c2),
        opposite(c3),
        midheaven,
        c11,
        c12,
    ]
}

/// Cusps 11, 12, 2 and 3 by trisecting semi-arcs of each point's own
/// declination. Fails where the semi-arc is undefined (circumpolar points).
fn placidus_cusps(ramc: f64, obliquity: f64, latitude: f64) -> Result<[f64; 4], EphemerisError> {
    // (base offset from RAMC, fraction of the diurnal semi-arc)
    const CUSP_ARCS: [(f64, f64); 4] = [(0.0, 1.0 / 3.0), (0.0, 2.0 / 3.0), (60.0, 2.0 / 3.0), (120.0, 1.0 / 3.0)];

    let tan_latitude = latitude.to_radians().tan();
    let mut cusps = [0.0; 4];

    for (slot, (base, fraction)) in CUSP_ARCS.iter().enumerate() {
        let mut right_ascension = ramc + base + fraction * 90.0;
        let mut longitude = ecliptic_from_right_ascension(right_ascension, obliquity);

        for _ in 0..50 {
            let declination = (sin_deg(obliquity) * sin_deg(longitude)).asin();
            let product = -tan_latitude * declination.tan();
            if !(-1.0..=1.0).contains(&product) {
                return Err(EphemerisError::houses(format!(
                    "placidus cusps are undefined at latitude {latitude}"
                )));
            }
            let semi_arc = product.acos().to_degrees();
            let next = ramc + base + fraction * semi_arc;
            let next_longitude = ecliptic_from_right_ascension(next, obliquity);
            let converged = (next - right_ascension).abs() < 1e-9;
            right_ascension = next;
            longitude = next_longitude;
            if converged {
                break;
            }
        }
        cusps[slot] = longitude;
    }
    Ok(cusps)
}

fn regiomontanus_cusps(ramc: f64, obliquity: f64, latitude: f64) -> [f64; 4] {
    let tan_latitude = latitude.to_radians().tan();
    [30.0, 60.0, 120.0, 150.0].map(|hour_angle: f64| {
        let right_ascension = ramc + hour_angle;
        let tan_pole = tan_latitude * sin_deg(hour_angle);
        normalize_longitude(
            sin_deg(right_ascension)
                .atan2(cos_deg(right_ascension) * cos_deg(obliquity) - sin_deg(obliquity) * tan_pole)
                .to_degrees(),
        )
    })
}

fn porphyry_cusps(ascendant: f64, midheaven: f64) -> [f64; 4] {
    let upper = normalize_longitude(ascendant - midheaven);
    let lower = normalize_longitude(midheaven + 180.0 - ascendant);
    [
        normalize_longitude(midheaven + upper / 3.0),
        normalize_longitude(midheaven + 2.0 * upper / 3.0),
        normalize_longitude(ascendant + lower / 3.0),
        normalize_longitude(ascendant + 2.0 * lower / 3.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::houses::house_for_longitude;
    use approx::assert_abs_diff_eq;

    const OBLIQUITY: f64 = 23.439_291;

    fn arc(from: f64, to: f64) -> f64 {
        normalize_longitude(to - from)
    }

    fn assert_cyclic(cusps: &[f64; 12]) {
        let total: f64 = (0..12).map(|i| arc(cusps[i], cusps[(i + 1) % 12])).sum();
        assert_abs_diff_eq!(total, 360.0, epsilon = 1e-6);
        for (index, cusp) in cusps.iter().enumerate() {
            assert_eq!(house_for_longitude(*cusp, cusps), index as u8 + 1);
        }
    }

    #[test]
    fn sun_at_j2000() {
        let sun = AnalyticEphemeris.longitude(J2000, CelestialBody::Sun).unwrap();
        assert_abs_diff_eq!(sun, 280.38, epsilon = 0.05);
    }

    #[test]
    fn moon_at_j2000() {
        let moon = AnalyticEphemeris.longitude(J2000, CelestialBody::Moon).unwrap();
        assert_abs_diff_eq!(moon, 223.32, epsilon = 0.3);
    }

    #[test]
    fn mean_node_at_j2000() {
        assert_abs_diff_eq!(mean_node_longitude(0.0), 125.04, epsilon = 0.01);
        let node = AnalyticEphemeris.longitude(J2000, CelestialBody::NorthNode).unwrap();
        assert_abs_diff_eq!(node, 125.04, epsilon = 2.0);
    }

    #[test]
    fn every_planet_is_normalized() {
        for body in CelestialBody::iter().filter(|body| *body != CelestialBody::Chiron) {
            for jd in [2_415_020.0, J2000, 2_460_000.5] {
                let longitude = AnalyticEphemeris.longitude(jd, body).unwrap();
                assert!((0.0..360.0).contains(&longitude), "{body} at {jd}: {longitude}");
            }
        }
    }

    #[test]
    fn chiron_is_a_body_failure() {
        let err = AnalyticEphemeris.longitude(J2000, CelestialBody::Chiron).unwrap_err();
        assert!(matches!(err, EphemerisError::Body { body: CelestialBody::Chiron, .. }));
    }

    #[test]
    fn kepler_solver_converges() {
        let mean_anomaly: f64 = 1.2;
        let anomaly = eccentric_anomaly(mean_anomaly, 0.25);
        assert_abs_diff_eq!(anomaly - 0.25 * anomaly.sin(), mean_anomaly, epsilon = 1e-10);
    }

    #[test]
    fn angles_on_the_equator() {
        let (midheaven, ascendant) = angles(0.0, OBLIQUITY, 0.0);
        assert_abs_diff_eq!(midheaven, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ascendant, 90.0, epsilon = 1e-9);

        let (midheaven, ascendant) = angles(90.0, OBLIQUITY, 0.0);
        assert_abs_diff_eq!(midheaven, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ascendant, 180.0, epsilon = 1e-9);
    }

    #[test]
    fn ascendant_follows_the_midheaven() {
        for ramc in [0.0, 45.0, 133.0, 250.0, 321.0] {
            for latitude in [-45.0, 0.0, 40.7, 55.0] {
                let (midheaven, ascendant) = angles(ramc, OBLIQUITY, latitude);
                let separation = arc(midheaven, ascendant);
                assert!(separation > 0.0 && separation < 180.0, "{ramc} {latitude}");
            }
        }
    }

    #[test]
    fn quadrant_systems_agree_on_the_equator() {
        let placidus = compute_houses(77.0, OBLIQUITY, 0.0, HouseSystem::Placidus).unwrap();
        let regiomontanus =
            compute_houses(77.0, OBLIQUITY, 0.0, HouseSystem::Regiomontanus).unwrap();
        for (a, b) in placidus.cusps.iter().zip(regiomontanus.cusps.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn cusps_are_cyclic_for_every_supported_system() {
        for system in [
            HouseSystem::Placidus,
            HouseSystem::Porphyry,
            HouseSystem::Regiomontanus,
            HouseSystem::Equal,
            HouseSystem::WholeSign,
        ] {
            for ramc in [10.0, 100.0, 200.0, 300.0] {
                for latitude in [-33.9, 0.0, 40.7, 51.5] {
                    let houses = compute_houses(ramc, OBLIQUITY, latitude, system).unwrap();
                    assert_cyclic(&houses.cusps);
                }
            }
        }
    }

    #[test]
    fn first_and_tenth_cusps_are_the_angles() {
        let houses = compute_houses(200.0, OBLIQUITY, 40.7, HouseSystem::Placidus).unwrap();
        assert_eq!(houses.cusps[0], houses.ascendant);
        assert_eq!(houses.cusps[9], houses.midheaven);
        assert_abs_diff_eq!(arc(houses.cusps[9], houses.cusps[3]), 180.0, epsilon = 1e-9);
    }

    #[test]
    fn equal_and_whole_sign_layouts() {
        let equal = compute_houses(200.0, OBLIQUITY, 40.7, HouseSystem::Equal).unwrap();
        for index in 1..12 {
            assert_abs_diff_eq!(arc(equal.cusps[index - 1], equal.cusps[index]), 30.0, epsilon = 1e-9);
        }
        let whole = compute_houses(200.0, OBLIQUITY, 40.7, HouseSystem::WholeSign).unwrap();
        assert_eq!(whole.cusps[0] % 30.0, 0.0);
        assert!(arc(whole.cusps[0], whole.ascendant) < 30.0);
    }

    #[test]
    fn placidus_fails_near_the_pole() {
        assert!(matches!(
            placidus_cusps(90.0, OBLIQUITY, 89.0),
            Err(EphemerisError::Houses { .. })
        ));
    }

    #[test]
    fn unsupported_systems_and_locations_are_house_failures() {
        let ephemeris = AnalyticEphemeris::new();
        for system in [HouseSystem::Koch, HouseSystem::Campanus] {
            let err = ephemeris.house_cusps(J2000, 40.0, -74.0, system).unwrap_err();
            assert!(matches!(err, EphemerisError::Houses { .. }));
        }
        assert!(ephemeris
            .house_cusps(J2000, 95.0, 0.0, HouseSystem::Equal)
            .is_err());
    }
}
