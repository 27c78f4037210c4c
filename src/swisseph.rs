//! Native Swiss Ephemeris backend.
//!
//! Links against the system `libswe` (the C library is not bundled). The C
//! library keeps global state, so every call goes through [`SWE_STATE`],
//! which also remembers the ephemeris path last handed to the library.

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::ephemeris::EphemerisProvider;
use crate::error::EphemerisError;
use crate::houses::{HouseCusps, HouseSystem};
use crate::{CelestialBody, JulianDay};

mod bindings {
    use super::*;

    pub const SEFLG_SWIEPH: c_int = 2;
    pub const SE_ASC: usize = 0;
    pub const SE_MC: usize = 1;

    #[link(name = "swe")]
    extern "C" {
        pub fn swe_set_ephe_path(path: *const c_char);
        pub fn swe_calc_ut(
            tjd_ut: c_double,
            ipl: c_int,
            iflag: c_int,
            xx: *mut c_double,
            serr: *mut c_char,
        ) -> c_int;
        pub fn swe_houses_ex(
            tjd_ut: c_double,
            iflag: c_int,
            geolat: c_double,
            geolon: c_double,
            hsys: c_int,
            cusps: *mut c_double,
            ascmc: *mut c_double,
        ) -> c_int;
    }
}

use bindings::*;

static SWE_STATE: Mutex<Option<PathBuf>> = parking_lot::const_mutex(None);

/// Calculates positions and houses with the Swiss Ephemeris C library.
#[derive(Debug, Clone, Default)]
pub struct SwissEphemeris {
    ephe_path: Option<PathBuf>,
}

impl SwissEphemeris {
    /// Uses the ephemeris files found in `ephe_path`, or the library's
    /// default lookup (falling back to the built-in Moshier model) when no
    /// path is given. The path is applied before each call made through this
    /// instance.
    pub fn new(ephe_path: Option<PathBuf>) -> Self {
        let ephe_path = ephe_path.filter(|path| {
            let valid = !path.as_os_str().to_string_lossy().contains('\0');
            if !valid {
                warn!(path = %path.display(), "ephemeris path contains a NUL byte, ignored");
            }
            valid
        });
        SwissEphemeris { ephe_path }
    }

    pub fn ephe_path(&self) -> Option<&Path> {
        self.ephe_path.as_deref()
    }
}

/// Locks the library and points it at `path` if another path is active.
fn lock_with_path(path: Option<&Path>) -> MutexGuard<'static, Option<PathBuf>> {
    let mut applied = SWE_STATE.lock();
    if applied.as_deref() == path {
        return applied;
    }
    match path {
        Some(path) => match CString::new(path.to_string_lossy().as_bytes()) {
            Ok(c_path) => unsafe { swe_set_ephe_path(c_path.as_ptr()) },
            Err(_) => return applied,
        },
        None => unsafe { swe_set_ephe_path(std::ptr::null()) },
    }
    debug!(path = ?path, "ephemeris file path applied");
    *applied = path.map(Path::to_path_buf);
    applied
}

fn calc_longitude(
    path: Option<&Path>,
    jd: JulianDay,
    body: CelestialBody,
) -> Result<f64, EphemerisError> {
    let mut results: [c_double; 6] = [0.0; 6];
    let mut error: [c_char; 256] = [0; 256];

    let calc_result = {
        let _guard = lock_with_path(path);
        unsafe {
            swe_calc_ut(
                jd,
                body.swisseph_id(),
                SEFLG_SWIEPH,
                results.as_mut_ptr(),
                error.as_mut_ptr(),
            )
        }
    };

    if calc_result < 0 {
        let message = unsafe { CStr::from_ptr(error.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        return Err(EphemerisError::body(body, message));
    }
    Ok(results[0])
}

fn calc_houses(
    path: Option<&Path>,
    jd: JulianDay,
    latitude: f64,
    longitude: f64,
    system: HouseSystem,
) -> Result<HouseCusps, EphemerisError> {
    let mut cusps: [c_double; 13] = [0.0; 13];
    let mut ascmc: [c_double; 10] = [0.0; 10];

    let calc_result = {
        let _guard = lock_with_path(path);
        unsafe {
            swe_houses_ex(
                jd,
                0,
                latitude,
                longitude,
                system.code() as c_int,
                cusps.as_mut_ptr(),
                ascmc.as_mut_ptr(),
            )
        }
    };

    if calc_result < 0 {
        return Err(EphemerisError::houses(format!(
            "swe_houses_ex failed for {system} at latitude {latitude}"
        )));
    }

    let mut house_cusps = [0.0; 12];
    house_cusps.copy_from_slice(&cusps[1..13]);
    Ok(HouseCusps {
        cusps: house_cusps,
        ascendant: ascmc[SE_ASC],
        midheaven: ascmc[SE_MC],
    })
}

#[async_trait]
impl EphemerisProvider for SwissEphemeris {
    fn name(&self) -> &'static str {
        "swisseph"
    }

    async fn position(&self, jd: JulianDay, body: CelestialBody) -> Result<f64, EphemerisError> {
        let path = self.ephe_path.clone();
        tokio::task::spawn_blocking(move || calc_longitude(path.as_deref(), jd, body))
            .await
            .map_err(|err| EphemerisError::body(body, err.to_string()))?
    }

    async fn houses(
        &self,
        jd: JulianDay,
        latitude: f64,
        longitude: f64,
        system: HouseSystem,
    ) -> Result<HouseCusps, EphemerisError> {
        let path = self.ephe_path.clone();
        tokio::task::spawn_blocking(move || {
            calc_houses(path.as_deref(), jd, latitude, longitude, system)
        })
            .await
            .map_err(|err| EphemerisError::houses(err.to_string()))?
    }
}
