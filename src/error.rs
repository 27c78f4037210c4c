//! Error taxonomy for chart computation.
//!
//! Validation and geocoding failures abort a request immediately. Ephemeris
//! failures for a single body are recoverable (the body is skipped), while a
//! failed house computation aborts the chart. Cache misses are modelled as
//! `Option::None` and never surface here.

use thiserror::Error;

use crate::{CelestialBody, UserId};

pub type ChartResult<T> = Result<T, ChartError>;

#[derive(Debug, Error)]
pub enum ChartError {
    /// Malformed or missing birth data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Geocoding failed: {0}")]
    Geocoding(#[from] GeocodingError),

    #[error("Ephemeris failure: {0}")]
    Ephemeris(#[from] EphemerisError),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("No birth record for user {0}")]
    BirthRecordNotFound(UserId),
}

impl ChartError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EphemerisError {
    /// A single body could not be computed; callers may continue with the rest.
    #[error("position of {body} unavailable: {message}")]
    Body {
        body: CelestialBody,
        message: String,
    },

    #[error("house computation failed: {message}")]
    Houses { message: String },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("unsupported by this backend: {0}")]
    Unsupported(String),

    /// The backend could not be set up.
    #[error("ephemeris backend unavailable: {0}")]
    Unavailable(String),
}

impl EphemerisError {
    pub fn body(body: CelestialBody, message: impl Into<String>) -> Self {
        Self::Body {
            body,
            message: message.into(),
        }
    }

    pub fn houses(message: impl Into<String>) -> Self {
        Self::Houses {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("no results for `{query}`")]
    NoResults { query: String },

    #[error("geocoder request failed: {0}")]
    Http(String),

    #[error("geocoder request timed out")]
    Timeout,

    #[error("geocoding API key is not configured")]
    MissingApiKey,

    #[error("geocoder returned invalid coordinates: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for ChartError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Persistence(PersistenceError::Sqlite(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_part() {
        let err = ChartError::from(EphemerisError::body(CelestialBody::Pluto, "file missing"));
        assert_eq!(
            err.to_string(),
            "Ephemeris failure: position of pluto unavailable: file missing"
        );

        let err = ChartError::from(GeocodingError::NoResults {
            query: "Atlantis, Nowhere".into(),
        });
        assert_eq!(err.to_string(), "Geocoding failed: no results for `Atlantis, Nowhere`");

        let err = ChartError::BirthRecordNotFound(42);
        assert_eq!(err.to_string(), "No birth record for user 42");
    }
}
