//! Service configuration with environment overrides.

use ::config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ChartError, ChartResult};
use crate::houses::HouseSystem;

/// Settings read from `NATAL_*` variables. Durations are whole seconds in
/// both the environment and serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub house_system: HouseSystem,
    /// Upper bound for a single ephemeris call.
    #[serde(rename = "ephemeris_timeout_secs", with = "seconds")]
    pub ephemeris_timeout: Duration,
    #[serde(rename = "geocoder_timeout_secs", with = "seconds")]
    pub geocoder_timeout: Duration,
    pub cache_capacity: usize,
    /// `None` keeps cached charts until invalidated or evicted; `0` seconds
    /// means the same.
    #[serde(rename = "cache_ttl_secs", with = "optional_seconds")]
    pub cache_ttl: Option<Duration>,
    /// Compute a chart on read when storage has none but a birth record
    /// exists.
    pub recompute_on_empty: bool,
    pub database_path: PathBuf,
    pub geocoding_api_key: Option<String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        ChartConfig {
            house_system: HouseSystem::Placidus,
            ephemeris_timeout: Duration::from_secs(5),
            geocoder_timeout: Duration::from_secs(10),
            cache_capacity: 1024,
            cache_ttl: Some(Duration::from_secs(3600)),
            recompute_on_empty: true,
            database_path: PathBuf::from("natal.db"),
            geocoding_api_key: None,
        }
    }
}

impl ChartConfig {
    /// Defaults overlaid with `NATAL_*` variables and `GEOCODING_API_KEY`.
    pub fn from_env() -> ChartResult<Self> {
        Self::load(None, std::env::var("GEOCODING_API_KEY").ok())
    }

    /// Same as [`ChartConfig::from_env`] with an explicit variable set.
    pub fn from_vars(vars: &HashMap<String, String>) -> ChartResult<Self> {
        Self::load(Some(vars.clone()), vars.get("GEOCODING_API_KEY").cloned())
    }

    fn load(vars: Option<HashMap<String, String>>, api_key: Option<String>) -> ChartResult<Self> {
        let api_key = api_key.filter(|key| !key.trim().is_empty());
        let environment = Environment::with_prefix("NATAL")
            .prefix_separator("_")
            .ignore_empty(true)
            .try_parsing(true)
            .source(vars);

        Config::builder()
            .add_source(environment)
            .set_override_option("geocoding_api_key", api_key)
            .and_then(|builder| builder.build())
            .and_then(|config| config.try_deserialize())
            .map_err(|e| ChartError::invalid_input(format!("configuration: {e}")))
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.map_or(0, |ttl| ttl.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let seconds = u64::deserialize(deserializer)?;
        Ok((seconds > 0).then(|| Duration::from_secs(seconds)))
    }
}
