//! Birth record and chart persistence.
//!
//! Charts are versioned per user: a replace writes the new point set under
//! the next version and deletes older versions in the same transaction, so
//! readers (which only look at the highest version) never see an empty or
//! partial chart.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::geocoding::GeoLocation;
use crate::{BirthRecord, ChartPoint, UserId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS birth_records (
    user_id         INTEGER PRIMARY KEY,
    birthdate       TEXT NOT NULL,
    birthtime       TEXT NOT NULL,
    birth_city      TEXT NOT NULL,
    birth_country   TEXT NOT NULL,
    latitude        REAL,
    longitude       REAL,
    timezone_offset REAL
);

CREATE TABLE IF NOT EXISTS chart_points (
    user_id       INTEGER NOT NULL,
    chart_version INTEGER NOT NULL,
    planet_name   TEXT NOT NULL,
    longitude     REAL NOT NULL,
    latitude      REAL NOT NULL,
    sign          TEXT NOT NULL,
    degree        INTEGER NOT NULL,
    minute        INTEGER NOT NULL,
    second        INTEGER NOT NULL,
    house         INTEGER,
    planet_type   TEXT NOT NULL,
    PRIMARY KEY (user_id, chart_version, planet_name)
);

CREATE INDEX IF NOT EXISTS idx_chart_points_user_version
    ON chart_points (user_id, chart_version);
";

pub type StoreResult<T> = Result<T, PersistenceError>;

/// Storage for birth records and per-user chart points.
#[async_trait]
pub trait ChartRepository: Send + Sync {
    async fn load_birth_record(&self, user_id: UserId) -> StoreResult<Option<BirthRecord>>;

    /// Inserts or replaces the record, including its resolved location.
    async fn save_birth_record(&self, record: &BirthRecord) -> StoreResult<()>;

    async fn save_resolved_location(
        &self,
        user_id: UserId,
        location: &GeoLocation,
    ) -> StoreResult<()>;

    /// Points of the latest chart version, in insertion order. Empty when the
    /// user has no chart.
    async fn load_chart(&self, user_id: UserId) -> StoreResult<Vec<ChartPoint>>;

    /// Atomically replaces the user's chart and returns the new version.
    async fn replace_chart(&self, user_id: UserId, points: &[ChartPoint]) -> StoreResult<i64>;

    async fn chart_point_count(&self, user_id: UserId) -> StoreResult<usize>;

    /// Removes every stored version; returns the number of deleted rows.
    async fn delete_chart(&self, user_id: UserId) -> StoreResult<usize>;
}

/// SQLite repository. Statements run on the blocking pool behind a single
/// connection mutex.
#[derive(Clone)]
pub struct SqliteChartRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChartRepository {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "chart database opened");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Applies the schema to an existing connection.
    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteChartRepository {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            work(&mut conn)
        })
        .await
        .map_err(|err| PersistenceError::Task(err.to_string()))?
    }
}

fn birth_record_from_row(row: &Row<'_>) -> rusqlite::Result<BirthRecord> {
    let latitude: Option<f64> = row.get("latitude")?;
    let longitude: Option<f64> = row.get("longitude")?;
    let timezone_offset: Option<f64> = row.get("timezone_offset")?;
    let location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => {
            Some(GeoLocation::new(latitude, longitude, timezone_offset))
        }
        _ => None,
    };
    Ok(BirthRecord {
        user_id: row.get("user_id")?,
        birthdate: row.get("birthdate")?,
        birthtime: row.get("birthtime")?,
        city: row.get("birth_city")?,
        country: row.get("birth_country")?,
        location,
    })
}

fn small_int(row: &Row<'_>, column: &str) -> StoreResult<u8> {
    let value: i64 = row.get(column)?;
    u8::try_from(value)
        .map_err(|_| PersistenceError::InvalidData(format!("{column} value {value} out of range")))
}

fn chart_point_from_row(user_id: UserId, row: &Row<'_>) -> StoreResult<ChartPoint> {
    let invalid = |err: crate::ChartError| PersistenceError::InvalidData(err.to_string());
    let name: String = row.get("planet_name")?;
    let sign: String = row.get("sign")?;
    let point_type: String = row.get("planet_type")?;
    let house: Option<i64> = row.get("house")?;
    let house = house
        .map(|house| {
            u8::try_from(house)
                .ok()
                .filter(|house| (1..=12).contains(house))
                .ok_or_else(|| PersistenceError::InvalidData(format!("house {house} out of range")))
        })
        .transpose()?;

    Ok(ChartPoint {
        user_id: Some(user_id),
        name: name.parse().map_err(invalid)?,
        longitude: row.get("longitude")?,
        latitude: row.get("latitude")?,
        sign: sign.parse().map_err(invalid)?,
        degree: small_int(row, "degree")?,
        minute: small_int(row, "minute")?,
        second: small_int(row, "second")?,
        house,
        point_type: point_type.parse().map_err(invalid)?,
    })
}

#[async_trait]
impl ChartRepository for SqliteChartRepository {
    async fn load_birth_record(&self, user_id: UserId) -> StoreResult<Option<BirthRecord>> {
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    "SELECT user_id, birthdate, birthtime, birth_city, birth_country,
                            latitude, longitude, timezone_offset
                     FROM birth_records
                     WHERE user_id = ?1",
                    [user_id],
                    birth_record_from_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn save_birth_record(&self, record: &BirthRecord) -> StoreResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let location = record.location;
            conn.execute(
                "INSERT INTO birth_records
                    (user_id, birthdate, birthtime, birth_city, birth_country,
                     latitude, longitude, timezone_offset)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(user_id) DO UPDATE SET
                    birthdate = excluded.birthdate,
                    birthtime = excluded.birthtime,
                    birth_city = excluded.birth_city,
                    birth_country = excluded.birth_country,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    timezone_offset = excluded.timezone_offset",
                params![
                    record.user_id,
                    record.birthdate,
                    record.birthtime,
                    record.city,
                    record.country,
                    location.map(|l| l.latitude),
                    location.map(|l| l.longitude),
                    location.and_then(|l| l.timezone_offset_hours),
                ],
            )?;
            debug!(user_id = record.user_id, "birth record saved");
            Ok(())
        })
        .await
    }

    async fn save_resolved_location(
        &self,
        user_id: UserId,
        location: &GeoLocation,
    ) -> StoreResult<()> {
        let location = *location;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE birth_records
                 SET latitude = ?2, longitude = ?3, timezone_offset = ?4
                 WHERE user_id = ?1",
                params![
                    user_id,
                    location.latitude,
                    location.longitude,
                    location.timezone_offset_hours
                ],
            )?;
            if changed == 0 {
                return Err(PersistenceError::InvalidData(format!(
                    "no birth record for user {user_id}"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn load_chart(&self, user_id: UserId) -> StoreResult<Vec<ChartPoint>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT planet_name, longitude, latitude, sign, degree, minute, second,
                        house, planet_type
                 FROM chart_points
                 WHERE user_id = ?1
                   AND chart_version = (
                       SELECT MAX(chart_version) FROM chart_points WHERE user_id = ?1
                   )
                 ORDER BY rowid",
            )?;
            let mut rows = stmt.query([user_id])?;
            let mut points = Vec::new();
            while let Some(row) = rows.next()? {
                points.push(chart_point_from_row(user_id, row)?);
            }
            Ok(points)
        })
        .await
    }

    async fn replace_chart(&self, user_id: UserId, points: &[ChartPoint]) -> StoreResult<i64> {
        let points = points.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let version: i64 = tx.query_row(
                "SELECT COALESCE(MAX(chart_version), 0) + 1 FROM chart_points WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;

            {
                let mut insert = tx.prepare_cached(
                    "INSERT INTO chart_points
                        (user_id, chart_version, planet_name, longitude, latitude, sign,
                         degree, minute, second, house, planet_type)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )?;
                for point in &points {
                    insert.execute(params![
                        user_id,
                        version,
                        point.name.as_str(),
                        point.longitude,
                        point.latitude,
                        point.sign.name(),
                        point.degree,
                        point.minute,
                        point.second,
                        point.house,
                        point.point_type.as_str(),
                    ])?;
                }
            }

            let removed = tx.execute(
                "DELETE FROM chart_points WHERE user_id = ?1 AND chart_version < ?2",
                params![user_id, version],
            )?;
            tx.commit()?;

            debug!(user_id, version, inserted = points.len(), removed, "chart replaced");
            Ok(version)
        })
        .await
    }

    async fn chart_point_count(&self, user_id: UserId) -> StoreResult<usize> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*)
                 FROM chart_points
                 WHERE user_id = ?1
                   AND chart_version = (
                       SELECT MAX(chart_version) FROM chart_points WHERE user_id = ?1
                   )",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn delete_chart(&self, user_id: UserId) -> StoreResult<usize> {
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM chart_points WHERE user_id = ?1", [user_id])?;
            Ok(removed)
        })
        .await
    }
}
